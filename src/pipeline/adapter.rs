//! Inference adapter: one segment in, at most one partial result out.
//!
//! Per segment: stage the file under a fresh key, call the inference
//! service (per-attempt timeout, exponential backoff), unwrap and validate
//! the JSON payload, then remove the local file and the staged object
//! whatever happened. Failures come back as a [`SegmentError`] inside the
//! report, never as `Err`, so one bad segment cannot take the batch down.

use crate::cancel::CancelSignal;
use crate::config::AnalysisConfig;
use crate::error::{InferenceError, SegmentError, StorageError};
use crate::inference::{InferenceRequest, InferenceResponse, InferenceService, TokenUsage};
use crate::output::SegmentReport;
use crate::pipeline::janitor::{delete_staged, remove_local, staging_key, StagingLedger};
use crate::pipeline::payload::{self, ValidPayload};
use crate::pipeline::segment::Segment;
use crate::storage::ObjectStore;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Everything shared by the segments of one analysis.
pub struct SegmentContext<'a> {
    pub store: &'a dyn ObjectStore,
    pub inference: &'a dyn InferenceService,
    pub ledger: &'a StagingLedger,
    pub config: &'a AnalysisConfig,
    pub cancel: &'a CancelSignal,
    pub analysis_id: &'a str,
    /// Full per-segment instruction (framing + contract).
    pub instruction: &'a str,
    pub mime_type: &'a str,
    pub extension: &'a str,
}

/// The report for one segment plus its partial result, if it produced one.
#[derive(Debug, Clone)]
pub struct SegmentOutcome {
    pub report: SegmentReport,
    pub partial: Option<ValidPayload>,
}

/// A failed inference attempt.
#[derive(Debug, Clone)]
pub(crate) enum CallError {
    Timeout(Duration),
    Service(InferenceError),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Timeout(d) => write!(f, "timed out after {}s", d.as_secs()),
            CallError::Service(e) => write!(f, "{e}"),
        }
    }
}

/// One inference call bounded by `timeout`.
pub(crate) async fn call_with_timeout(
    inference: &dyn InferenceService,
    request: InferenceRequest,
    timeout: Duration,
) -> Result<InferenceResponse, CallError> {
    match tokio::time::timeout(timeout, inference.generate(request)).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(CallError::Service(e)),
        Err(_) => Err(CallError::Timeout(timeout)),
    }
}

/// Analyze one segment. Always removes the local file and the staged object.
#[instrument(skip_all, fields(segment = segment.ordinal, span = %segment.span))]
pub async fn analyze_segment(ctx: &SegmentContext<'_>, segment: Segment) -> SegmentOutcome {
    let start = Instant::now();
    let ordinal = segment.ordinal;
    let mut report = SegmentReport {
        ordinal,
        span: segment.span,
        attempts: 0,
        duration_ms: 0,
        input_tokens: 0,
        output_tokens: 0,
        payload_len: 0,
        error: None,
    };

    if ctx.cancel.is_cancelled() {
        remove_local(&segment.path).await;
        report.error = Some(SegmentError::Cancelled { segment: ordinal });
        return finish(report, None, start);
    }

    let key = staging_key(&ctx.config.staging_prefix, ctx.analysis_id, ctx.extension);
    ctx.ledger.record(&key);

    let result = stage_and_infer(ctx, &segment, &key, &mut report).await;
    remove_local(&segment.path).await;

    match delete_staged(ctx.store, &key, &ctx.config.delete_retry()).await {
        Ok(()) => ctx.ledger.confirm(&key),
        // stays in the ledger for the final sweep
        Err(e) => warn!("Could not delete staged object {}: {}", key, e),
    }

    match result {
        Ok(partial) => {
            report.payload_len = partial.text.len();
            finish(report, Some(partial), start)
        }
        Err(e) => {
            warn!("{}", e);
            report.error = Some(e);
            finish(report, None, start)
        }
    }
}

fn finish(mut report: SegmentReport, partial: Option<ValidPayload>, start: Instant) -> SegmentOutcome {
    report.duration_ms = start.elapsed().as_millis() as u64;
    SegmentOutcome { report, partial }
}

async fn stage_and_infer(
    ctx: &SegmentContext<'_>,
    segment: &Segment,
    key: &str,
    report: &mut SegmentReport,
) -> Result<ValidPayload, SegmentError> {
    let ordinal = segment.ordinal;
    let cancelled = || SegmentError::Cancelled { segment: ordinal };

    // ── Stage ────────────────────────────────────────────────────────────
    let upload_policy = ctx.config.upload_retry();
    let upload_label = format!("segment {ordinal} upload");
    let upload = upload_policy.run(
        &upload_label,
        StorageError::is_transient,
        |_| ctx.store.upload(&segment.path, key, ctx.mime_type),
    );
    let uri = tokio::select! {
        (res, _) = upload => res.map_err(|e| SegmentError::Staging {
            segment: ordinal,
            detail: e.to_string(),
        })?,
        _ = ctx.cancel.cancelled() => return Err(cancelled()),
    };
    debug!("Staged at {}", uri);

    // ── Infer ────────────────────────────────────────────────────────────
    let request = InferenceRequest::new(ctx.instruction).with_attachment(uri, ctx.mime_type);
    let timeout = ctx.config.api_timeout();
    let policy = ctx.config.inference_retry();
    let label = format!("segment {ordinal} inference");
    let calls = policy.run(
        &label,
        |_: &CallError| true,
        |_| call_with_timeout(ctx.inference, request.clone(), timeout),
    );
    let (result, attempts) = tokio::select! {
        outcome = calls => outcome,
        _ = ctx.cancel.cancelled() => return Err(cancelled()),
    };
    report.attempts = attempts;

    let response = result.map_err(|e| match e {
        CallError::Timeout(d) => SegmentError::InferenceTimeout {
            segment: ordinal,
            secs: d.as_secs(),
            attempts,
        },
        CallError::Service(e) => SegmentError::Inference {
            segment: ordinal,
            attempts,
            detail: e.to_string(),
        },
    })?;
    let TokenUsage {
        input_tokens,
        output_tokens,
    } = response.usage;
    report.input_tokens = input_tokens;
    report.output_tokens = output_tokens;

    // ── Validate ─────────────────────────────────────────────────────────
    let raw = response.payload_text().ok_or_else(|| SegmentError::Validation {
        segment: ordinal,
        detail: "response carried no text".to_string(),
    })?;
    let partial = payload::validate(&raw).map_err(|detail| SegmentError::Validation {
        segment: ordinal,
        detail,
    })?;
    debug!(
        "{} input tokens, {} output tokens, {} attempt(s)",
        input_tokens, output_tokens, attempts
    );
    Ok(partial)
}
