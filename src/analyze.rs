//! Top-level entry point: run one artifact through the whole pipeline.
//!
//! ```text
//! normalize → segment → pool(adapter × N, ≤ C in flight) → synthesize
//!                 └──────────── janitor on every exit path ───────────┘
//! ```
//!
//! An [`Analyzer`] owns its collaborators (object store, inference service,
//! segmenter) and can run any number of analyses, concurrently if the
//! caller wishes. Each analysis gets its own workspace directory, staging
//! namespace and ledger, so analyses never share temporary state.

use crate::artifact::AnalysisRequest;
use crate::cancel::CancelSignal;
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::inference::InferenceService;
use crate::output::{AnalysisOutput, AnalysisStats};
use crate::pipeline::adapter::SegmentContext;
use crate::pipeline::janitor::{analysis_prefix, sweep_staging, StagingLedger, Workspace};
use crate::pipeline::segment::{NativeSegmenter, SegmentSet, Segmenter};
use crate::pipeline::{normalize, pool, synthesize};
use crate::prompts::segment_instruction;
use crate::storage::ObjectStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Runs analyses against one object store and one inference service.
pub struct Analyzer {
    store: Arc<dyn ObjectStore>,
    inference: Arc<dyn InferenceService>,
    segmenter: Arc<dyn Segmenter>,
    config: AnalysisConfig,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Analyzer {
    /// Analyzer using the native segmenter (pdfium + ffmpeg).
    pub fn new(
        store: Arc<dyn ObjectStore>,
        inference: Arc<dyn InferenceService>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            store,
            inference,
            segmenter: Arc::new(NativeSegmenter),
            config,
        }
    }

    /// Replace the segmenter.
    pub fn with_segmenter(mut self, segmenter: Arc<dyn Segmenter>) -> Self {
        self.segmenter = segmenter;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyze one artifact.
    ///
    /// # Returns
    /// `Ok(AnalysisOutput)` when synthesis succeeded, even if some segments
    /// were dropped (check `output.stats.failed_segments`).
    ///
    /// # Errors
    /// Pre-flight: `InvalidRequest`, `WorkspaceUnavailable`,
    /// `NormalizationFailed`, `SegmentationFailed`. Terminal:
    /// `NoValidSegments`, `SynthesisFailed`. `Cancelled` when the configured
    /// deadline passes.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisOutput, AnalysisError> {
        self.analyze_with_cancel(request, CancelSignal::never()).await
    }

    /// Like [`Analyzer::analyze`], abandoning in-flight work once `cancel`
    /// fires. Cleanup still runs before this returns.
    #[instrument(skip_all, fields(analysis_id = tracing::field::Empty, location = %request.artifact.location))]
    pub async fn analyze_with_cancel(
        &self,
        request: &AnalysisRequest,
        cancel: CancelSignal,
    ) -> Result<AnalysisOutput, AnalysisError> {
        let total_start = Instant::now();
        validate_request(request)?;

        let cancel = match self.config.deadline_secs {
            Some(secs) => cancel.with_timeout(Duration::from_secs(secs)),
            None => cancel,
        };
        let analysis_id = uuid::Uuid::new_v4().simple().to_string();
        tracing::Span::current().record("analysis_id", analysis_id.as_str());
        info!(
            "Starting {} analysis of {}",
            request.artifact.kind, request.artifact.location
        );

        let workspace = Workspace::create(self.config.temp_root.as_deref())?;
        let ledger = StagingLedger::new();
        let mut stats = AnalysisStats::default();

        let result = self
            .run(request, &workspace, &ledger, &cancel, &analysis_id, &mut stats)
            .await;

        // ── Cleanup: runs whatever `run` returned ───────────────────────────
        let prefix = analysis_prefix(&self.config.staging_prefix, &analysis_id);
        let leaked = sweep_staging(self.store.as_ref(), &ledger, &prefix, &self.config.delete_retry()).await;
        workspace.close();

        if let Some(cb) = &self.config.progress_callback {
            cb.on_analysis_complete(stats.total_segments, stats.succeeded_segments);
        }
        if leaked > 0 {
            warn!("{} staged objects under {} could not be deleted", leaked, prefix);
        }

        match result {
            Ok(mut output) => {
                output.stats.leaked_staging_objects = leaked;
                output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
                info!(
                    "Analysis complete: {}/{} segments, {} input / {} output tokens, {}ms",
                    output.stats.succeeded_segments,
                    output.stats.total_segments,
                    output.stats.total_input_tokens,
                    output.stats.total_output_tokens,
                    output.stats.total_duration_ms
                );
                Ok(output)
            }
            Err(e) => {
                warn!("Analysis failed [{}]: {}", e.tag(), e);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: &AnalysisRequest,
        workspace: &Workspace,
        ledger: &StagingLedger,
        cancel: &CancelSignal,
        analysis_id: &str,
        stats: &mut AnalysisStats,
    ) -> Result<AnalysisOutput, AnalysisError> {
        let artifact = &request.artifact;
        let config = &self.config;

        // ── Step 1: Normalize ────────────────────────────────────────────────
        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled {
                stage: "normalization",
            });
        }
        let local = normalize::normalize(artifact, self.store.as_ref(), workspace.path(), config, cancel).await?;

        // ── Step 2: Segment ──────────────────────────────────────────────────
        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled {
                stage: "segmentation",
            });
        }
        let seg_start = Instant::now();
        let out_dir = workspace.segments_dir().await?;
        let set = self
            .segmenter
            .segment(&local, artifact.kind, &out_dir, config, cancel)
            .await?;
        if set.is_empty() {
            return Err(AnalysisError::SegmentationFailed {
                reason: "no segments were produced".to_string(),
            });
        }
        stats.segmentation_duration_ms = seg_start.elapsed().as_millis() as u64;
        stats.total_segments = set.len();
        info!("{} segments ({})", set.len(), set.mime_type);
        if let Some(cb) = &config.progress_callback {
            cb.on_analysis_start(set.len());
        }

        // ── Step 3: Batch ────────────────────────────────────────────────────
        let SegmentSet {
            segments,
            mime_type,
            extension,
        } = set;
        let instruction = segment_instruction(artifact.kind, &request.contract);
        let ctx = SegmentContext {
            store: self.store.as_ref(),
            inference: self.inference.as_ref(),
            ledger,
            config,
            cancel,
            analysis_id,
            instruction: &instruction,
            mime_type: &mime_type,
            extension: &extension,
        };
        let batch_start = Instant::now();
        let outcomes = pool::run_segments(&ctx, segments, config.concurrency).await;
        stats.batch_duration_ms = batch_start.elapsed().as_millis() as u64;

        let mut reports = Vec::with_capacity(outcomes.len());
        let mut partials = Vec::new();
        for outcome in outcomes {
            stats.total_input_tokens += outcome.report.input_tokens as u64;
            stats.total_output_tokens += outcome.report.output_tokens as u64;
            if let Some(partial) = outcome.partial {
                partials.push(partial);
            }
            reports.push(outcome.report);
        }
        stats.succeeded_segments = partials.len();
        stats.failed_segments = stats.total_segments - partials.len();

        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled { stage: "batch" });
        }
        if partials.is_empty() {
            let first_error = reports
                .iter()
                .find_map(|r| r.error.as_ref())
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            return Err(AnalysisError::NoValidSegments {
                total: stats.total_segments,
                first_error,
            });
        }

        // ── Step 4: Synthesize ───────────────────────────────────────────────
        if let Some(cb) = &config.progress_callback {
            cb.on_synthesis_start(partials.len());
        }
        let synth_start = Instant::now();
        let synthesis = synthesize::synthesize(
            &partials,
            &request.contract,
            self.inference.as_ref(),
            config,
            cancel,
        )
        .await?;
        stats.synthesis_duration_ms = synth_start.elapsed().as_millis() as u64;
        stats.total_input_tokens += synthesis.usage.input_tokens as u64;
        stats.total_output_tokens += synthesis.usage.output_tokens as u64;

        Ok(AnalysisOutput {
            json: synthesis.payload.text,
            value: synthesis.payload.value,
            segments: reports,
            stats: stats.clone(),
        })
    }
}

fn validate_request(request: &AnalysisRequest) -> Result<(), AnalysisError> {
    let artifact = &request.artifact;
    if artifact.location.trim().is_empty() {
        return Err(AnalysisError::InvalidRequest("artifact location is empty".into()));
    }
    if artifact.extension.is_empty() {
        return Err(AnalysisError::InvalidRequest(format!(
            "no format extension for {}",
            artifact.location
        )));
    }
    if request.contract.instruction.trim().is_empty() {
        return Err(AnalysisError::InvalidRequest("analysis instruction is empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{AnalysisContract, Artifact, MediaKind};

    #[test]
    fn rejects_empty_location_and_instruction() {
        let req = AnalysisRequest::new(
            Artifact::new(" ", MediaKind::Document, "pdf"),
            AnalysisContract::new("x"),
        );
        assert!(matches!(validate_request(&req), Err(AnalysisError::InvalidRequest(_))));

        let req = AnalysisRequest::new(
            Artifact::new("gs://b/a.pdf", MediaKind::Document, "pdf"),
            AnalysisContract::new("  "),
        );
        assert!(validate_request(&req).is_err());
    }

    #[test]
    fn accepts_well_formed_request() {
        let req = AnalysisRequest::new(
            Artifact::new("gs://b/a.mp4", MediaKind::Video, ".MP4"),
            AnalysisContract::new("Summarise the talk."),
        );
        assert!(validate_request(&req).is_ok());
    }
}
