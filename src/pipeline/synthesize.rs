//! Result synthesis: combine the partial results into one JSON document.
//!
//! The default strategy makes one more inference call with the merge rules
//! as its instruction and the partials as inputs, earliest segment first.
//! It runs even for a single partial, since the call also normalises the
//! formatting. The call gets the same per-attempt timeout and retry policy
//! as segment calls; a reply that is not valid JSON is final.

use crate::artifact::AnalysisContract;
use crate::cancel::CancelSignal;
use crate::config::{AnalysisConfig, SynthesisStrategy};
use crate::error::AnalysisError;
use crate::inference::{InferenceRequest, InferenceService, TokenUsage};
use crate::pipeline::adapter::{call_with_timeout, CallError};
use crate::pipeline::merge::merge_partials;
use crate::pipeline::payload::{self, ValidPayload};
use crate::prompts::synthesis_instruction;
use tracing::{debug, info};

/// The synthesized document and what it cost.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub payload: ValidPayload,
    pub usage: TokenUsage,
}

/// Merge `partials` (ordered by segment) according to `config.synthesis`.
pub async fn synthesize(
    partials: &[ValidPayload],
    contract: &AnalysisContract,
    inference: &dyn InferenceService,
    config: &AnalysisConfig,
    cancel: &CancelSignal,
) -> Result<Synthesis, AnalysisError> {
    let failed = |reason: String| AnalysisError::SynthesisFailed {
        partials: partials.len(),
        reason,
    };
    if partials.is_empty() {
        return Err(failed("no partial results".to_string()));
    }
    if cancel.is_cancelled() {
        return Err(AnalysisError::Cancelled { stage: "synthesis" });
    }

    match config.synthesis {
        SynthesisStrategy::Local => {
            let values: Vec<_> = partials.iter().map(|p| p.value.clone()).collect();
            let value = merge_partials(&values);
            let text = serde_json::to_string(&value).map_err(|e| failed(e.to_string()))?;
            info!("Merged {} partial results locally", partials.len());
            Ok(Synthesis {
                payload: ValidPayload { text, value },
                usage: TokenUsage::default(),
            })
        }
        SynthesisStrategy::Inference => {
            let request = InferenceRequest::new(synthesis_instruction(contract))
                .with_inputs(partials.iter().map(|p| p.text.clone()).collect());
            let timeout = config.api_timeout();
            let policy = config.inference_retry();
            let calls = policy.run(
                "synthesis",
                |_: &CallError| true,
                |_| call_with_timeout(inference, request.clone(), timeout),
            );
            let (result, attempts) = tokio::select! {
                outcome = calls => outcome,
                _ = cancel.cancelled() => return Err(AnalysisError::Cancelled { stage: "synthesis" }),
            };
            let response = result.map_err(|e| failed(format!("{e} ({attempts} attempts)")))?;

            let raw = response
                .payload_text()
                .ok_or_else(|| failed("response carried no text".to_string()))?;
            let payload = payload::validate(&raw).map_err(|e| failed(format!("output is not valid JSON: {e}")))?;
            debug!(
                "Synthesis: {} input tokens, {} output tokens",
                response.usage.input_tokens, response.usage.output_tokens
            );
            Ok(Synthesis {
                payload,
                usage: response.usage,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use crate::inference::InferenceResponse;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct Echo {
        reply: &'static str,
        seen: Mutex<Vec<InferenceRequest>>,
    }

    #[async_trait]
    impl InferenceService for Echo {
        async fn generate(&self, request: InferenceRequest) -> Result<InferenceResponse, InferenceError> {
            self.seen.lock().unwrap().push(request);
            Ok(InferenceResponse::from_text(self.reply))
        }
    }

    fn partial(v: serde_json::Value) -> ValidPayload {
        ValidPayload {
            text: v.to_string(),
            value: v,
        }
    }

    fn echo(reply: &'static str) -> Echo {
        Echo {
            reply,
            seen: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn single_partial_still_calls_service() {
        let svc = echo("```json\n{\"a\": 1}\n```");
        let out = synthesize(
            &[partial(json!({"a": 1}))],
            &AnalysisContract::new("x"),
            &svc,
            &AnalysisConfig::default(),
            &CancelSignal::never(),
        )
        .await
        .unwrap();
        assert_eq!(out.payload.value, json!({"a": 1}));
        let seen = svc.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].attachment.is_none());
        assert_eq!(seen[0].inputs, vec![r#"{"a":1}"#.to_string()]);
    }

    #[tokio::test]
    async fn unparseable_output_fails_without_retry() {
        let svc = echo("I merged them: {broken");
        let err = synthesize(
            &[partial(json!({"a": 1})), partial(json!({"a": 2}))],
            &AnalysisContract::new("x"),
            &svc,
            &AnalysisConfig::default(),
            &CancelSignal::never(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AnalysisError::SynthesisFailed { partials: 2, .. }));
        assert!(!err.is_preflight());
        assert_eq!(svc.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn local_strategy_skips_service() {
        let svc = echo("{}");
        let config = AnalysisConfig::builder()
            .synthesis(SynthesisStrategy::Local)
            .build()
            .unwrap();
        let out = synthesize(
            &[partial(json!({"a": [1, 2], "b": null})), partial(json!({"a": [2, 3], "b": "y"}))],
            &AnalysisContract::new("x"),
            &svc,
            &config,
            &CancelSignal::never(),
        )
        .await
        .unwrap();
        assert_eq!(out.payload.value, json!({"a": [1, 2, 3], "b": "y"}));
        assert!(svc.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let svc = echo("{}");
        let err = synthesize(
            &[],
            &AnalysisContract::new("x"),
            &svc,
            &AnalysisConfig::default(),
            &CancelSignal::never(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.tag(), "SynthesisFailed");
        assert!(svc.seen.lock().unwrap().is_empty());
    }
}
