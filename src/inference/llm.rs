//! [`InferenceService`] over an `edgequake-llm` provider.
//!
//! Message layout for one call:
//! 1. **System message**: the instruction
//! 2. **User message** *(when a segment is attached)*: empty text plus the
//!    staged object as an `ImageData` attachment. Remote objects are passed
//!    by URL (`gs://` rewritten to its HTTPS object URL); `file://` objects
//!    are inlined as base64
//! 3. **User messages**: the text inputs, one per message, in order
//!
//! The provider's single `content` string comes back as a one-element
//! `parts` list.

use super::{Attachment, InferenceRequest, InferenceResponse, InferenceService, TokenUsage};
use crate::error::InferenceError;
use crate::storage::GcsUri;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use reqwest::Url;
use std::sync::Arc;
use tracing::debug;

/// Default model when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

const GCS_PUBLIC_BASE: &str = "https://storage.googleapis.com";

/// Inference backed by any `edgequake-llm` chat provider.
#[derive(Clone)]
pub struct LlmInference {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: Option<usize>,
}

impl std::fmt::Debug for LlmInference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmInference")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl LlmInference {
    /// Wrap a pre-built provider. Temperature defaults to 0.
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            temperature: 0.0,
            max_tokens: None,
        }
    }

    /// Resolve a provider from explicit names or the environment.
    ///
    /// Fallback chain, most specific first:
    /// 1. `provider_name` (+ `model`, default [`DEFAULT_MODEL`])
    /// 2. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, both set
    /// 3. `OPENAI_API_KEY` present → OpenAI
    /// 4. `ProviderFactory::from_env()` auto-detection
    pub fn from_env(provider_name: Option<&str>, model: Option<&str>) -> Result<Self, InferenceError> {
        resolve_provider(provider_name, model).map(Self::new)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: self.max_tokens,
            ..Default::default()
        }
    }
}

#[async_trait]
impl InferenceService for LlmInference {
    async fn generate(&self, request: InferenceRequest) -> Result<InferenceResponse, InferenceError> {
        let mut messages = vec![ChatMessage::system(request.instruction.as_str())];
        if let Some(attachment) = &request.attachment {
            let image = attachment_data(attachment).await?;
            messages.push(ChatMessage::user_with_images("", vec![image]));
        }
        for input in &request.inputs {
            messages.push(ChatMessage::user(input.as_str()));
        }

        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| InferenceError::Service(e.to_string()))?;

        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(InferenceResponse {
            parts: vec![response.content],
            text: None,
            usage: TokenUsage {
                input_tokens: response.prompt_tokens as usize,
                output_tokens: response.completion_tokens as usize,
            },
        })
    }
}

/// Build the attachment payload for a staged object.
async fn attachment_data(attachment: &Attachment) -> Result<ImageData, InferenceError> {
    match attachment.uri.strip_prefix("file://") {
        Some(path) => {
            let bytes = tokio::fs::read(path).await.map_err(|e| {
                InferenceError::Service(format!("cannot read staged object {}: {e}", attachment.uri))
            })?;
            Ok(ImageData::new(STANDARD.encode(&bytes), attachment.mime_type.as_str()))
        }
        None => Ok(ImageData::from_url(fetchable_url(&attachment.uri)?)),
    }
}

/// Providers fetch attachments over HTTPS: `gs://bucket/object` becomes the
/// GCS object URL, `http(s)` passes through unchanged.
fn fetchable_url(uri: &str) -> Result<String, InferenceError> {
    if uri.starts_with("https://") || uri.starts_with("http://") {
        return Ok(uri.to_string());
    }
    let location = GcsUri::parse(uri)
        .map_err(|e| InferenceError::Service(format!("unsupported attachment location: {e}")))?;
    let mut url = Url::parse(GCS_PUBLIC_BASE)
        .map_err(|e| InferenceError::Service(format!("invalid GCS base URL: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| InferenceError::Service("invalid GCS base URL".to_string()))?
        .push(&location.bucket)
        .extend(location.object.split('/'));
    Ok(url.to_string())
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, InferenceError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| InferenceError::NotConfigured {
        provider: name.to_string(),
        hint: format!("{e}"),
    })
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn resolve_provider(
    provider_name: Option<&str>,
    model: Option<&str>,
) -> Result<Arc<dyn LLMProvider>, InferenceError> {
    if let Some(name) = provider_name {
        return create_provider(name, model.unwrap_or(DEFAULT_MODEL));
    }

    if let (Some(prov), Some(env_model)) = (
        non_empty_var("EDGEQUAKE_LLM_PROVIDER"),
        non_empty_var("EDGEQUAKE_MODEL"),
    ) {
        return create_provider(&prov, &env_model);
    }

    if non_empty_var("OPENAI_API_KEY").is_some() {
        return create_provider("openai", model.unwrap_or(DEFAULT_MODEL));
    }

    let (llm, _embedding) = ProviderFactory::from_env().map_err(|e| InferenceError::NotConfigured {
        provider: "auto".to_string(),
        hint: format!(
            "No LLM provider could be auto-detected from environment.\n\
             Set OPENAI_API_KEY, GEMINI_API_KEY, or EDGEQUAKE_LLM_PROVIDER + EDGEQUAKE_MODEL.\n\
             Error: {e}"
        ),
    })?;
    Ok(llm)
}
