//! The generative-inference seam.
//!
//! The pipeline only ever issues one kind of call: "here is an instruction,
//! maybe a staged file, maybe some text; answer". [`InferenceService`] is
//! that call. [`LlmInference`] implements it over any `edgequake-llm`
//! provider; tests implement it with scripted fakes.

pub mod llm;

pub use llm::LlmInference;

use crate::error::InferenceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A staged object the service should read, by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub uri: String,
    pub mime_type: String,
}

/// One inference call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InferenceRequest {
    /// System-level instruction.
    pub instruction: String,
    pub attachment: Option<Attachment>,
    /// Additional text inputs, sent in order after the attachment.
    pub inputs: Vec<String>,
}

impl InferenceRequest {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            ..Default::default()
        }
    }

    pub fn with_attachment(mut self, uri: impl Into<String>, mime_type: impl Into<String>) -> Self {
        self.attachment = Some(Attachment {
            uri: uri.into(),
            mime_type: mime_type.into(),
        });
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<String>) -> Self {
        self.inputs = inputs;
        self
    }
}

/// Token accounting for one call, when the service reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// The service's answer.
///
/// Services may answer with structured content parts, a flattened text
/// field, or both.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InferenceResponse {
    pub parts: Vec<String>,
    pub text: Option<String>,
    pub usage: TokenUsage,
}

impl InferenceResponse {
    /// Response carrying only a flattened text field.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// The textual payload: the non-empty parts joined by newlines, falling
    /// back to the flattened text.
    pub fn payload_text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .parts
            .iter()
            .map(String::as_str)
            .filter(|p| !p.trim().is_empty())
            .collect();
        if !parts.is_empty() {
            return Some(parts.join("\n"));
        }
        self.text
            .as_ref()
            .filter(|t| !t.trim().is_empty())
            .cloned()
    }
}

/// An external generative-inference backend.
#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn generate(&self, request: InferenceRequest) -> Result<InferenceResponse, InferenceError>;
}
