//! What the caller hands to an analysis: the artifact and the analysis contract.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Extension of the canonical paginated format.
pub const CANONICAL_EXTENSION: &str = "pdf";

/// Broad media family of an artifact. Selects the segmenter variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Document,
    Audio,
    Video,
}

impl MediaKind {
    /// Guess the kind from a file extension (case-insensitive, leading dot allowed).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "pdf" | "doc" | "docx" | "odt" | "rtf" | "txt" | "ppt" | "pptx" | "odp" | "key"
            | "xls" | "xlsx" | "ods" | "csv" => Some(MediaKind::Document),
            "mp3" | "wav" | "m4a" | "aac" | "flac" | "ogg" | "opus" | "wma" => Some(MediaKind::Audio),
            "mp4" | "mov" | "mkv" | "webm" | "avi" | "m4v" | "wmv" => Some(MediaKind::Video),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Document => "document",
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The original input. Owned by the caller; the pipeline only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Remote location, e.g. `gs://bucket/decks/acme.pptx`.
    pub location: String,
    pub kind: MediaKind,
    /// Declared format extension without the dot (`pdf`, `docx`, `mp4`, …).
    pub extension: String,
}

impl Artifact {
    pub fn new(location: impl Into<String>, kind: MediaKind, extension: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            kind,
            extension: extension
                .into()
                .trim_start_matches('.')
                .to_ascii_lowercase(),
        }
    }

    /// Build from a location alone, inferring extension and kind from its suffix.
    pub fn from_location(location: impl Into<String>) -> Option<Self> {
        let location = location.into();
        let name = location.rsplit('/').next().unwrap_or(&location);
        let (_, ext) = name.rsplit_once('.')?;
        let kind = MediaKind::from_extension(ext)?;
        Some(Self::new(location.clone(), kind, ext))
    }

    /// Whether the artifact must go through the office converter first.
    pub fn needs_conversion(&self) -> bool {
        self.kind == MediaKind::Document && self.extension != CANONICAL_EXTENSION
    }
}

/// The caller's analysis contract: what to extract and in which shape.
///
/// Opaque to the pipeline; it is only threaded into the prompts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisContract {
    /// Extraction instruction, e.g. the list of fields to fill.
    pub instruction: String,
    /// Optional JSON schema (or example object) for the expected output.
    pub schema: Option<serde_json::Value>,
}

impl AnalysisContract {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// One analysis invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub artifact: Artifact,
    pub contract: AnalysisContract,
}

impl AnalysisRequest {
    pub fn new(artifact: Artifact, contract: AnalysisContract) -> Self {
        Self { artifact, contract }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_extension() {
        assert_eq!(MediaKind::from_extension("PDF"), Some(MediaKind::Document));
        assert_eq!(MediaKind::from_extension(".pptx"), Some(MediaKind::Document));
        assert_eq!(MediaKind::from_extension("mp3"), Some(MediaKind::Audio));
        assert_eq!(MediaKind::from_extension("mov"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_extension("exe"), None);
    }

    #[test]
    fn artifact_from_location() {
        let a = Artifact::from_location("gs://bucket/decks/Acme Deck.PPTX").unwrap();
        assert_eq!(a.extension, "pptx");
        assert_eq!(a.kind, MediaKind::Document);
        assert!(a.needs_conversion());

        let pdf = Artifact::from_location("gs://bucket/acme.pdf").unwrap();
        assert!(!pdf.needs_conversion());

        let video = Artifact::from_location("gs://bucket/pitch.mp4").unwrap();
        assert!(!video.needs_conversion());

        assert!(Artifact::from_location("gs://bucket/no-extension").is_none());
    }
}
