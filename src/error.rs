//! Error types for the chunkwise library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`AnalysisError`]: **fatal**: the analysis cannot produce a result
//!   (converter missing, no segments, every segment failed, synthesis output
//!   unusable). Returned as `Err(AnalysisError)` from [`crate::Analyzer`].
//!
//! * [`SegmentError`]: **non-fatal**: a single segment failed (staging
//!   upload, timeout, service error, malformed JSON) while the rest of the
//!   batch carries on. Stored inside [`crate::output::SegmentReport`] so the
//!   caller can see which parts of the artifact were dropped.
//!
//! Fatal errors are further split into *pre-flight* failures (nothing was
//! sent to the inference service) and *terminal* failures (inference spend
//! happened but could not be concluded). See [`AnalysisError::is_preflight`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by an analysis.
///
/// Segment-level failures use [`SegmentError`] and are stored in
/// [`crate::output::SegmentReport`] rather than propagated here.
#[derive(Debug, Error)]
pub enum AnalysisError {
    // ── Request / environment ─────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The analysis request itself is unusable (empty location, bad extension).
    #[error("Invalid analysis request: {0}")]
    InvalidRequest(String),

    /// The per-analysis temporary workspace could not be created.
    #[error("Could not create analysis workspace under '{root}': {source}")]
    WorkspaceUnavailable {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Pre-flight ────────────────────────────────────────────────────────
    /// The artifact could not be fetched or converted to the canonical form.
    #[error("Normalization of '{location}' failed: {reason}")]
    NormalizationFailed { location: String, reason: String },

    /// The canonical artifact could not be split, or produced zero segments.
    #[error("Segmentation failed: {reason}")]
    SegmentationFailed { reason: String },

    // ── Terminal (post-batch) ─────────────────────────────────────────────
    /// Every segment failed; synthesis was never attempted.
    #[error("No valid segments: all {total} segments failed.\nFirst error: {first_error}")]
    NoValidSegments { total: usize, first_error: String },

    /// The synthesis call failed or its output was not valid JSON.
    #[error("Synthesis of {partials} partial results failed: {reason}")]
    SynthesisFailed { partials: usize, reason: String },

    /// The caller cancelled the analysis or its deadline elapsed.
    #[error("Analysis cancelled during {stage}")]
    Cancelled { stage: &'static str },
}

impl AnalysisError {
    /// Stable tag naming the stage that failed, suitable for callers that
    /// switch on the failure kind rather than on the message.
    pub fn tag(&self) -> &'static str {
        match self {
            AnalysisError::InvalidConfig(_) => "InvalidConfig",
            AnalysisError::InvalidRequest(_) => "InvalidRequest",
            AnalysisError::WorkspaceUnavailable { .. } => "WorkspaceUnavailable",
            AnalysisError::NormalizationFailed { .. } => "NormalizationFailed",
            AnalysisError::SegmentationFailed { .. } => "SegmentationFailed",
            AnalysisError::NoValidSegments { .. } => "NoValidSegments",
            AnalysisError::SynthesisFailed { .. } => "SynthesisFailed",
            AnalysisError::Cancelled { .. } => "Cancelled",
        }
    }

    /// `true` when the failure happened before any inference call was made.
    ///
    /// Cancellation counts as pre-flight only when it hit before the batch.
    pub fn is_preflight(&self) -> bool {
        match self {
            AnalysisError::NoValidSegments { .. } | AnalysisError::SynthesisFailed { .. } => false,
            AnalysisError::Cancelled { stage } => *stage != "batch" && *stage != "synthesis",
            _ => true,
        }
    }
}

/// A non-fatal error for a single segment.
///
/// The batch continues unless every segment fails.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum SegmentError {
    /// Uploading the segment to the staging location failed.
    #[error("Segment {segment}: staging failed: {detail}")]
    Staging { segment: usize, detail: String },

    /// The last inference attempt timed out.
    #[error("Segment {segment}: inference timed out after {secs}s ({attempts} attempts)")]
    InferenceTimeout {
        segment: usize,
        secs: u64,
        attempts: u32,
    },

    /// The inference service returned an error on every attempt.
    #[error("Segment {segment}: inference failed after {attempts} attempts: {detail}")]
    Inference {
        segment: usize,
        attempts: u32,
        detail: String,
    },

    /// The model answered, but not with a JSON document.
    #[error("Segment {segment}: output is not valid JSON: {detail}")]
    Validation { segment: usize, detail: String },

    /// The analysis was cancelled before this segment finished.
    #[error("Segment {segment}: cancelled")]
    Cancelled { segment: usize },
}

/// Failures talking to the object store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {uri}")]
    NotFound { uri: String },

    #[error("Invalid object URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("HTTP {status} from object store for '{target}': {message}")]
    Http {
        status: u16,
        target: String,
        message: String,
    },

    #[error("Object store request for '{target}' failed: {reason}")]
    Request { target: String, reason: String },

    #[error("Local I/O on '{path}' failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Whether retrying the same call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::NotFound { .. } | StorageError::InvalidUri { .. } => false,
            StorageError::Http { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            StorageError::Request { .. } => true,
            StorageError::Io { source, .. } => source.kind() != std::io::ErrorKind::NotFound,
        }
    }
}

/// A service-level failure reported by the inference backend.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    #[error("Inference service error: {0}")]
    Service(String),

    #[error("Inference provider '{provider}' is not configured.\n{hint}")]
    NotConfigured { provider: String, hint: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_valid_segments_display() {
        let e = AnalysisError::NoValidSegments {
            total: 3,
            first_error: "Segment 0: cancelled".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("all 3 segments"), "got: {msg}");
        assert_eq!(e.tag(), "NoValidSegments");
        assert!(!e.is_preflight());
    }

    #[test]
    fn normalization_is_preflight() {
        let e = AnalysisError::NormalizationFailed {
            location: "gs://b/deck.pptx".into(),
            reason: "soffice not found".into(),
        };
        assert!(e.is_preflight());
        assert_eq!(e.tag(), "NormalizationFailed");
        assert!(e.to_string().contains("deck.pptx"));
    }

    #[test]
    fn cancelled_preflight_depends_on_stage() {
        assert!(AnalysisError::Cancelled { stage: "segmentation" }.is_preflight());
        assert!(!AnalysisError::Cancelled { stage: "batch" }.is_preflight());
    }

    #[test]
    fn segment_timeout_display() {
        let e = SegmentError::InferenceTimeout {
            segment: 2,
            secs: 120,
            attempts: 3,
        };
        assert!(e.to_string().contains("120s"));
        assert!(e.to_string().contains("Segment 2"));
    }

    #[test]
    fn storage_transience() {
        let http = |status| StorageError::Http {
            status,
            target: "k".into(),
            message: String::new(),
        };
        assert!(http(503).is_transient());
        assert!(http(429).is_transient());
        assert!(!http(403).is_transient());
        assert!(!StorageError::NotFound { uri: "gs://b/o".into() }.is_transient());
    }
}
