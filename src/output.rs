//! Result types returned by a successful analysis.

use crate::error::SegmentError;
use crate::pipeline::segment::SegmentSpan;
use serde::{Deserialize, Serialize};

/// The synthesized result plus a per-segment run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutput {
    /// The synthesized JSON document, validated as parseable.
    pub json: String,
    /// `json` parsed, for callers that want to inspect fields directly.
    pub value: serde_json::Value,
    /// One report per segment, in segment order.
    pub segments: Vec<SegmentReport>,
    pub stats: AnalysisStats,
}

/// What happened to one segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentReport {
    /// 0-based position of the segment in the artifact.
    pub ordinal: usize,
    pub span: SegmentSpan,
    /// Inference attempts made (0 when staging failed first).
    pub attempts: u32,
    pub duration_ms: u64,
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// Byte length of the validated partial result, if any.
    pub payload_len: usize,
    /// Set when the segment produced no partial result.
    pub error: Option<SegmentError>,
}

impl SegmentReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate numbers for one analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub total_segments: usize,
    pub succeeded_segments: usize,
    pub failed_segments: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub segmentation_duration_ms: u64,
    pub batch_duration_ms: u64,
    pub synthesis_duration_ms: u64,
    pub total_duration_ms: u64,
    /// Staged objects whose deletion could not be confirmed. Each one is also
    /// logged with its key for out-of-band cleanup.
    pub leaked_staging_objects: usize,
}
