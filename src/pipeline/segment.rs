//! Segmentation: split a local artifact into bounded units of work.
//!
//! Documents are split into page groups by [`crate::pipeline::pdf`]; audio
//! and video into fixed-duration slices by [`crate::pipeline::media`].
//! [`NativeSegmenter`] dispatches on [`MediaKind`]; the [`Segmenter`] trait
//! lets callers substitute their own splitter.
//!
//! Segmentation runs one call at a time per analysis. The page library
//! instance and the transcoder process are owned by that call alone.

use crate::artifact::MediaKind;
use crate::cancel::CancelSignal;
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The slice of the artifact a segment covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SegmentSpan {
    /// 1-based inclusive page range.
    Pages { start: usize, end: usize },
    /// Time range in seconds, end exclusive. The last slice's end is the
    /// nominal boundary unless the duration was probed.
    Time { start_secs: u64, end_secs: u64 },
}

impl std::fmt::Display for SegmentSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentSpan::Pages { start, end } if start == end => write!(f, "page {start}"),
            SegmentSpan::Pages { start, end } => write!(f, "pages {start}-{end}"),
            SegmentSpan::Time { start_secs, end_secs } => write!(f, "{start_secs}s-{end_secs}s"),
        }
    }
}

/// One bounded unit of work, materialised as a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// 0-based position in the artifact.
    pub ordinal: usize,
    pub path: PathBuf,
    pub span: SegmentSpan,
}

/// Every segment of one artifact plus their shared format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSet {
    /// Ordered by `ordinal`.
    pub segments: Vec<Segment>,
    pub mime_type: String,
    /// File extension used for staged copies (`pdf`, `mp3`, `mp4`).
    pub extension: String,
}

impl SegmentSet {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Splits a local artifact into segments under `out_dir`.
///
/// Implementations must delete `source` once the segments are written, and
/// return [`AnalysisError::SegmentationFailed`] rather than an empty set.
#[async_trait]
pub trait Segmenter: Send + Sync {
    async fn segment(
        &self,
        source: &Path,
        kind: MediaKind,
        out_dir: &Path,
        config: &AnalysisConfig,
        cancel: &CancelSignal,
    ) -> Result<SegmentSet, AnalysisError>;
}

/// pdfium for documents, ffmpeg for audio and video.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeSegmenter;

#[async_trait]
impl Segmenter for NativeSegmenter {
    async fn segment(
        &self,
        source: &Path,
        kind: MediaKind,
        out_dir: &Path,
        config: &AnalysisConfig,
        cancel: &CancelSignal,
    ) -> Result<SegmentSet, AnalysisError> {
        let set = match kind {
            MediaKind::Document => crate::pipeline::pdf::split_document(source, out_dir, config).await?,
            MediaKind::Audio | MediaKind::Video => {
                crate::pipeline::media::split_media(source, kind, out_dir, config, cancel).await?
            }
        };
        if set.is_empty() {
            return Err(AnalysisError::SegmentationFailed {
                reason: format!("{kind} produced zero segments"),
            });
        }
        Ok(set)
    }
}

/// 0-based half-open page ranges `[i*k, min((i+1)*k, P))` covering `[0, P)`.
pub fn plan_page_ranges(pages: usize, per_segment: usize) -> Vec<(usize, usize)> {
    if per_segment == 0 {
        return Vec::new();
    }
    (0..pages.div_ceil(per_segment))
        .map(|i| (i * per_segment, ((i + 1) * per_segment).min(pages)))
        .collect()
}

/// `ceil(duration / slice)` for a media duration in seconds.
pub fn expected_media_segments(duration_secs: f64, slice_secs: u64) -> usize {
    if slice_secs == 0 || !duration_secs.is_finite() || duration_secs <= 0.0 {
        return 0;
    }
    (duration_secs / slice_secs as f64).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twenty_five_pages_by_ten() {
        assert_eq!(plan_page_ranges(25, 10), vec![(0, 10), (10, 20), (20, 25)]);
    }

    #[test]
    fn ranges_cover_without_overlap() {
        for pages in 0..60 {
            for k in 1..13 {
                let ranges = plan_page_ranges(pages, k);
                assert_eq!(ranges.len(), pages.div_ceil(k));
                let mut next = 0;
                for (start, end) in &ranges {
                    assert_eq!(*start, next);
                    assert!(end > start && end - start <= k);
                    next = *end;
                }
                assert_eq!(next, pages);
            }
        }
    }

    #[test]
    fn zero_pages_zero_segments() {
        assert!(plan_page_ranges(0, 10).is_empty());
        assert!(plan_page_ranges(10, 0).is_empty());
    }

    #[test]
    fn media_segment_count() {
        assert_eq!(expected_media_segments(900.0, 300), 3);
        assert_eq!(expected_media_segments(901.5, 300), 4);
        assert_eq!(expected_media_segments(12.0, 300), 1);
        assert_eq!(expected_media_segments(0.0, 300), 0);
        assert_eq!(expected_media_segments(f64::NAN, 300), 0);
    }

    #[test]
    fn span_display() {
        assert_eq!(SegmentSpan::Pages { start: 11, end: 20 }.to_string(), "pages 11-20");
        assert_eq!(SegmentSpan::Pages { start: 3, end: 3 }.to_string(), "page 3");
        assert_eq!(
            SegmentSpan::Time { start_secs: 300, end_secs: 600 }.to_string(),
            "300s-600s"
        );
    }
}
