//! Progress-callback trait for per-segment analysis events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through the segments.
//!
//! # Example
//!
//! ```rust
//! use chunkwise::{AnalysisProgressCallback, AnalysisConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl AnalysisProgressCallback for CountingCallback {
//!     fn on_segment_complete(&self, ordinal: usize, total: usize, payload_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("segment {}/{} done ({} bytes)", ordinal + 1, total, payload_len);
//!     }
//! }
//!
//! let config = AnalysisConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes each segment.
///
/// Segment events arrive concurrently from up to `concurrency` segments and
/// in completion order. All methods default to no-ops.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called once segmentation has produced `total_segments` segments.
    fn on_analysis_start(&self, total_segments: usize) {
        let _ = total_segments;
    }

    /// Called just before a segment is staged. `ordinal` is 0-based.
    fn on_segment_start(&self, ordinal: usize, total: usize) {
        let _ = (ordinal, total);
    }

    /// Called when a segment produced a validated partial result.
    fn on_segment_complete(&self, ordinal: usize, total: usize, payload_len: usize) {
        let _ = (ordinal, total, payload_len);
    }

    /// Called when a segment was dropped.
    fn on_segment_error(&self, ordinal: usize, total: usize, error: &str) {
        let _ = (ordinal, total, error);
    }

    /// Called before partial results are combined.
    fn on_synthesis_start(&self, partials: usize) {
        let _ = partials;
    }

    /// Called once after the batch, whatever the outcome.
    fn on_analysis_complete(&self, total_segments: usize, success_count: usize) {
        let _ = (total_segments, success_count);
    }
}

/// A no-op implementation, the default when no callback is configured.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl AnalysisProgressCallback for TrackingCallback {
        fn on_segment_start(&self, _ordinal: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_segment_complete(&self, _ordinal: usize, _total: usize, _payload_len: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_segment_error(&self, _ordinal: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_analysis_start(3);
        cb.on_segment_start(0, 3);
        cb.on_segment_complete(0, 3, 42);
        cb.on_segment_error(1, 3, "timeout");
        cb.on_synthesis_start(1);
        cb.on_analysis_complete(3, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker: Arc<TrackingCallback> = Arc::default();
        let cb: ProgressCallback = tracker.clone();
        cb.on_segment_start(0, 2);
        cb.on_segment_complete(0, 2, 10);
        cb.on_segment_start(1, 2);
        cb.on_segment_error(1, 2, "bad json");
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }
}
