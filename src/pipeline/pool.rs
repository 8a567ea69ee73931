//! Segment worker pool: bounded fan-out of the inference adapter.
//!
//! `buffer_unordered(C)` keeps at most `C` segments in flight and drives
//! every one of them to completion; a failed segment is just another
//! outcome. Outcomes arrive in completion order and are re-sorted by
//! ordinal before they leave the pool, so "earliest chunk wins" during
//! synthesis means earliest in the artifact.

use crate::pipeline::adapter::{analyze_segment, SegmentContext, SegmentOutcome};
use crate::pipeline::segment::Segment;
use futures::stream::{self, StreamExt};
use tracing::info;

/// Run every segment through the adapter with at most `concurrency` in
/// flight. Returns one outcome per segment, ordered by ordinal.
pub async fn run_segments(
    ctx: &SegmentContext<'_>,
    segments: Vec<Segment>,
    concurrency: usize,
) -> Vec<SegmentOutcome> {
    let total = segments.len();
    let progress = ctx.config.progress_callback.as_ref();

    let mut outcomes: Vec<SegmentOutcome> = stream::iter(segments.into_iter().map(|segment| async move {
        let ordinal = segment.ordinal;
        if let Some(cb) = progress {
            cb.on_segment_start(ordinal, total);
        }
        let outcome = analyze_segment(ctx, segment).await;
        if let Some(cb) = progress {
            match &outcome.report.error {
                None => cb.on_segment_complete(ordinal, total, outcome.report.payload_len),
                Some(e) => cb.on_segment_error(ordinal, total, &e.to_string()),
            }
        }
        outcome
    }))
    .buffer_unordered(concurrency.max(1))
    .collect()
    .await;

    outcomes.sort_by_key(|o| o.report.ordinal);
    let ok = outcomes.iter().filter(|o| o.partial.is_some()).count();
    info!("Batch finished: {}/{} segments produced results", ok, total);
    outcomes
}
