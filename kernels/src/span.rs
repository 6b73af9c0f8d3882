//! Thread-id-based work partitioning within a unit.
//!
//! Worker threads split a unit's local range into contiguous spans. Spans are
//! aligned up to a granularity (2 elements for 4-byte scalars) so that every
//! worker's output lands on the 8-byte transfer boundary; only the final span
//! may be short.

use std::ops::Range;

/// The nominal per-worker span for `total` elements on `workers` threads.
///
/// The span is `ceil(total / workers)` aligned up to `granularity`.
pub fn worker_span(total: usize, workers: usize, granularity: usize) -> usize {
    debug_assert!(workers > 0 && granularity > 0);
    let raw = total.div_ceil(workers);
    raw.div_ceil(granularity) * granularity
}

/// The per-worker element ranges for `total` elements on `workers` threads.
///
/// Every range but the last has the nominal span; the last carries the
/// remainder. Workers past the end of the data get no range at all.
pub fn worker_spans(
    total: usize,
    workers: usize,
    granularity: usize,
) -> impl Iterator<Item = Range<usize>> {
    let span = worker_span(total, workers, granularity).max(granularity);
    (0..workers)
        .map(move |w| {
            let start = (w * span).min(total);
            start..((w + 1) * span).min(total)
        })
        .filter(|r| !r.is_empty())
}
