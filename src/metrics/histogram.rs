//! In-process duration histogram for fetch outcomes.

use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::metrics::snapshot::{FetchMetricsSnapshot, FetchSeriesSnapshot};
use crate::metrics::traits::{FetchObserver, MetricsSnapshotProvider};

/// Upper bounds of the duration buckets, in milliseconds. Samples past
/// the last bound land in the overflow bucket.
pub const BUCKET_BOUNDS_MS: [u64; 10] = [1, 2, 5, 10, 25, 50, 100, 250, 500, 1000];

/// Bucket count including the overflow bucket.
pub const BUCKET_COUNT: usize = BUCKET_BOUNDS_MS.len() + 1;

#[derive(Default)]
struct Series {
    count: u64,
    total_ms: u64,
    buckets: [u64; BUCKET_COUNT],
}

impl Series {
    fn record(&mut self, millis: u64) {
        let bucket = BUCKET_BOUNDS_MS
            .iter()
            .position(|&bound| millis <= bound)
            .unwrap_or(BUCKET_BOUNDS_MS.len());
        self.buckets[bucket] += 1;
        self.count += 1;
        self.total_ms += millis;
    }
}

/// Histogram of fetch durations keyed by `(category, hit)`.
///
/// Recording takes one short mutex hold; series are created on first
/// sample. Snapshots are cheap copies intended for periodic export or
/// test assertions.
///
/// ```
/// use std::time::Duration;
/// use memotable::metrics::{FetchHistogram, FetchObserver, MetricsSnapshotProvider};
///
/// let histogram = FetchHistogram::new();
/// histogram.observe_fetch("users", true, Duration::from_millis(3));
/// histogram.observe_fetch("users", false, Duration::from_millis(40));
///
/// let snapshot = histogram.snapshot();
/// assert_eq!(snapshot.total_count(), 2);
/// assert_eq!(snapshot.series_for("users", true).map(|s| s.count), Some(1));
/// ```
#[derive(Default)]
pub struct FetchHistogram {
    series: Mutex<FxHashMap<(String, bool), Series>>,
}

impl FetchHistogram {
    /// Creates an empty histogram.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FetchObserver for FetchHistogram {
    fn observe_fetch(&self, category: &str, hit: bool, duration: Duration) {
        let millis = duration.as_millis().min(u128::from(u64::MAX)) as u64;
        self.series
            .lock()
            .entry((category.to_owned(), hit))
            .or_default()
            .record(millis);
    }
}

impl MetricsSnapshotProvider<FetchMetricsSnapshot> for FetchHistogram {
    fn snapshot(&self) -> FetchMetricsSnapshot {
        let series = self.series.lock();
        let mut out: Vec<FetchSeriesSnapshot> = series
            .iter()
            .map(|((category, hit), series)| FetchSeriesSnapshot {
                category: category.clone(),
                hit: *hit,
                count: series.count,
                total_ms: series.total_ms,
                buckets: series.buckets,
            })
            .collect();
        out.sort_by(|a, b| a.category.cmp(&b.category).then(a.hit.cmp(&b.hit)));
        FetchMetricsSnapshot { series: out }
    }
}
