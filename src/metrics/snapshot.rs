//! Point-in-time views of the fetch histogram.

use crate::metrics::histogram::BUCKET_COUNT;

/// One `(category, hit)` series of the fetch histogram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSeriesSnapshot {
    /// Resource category the samples belong to.
    pub category: String,
    /// `true` for hit samples, `false` for miss samples.
    pub hit: bool,
    /// Total samples in this series.
    pub count: u64,
    /// Sum of sample durations, in milliseconds.
    pub total_ms: u64,
    /// Per-bucket sample counts; the last bucket is the overflow.
    /// Bounds are [`BUCKET_BOUNDS_MS`](crate::metrics::histogram::BUCKET_BOUNDS_MS).
    pub buckets: [u64; BUCKET_COUNT],
}

/// All series of a [`FetchHistogram`](crate::metrics::FetchHistogram),
/// sorted by category, misses before hits within a category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchMetricsSnapshot {
    pub series: Vec<FetchSeriesSnapshot>,
}

impl FetchMetricsSnapshot {
    /// Finds one series by label pair.
    pub fn series_for(&self, category: &str, hit: bool) -> Option<&FetchSeriesSnapshot> {
        self.series
            .iter()
            .find(|series| series.category == category && series.hit == hit)
    }

    /// Total samples across all series.
    pub fn total_count(&self) -> u64 {
        self.series.iter().map(|series| series.count).sum()
    }
}
