//! Recording and snapshotting seams for fetch metrics.

use std::time::Duration;

/// Receives one sample per observed fetch.
///
/// Implementations must be cheap and must not call back into the table
/// being observed.
pub trait FetchObserver: Send + Sync {
    /// Records the outcome of one fetch: the resource category it hit,
    /// whether an existing value was found, and how long the lookup
    /// took.
    fn observe_fetch(&self, category: &str, hit: bool, duration: Duration);
}

/// Read side: anything that can produce a point-in-time snapshot of its
/// counters.
pub trait MetricsSnapshotProvider<S> {
    /// Captures the current counter values.
    fn snapshot(&self) -> S;
}

/// Observer that drops every sample. Useful as a default wiring.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl FetchObserver for NoopObserver {
    fn observe_fetch(&self, _category: &str, _hit: bool, _duration: Duration) {}
}
