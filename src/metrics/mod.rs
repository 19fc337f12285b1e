//! # Fetch metrics
//!
//! Observability for the table's lookup path, split the same way the
//! rest of the crate splits concerns: *recording* (the
//! [`FetchObserver`] trait), *aggregation* (the [`FetchHistogram`]),
//! and *consumption* ([`FetchMetricsSnapshot`] for tests, benches, and
//! exporter adapters).
//!
//! ```text
//!   MeteredTable::fetch ──(hit, category, duration)──► FetchObserver
//!                                                          │
//!                                  FetchHistogram ◄────────┘
//!                                       │
//!                                       ▼
//!                              FetchMetricsSnapshot
//!                        (per-series counts + ms buckets)
//! ```
//!
//! The crate aggregates in-process and stays backend-agnostic: a binary
//! that exports to a monitoring system implements [`FetchObserver`] (or
//! periodically drains [`FetchHistogram::snapshot`]) and feeds whatever
//! client it uses. Observers run on the caller's thread after the table
//! lock is released; they must not call back into the table they
//! observe.

pub mod histogram;
pub mod snapshot;
pub mod traits;

pub use histogram::FetchHistogram;
pub use snapshot::{FetchMetricsSnapshot, FetchSeriesSnapshot};
pub use traits::{FetchObserver, MetricsSnapshotProvider};
