//! Metered wrapper over the table's lookup path.
//!
//! [`MeteredTable`] owns a [`Table`] keyed by [`ResourceKey`] and an
//! observer; every `fetch` is timed and reported as a
//! `(category, hit, duration)` sample. The observer runs on the calling
//! thread, strictly after the inner fetch returns, so it can never
//! re-enter the table mid-operation; the reentrancy ban on exchangers
//! extends to observers by construction here.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use crate::metrics::traits::FetchObserver;
use crate::table::Table;

/// Cache key carrying a metrics category alongside an opaque payload.
///
/// The category labels histogram series; the payload distinguishes
/// resources within a category. Both participate in equality and
/// hashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey<P> {
    pub category: String,
    pub payload: P,
}

impl<P> ResourceKey<P> {
    pub fn new(category: impl Into<String>, payload: P) -> Self {
        ResourceKey {
            category: category.into(),
            payload,
        }
    }
}

/// A [`Table`] whose `fetch` outcomes are sampled into an observer.
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use memotable::metrics::{FetchHistogram, MetricsSnapshotProvider};
/// use memotable::{MeteredTable, ResourceKey, Table};
///
/// let histogram = Arc::new(FetchHistogram::new());
/// let table: Table<ResourceKey<u64>, String> = Table::new(0, Duration::ZERO);
/// let observer: Arc<dyn memotable::metrics::FetchObserver> = Arc::clone(&histogram) as Arc<_>;
/// let metered = MeteredTable::new(table, observer);
///
/// let key = ResourceKey::new("users", 7u64);
/// metered.fetch(key.clone(), "first".to_string());  // miss
/// metered.fetch(key, "second".to_string());         // hit
///
/// let snapshot = histogram.snapshot();
/// assert_eq!(snapshot.series_for("users", false).map(|s| s.count), Some(1));
/// assert_eq!(snapshot.series_for("users", true).map(|s| s.count), Some(1));
/// ```
pub struct MeteredTable<P, V> {
    table: Table<ResourceKey<P>, V>,
    observer: Arc<dyn FetchObserver>,
}

impl<P, V> MeteredTable<P, V>
where
    P: Clone + Eq + Hash + Send + 'static,
    V: Send + Sync + 'static,
{
    /// Wraps `table`, reporting every fetch to `observer`.
    pub fn new(table: Table<ResourceKey<P>, V>, observer: Arc<dyn FetchObserver>) -> Self {
        MeteredTable { table, observer }
    }

    /// Timed [`Table::fetch`]: returns the present value or inserts
    /// `default`, and records `(category, hit, duration)`.
    pub fn fetch(&self, key: ResourceKey<P>, default: V) -> (Arc<V>, bool) {
        let category = key.category.clone();
        let start = Instant::now();
        let (value, loaded) = self.table.fetch(key, default);
        self.observer.observe_fetch(&category, loaded, start.elapsed());
        (value, loaded)
    }

    /// The wrapped table, for the unmetered operations.
    pub fn table(&self) -> &Table<ResourceKey<P>, V> {
        &self.table
    }
}

impl<P, V> fmt::Debug for MeteredTable<P, V>
where
    P: Clone + Eq + Hash + Send + 'static,
    V: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeteredTable")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}
