//! Fluent construction for [`Table`].
//!
//! ```
//! use std::time::Duration;
//! use memotable::{Table, builder::TableBuilder};
//!
//! let table: Table<u64, String> = TableBuilder::new()
//!     .max_entries(1024)
//!     .default_ttl(Duration::from_secs(30))
//!     .build();
//! table.set(1, "hello".to_string());
//! assert_eq!(table.len(), 1);
//! ```

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::table::{Exchanger, NoopExchanger, Table};

/// Builder for a [`Table`].
///
/// Every knob has a usable default: unbounded, no TTL, no exchanger.
pub struct TableBuilder<K, V> {
    max_entries: usize,
    default_ttl: Duration,
    exchanger: Option<Arc<dyn Exchanger<K, V>>>,
}

impl<K, V> TableBuilder<K, V>
where
    K: Clone + Eq + Hash + Send + 'static,
    V: Send + Sync + 'static,
{
    /// Starts a builder with defaults: unbounded, no TTL, no exchanger.
    pub fn new() -> Self {
        TableBuilder {
            max_entries: 0,
            default_ttl: Duration::ZERO,
            exchanger: None,
        }
    }

    /// Caps the table at `max_entries` live entries; `0` (the default)
    /// means unbounded.
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Default keep-alive duration applied on insert and refresh;
    /// `Duration::ZERO` (the default) means no deadline.
    pub fn default_ttl(mut self, default_ttl: Duration) -> Self {
        self.default_ttl = default_ttl;
        self
    }

    /// Installs the transition callback.
    pub fn exchanger<E>(mut self, exchanger: E) -> Self
    where
        E: Exchanger<K, V> + 'static,
    {
        self.exchanger = Some(Arc::new(exchanger));
        self
    }

    /// Builds the table.
    pub fn build(self) -> Table<K, V> {
        let exchanger = self
            .exchanger
            .unwrap_or_else(|| Arc::new(NoopExchanger));
        Table::with_exchanger_arc(self.max_entries, self.default_ttl, exchanger)
    }
}

impl<K, V> Default for TableBuilder<K, V>
where
    K: Clone + Eq + Hash + Send + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
