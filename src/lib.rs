//! memotable: concurrent, bounded, TTL-based memoization table with
//! LRU eviction and change notifications.
//!
//! See `DESIGN.md` for internal architecture and invariants, and
//! [`table`] for the operation contract.

pub mod ds;
pub mod error;
pub mod options;
pub mod table;

mod entry;

pub mod builder;
pub mod prelude;

#[cfg(feature = "metrics")]
pub mod metered;
#[cfg(feature = "metrics")]
pub mod metrics;

pub use options::{KeepAliveOptions, SetOptions};
pub use table::{Exchanger, NoopExchanger, Table};

#[cfg(feature = "metrics")]
pub use metered::{MeteredTable, ResourceKey};
