//! Internal data structures backing the table.

pub mod recency;
pub(crate) mod timer;

pub use recency::{RecencyList, SlotId};
