//! Error types for the memotable library.
//!
//! The table's operation surface is infallible: absence and staleness
//! collapse into `Option`/`bool` returns. The one error type here backs
//! [`Table::check_invariants`](crate::table::Table::check_invariants),
//! the test-facing audit of the table's structural invariants.

use std::fmt;

/// Error returned when an internal invariant is violated.
///
/// Carries a human-readable description of which invariant failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantError(String);

impl InvariantError {
    /// Creates a new `InvariantError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvariantError {}
