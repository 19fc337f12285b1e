//! Per-call options for table writes and refreshes.
//!
//! Both option structs carry one knob: an optional keep-alive duration
//! that overrides the table's default TTL for that call. `Duration::ZERO`
//! is a meaningful override; it clears the entry's deadline.

use std::time::Duration;

/// Options accepted by [`Table::set_with`](crate::table::Table::set_with).
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    /// Keep-alive duration for this write. `None` uses the table's
    /// default TTL; `Some(Duration::ZERO)` removes the deadline.
    pub keep_alive: Option<Duration>,
}

impl SetOptions {
    /// Overrides the table's default TTL for this call.
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.keep_alive = Some(duration);
        self
    }
}

/// Options accepted by
/// [`Table::keep_alive_with`](crate::table::Table::keep_alive_with).
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAliveOptions {
    /// Refresh duration for this call. `None` uses the table's default
    /// TTL; `Some(Duration::ZERO)` removes the deadline.
    pub duration: Option<Duration>,
}

impl KeepAliveOptions {
    /// Overrides the table's default TTL for this call.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}
