//! One cached record and the pool that recycles them.
//!
//! An [`Entry`] owns its key, value, deadline, timer handle, and a
//! `closed` tombstone flag, all behind one `parking_lot::Mutex`. Every
//! mutation is qualified by a generation number (`seq`): the caller
//! captures the generation it observed and the entry refuses to act if
//! the generation has moved on. That single rule makes every
//! asynchronous actor (late timer callbacks, post-unlink releases,
//! updates racing a delete) an idempotent no-op instead of a
//! use-after-repurpose bug.
//!
//! ## Entry state machine
//!
//! ```text
//!   ∅ ──insert(ttl=0)──► Live-NoDeadline ◄──keep_alive(0)──┐
//!   ∅ ──insert(ttl>0)──► Live-Timed ──────keep_alive(δ)────┘
//!                            │  ▲
//!                            ▼  │ (re-arm)
//!                        Live-Timed
//!
//!   any Live-* ──release──► Closed (terminal; slot recyclable via pool)
//! ```
//!
//! `seq` changes only when the pool hands the slot to a new insertion;
//! refreshes re-arm the timer without bumping the generation, so a timer
//! callback armed before a refresh is defused by the deadline check, and
//! one armed before a recycle is defused by the generation check.
//!
//! The exchanger is invoked while this entry's lock is held (never the
//! table lock), which is what serializes a key's insert → update* →
//! release notifications.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::ds::timer::{TimerHandle, TimerQueue};
use crate::table::{Exchanger, TableShared};

/// Pooled entries kept for reuse once released.
const MAX_POOLED: usize = 64;

/// Mutable state of one cached record. All fields are guarded by the
/// entry's mutex; `key` and `value` are `None` only while the entry sits
/// in the pool.
pub(crate) struct EntryState<K, V> {
    pub(crate) key: Option<K>,
    pub(crate) value: Option<Arc<V>>,
    pub(crate) seq: u64,
    pub(crate) deadline: Option<Instant>,
    pub(crate) timer: Option<TimerHandle>,
    pub(crate) closed: bool,
    pub(crate) table: Weak<TableShared<K, V>>,
}

impl<K, V> EntryState<K, V> {
    /// A deadline in the past means expired; no deadline never expires.
    #[inline]
    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) => deadline <= now,
            None => false,
        }
    }
}

/// One cached record. Shared as `Arc<Entry>` between the table's indexes
/// and in-flight timer callbacks (which hold only a `Weak`).
pub(crate) struct Entry<K, V> {
    pub(crate) state: Mutex<EntryState<K, V>>,
}

impl<K, V> Entry<K, V>
where
    K: Clone + Eq + std::hash::Hash + Send + 'static,
    V: Send + Sync + 'static,
{
    /// A blank, closed entry, as the pool stores them.
    fn blank() -> Self {
        Entry {
            state: Mutex::new(EntryState {
                key: None,
                value: None,
                seq: 0,
                deadline: None,
                timer: None,
                closed: true,
                table: Weak::new(),
            }),
        }
    }

    /// Current generation.
    #[inline]
    pub(crate) fn seq(&self) -> u64 {
        self.state.lock().seq
    }

    /// Whether the deadline has passed as of `now`.
    #[inline]
    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        self.state.lock().is_expired(now)
    }

    /// Reads the value, qualified by the observed generation.
    ///
    /// Returns `None` when the generation moved on, the entry closed, or
    /// the deadline passed: the "stale observation" cases callers
    /// translate into a miss or a retry.
    pub(crate) fn read(&self, now: Instant, seq: u64) -> Option<Arc<V>> {
        let state = self.state.lock();
        if state.seq != seq || state.closed || state.is_expired(now) {
            return None;
        }
        state.value.clone()
    }

    /// Reports a replacement write to the exchanger without touching the
    /// stored value. Returns `false` (and stays silent) if the observed
    /// generation is stale or the entry already closed.
    pub(crate) fn update(&self, exchanger: &dyn Exchanger<K, V>, new: &Arc<V>, seq: u64) -> bool {
        let state = self.state.lock();
        if state.seq != seq || state.closed {
            return false;
        }
        if let (Some(key), Some(old)) = (state.key.as_ref(), state.value.as_ref()) {
            exchanger.exchange(key, Some(new.as_ref()), Some(old.as_ref()), false);
        }
        true
    }

    /// Re-arms (or clears) the deadline, qualified by the observed
    /// generation.
    ///
    /// Any prior timer is cancelled first; a zero duration clears the
    /// deadline entirely. The scheduled callback captures the current
    /// generation, so a callback outliving this arming can never act on
    /// a recycled slot.
    ///
    /// Associated-function form because the callback needs a `Weak` of
    /// the owning `Arc`.
    pub(crate) fn keep_alive(
        this: &Arc<Self>,
        duration: Duration,
        seq: u64,
        timers: &TimerQueue,
    ) -> bool {
        let mut state = this.state.lock();
        if state.seq != seq || state.closed {
            return false;
        }
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        if duration > Duration::ZERO {
            state.deadline = Some(Instant::now() + duration);
            let entry = Arc::downgrade(this);
            state.timer = Some(timers.arm(
                duration,
                Box::new(move || {
                    if let Some(entry) = entry.upgrade() {
                        entry.on_deadline(seq);
                    }
                }),
            ));
        } else {
            state.deadline = None;
        }
        true
    }

    /// Timer callback: asks the owning table for a generation-qualified
    /// delete, but only if this entry is still the same generation, not
    /// closed, and actually past its deadline (a re-arm between the
    /// original arming and this fire moves the deadline forward and
    /// defuses the callback).
    fn on_deadline(&self, seq: u64) {
        let (key, table) = {
            let state = self.state.lock();
            if state.seq != seq || state.closed || !state.is_expired(Instant::now()) {
                return;
            }
            (state.key.clone(), state.table.upgrade())
        };
        if let (Some(key), Some(table)) = (key, table) {
            table.delete_by_seq(&key, seq);
        }
    }

    /// Terminal transition: cancels the timer, tombstones the entry, and
    /// reports the release to the exchanger with the last value.
    ///
    /// Returns `true` exactly once per live generation; a stale or
    /// repeated call is a no-op, which is what guarantees the
    /// one-release-notification-per-entry contract.
    pub(crate) fn release(&self, exchanger: &dyn Exchanger<K, V>, seq: u64) -> bool {
        let mut state = self.state.lock();
        if state.seq != seq || state.closed {
            return false;
        }
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        state.closed = true;
        state.deadline = None;
        let key = state.key.take();
        let value = state.value.take();
        if let Some(key) = key.as_ref() {
            exchanger.exchange(key, None, value.as_deref(), true);
        }
        true
    }
}

/// Free list of released entries, reused by subsequent insertions.
///
/// Recycling is safe even while stale `Weak` references to a pooled
/// entry are still in flight: the generation assigned at checkout
/// invalidates every observation captured before the recycle. The list
/// is capped so burst-then-idle workloads do not pin memory.
pub(crate) struct EntryPool<K, V> {
    free: Mutex<Vec<Arc<Entry<K, V>>>>,
}

impl<K, V> EntryPool<K, V>
where
    K: Clone + Eq + std::hash::Hash + Send + 'static,
    V: Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        EntryPool {
            free: Mutex::new(Vec::new()),
        }
    }

    /// Hands out a pooled entry, or a blank one if the pool is empty.
    /// The caller overwrites every field before linking it anywhere.
    pub(crate) fn get(&self) -> Arc<Entry<K, V>> {
        if let Some(entry) = self.free.lock().pop() {
            return entry;
        }
        Arc::new(Entry::blank())
    }

    /// Returns a released entry to the pool.
    pub(crate) fn put(&self, entry: Arc<Entry<K, V>>) {
        let mut free = self.free.lock();
        if free.len() < MAX_POOLED {
            free.push(entry);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.free.lock().len()
    }
}
