//! # Concurrent bounded TTL memoization table
//!
//! The [`Table`] maps caller-chosen keys to opaque values, evicts
//! least-recently-used entries past a size cap, expires entries after a
//! per-entry keep-alive duration, and reports every insert / replace /
//! release transition to a caller-supplied [`Exchanger`].
//!
//! ## Architecture
//!
//! ```text
//!   ┌───────────────────────────────────────────────────────────────────┐
//!   │                           Table<K, V>                             │
//!   │                  (cloneable handle, Arc-shared)                   │
//!   │                                                                   │
//!   │   ┌───────────────────────────────────────────────────────────┐   │
//!   │   │              Mutex<TableState<K, V>>                      │   │
//!   │   │                                                           │   │
//!   │   │   FxHashMap<K, SlotId>        RecencyList<Arc<Entry>>     │   │
//!   │   │   ┌─────────┬────────┐        head ─► [A]◄──►[B]◄──►[C]   │   │
//!   │   │   │   key   │ SlotId │──────►        oldest      newest   │   │
//!   │   │   └─────────┴────────┘                (LRU)       (MRU)   │   │
//!   │   └───────────────────────────────────────────────────────────┘   │
//!   │                                                                   │
//!   │   seq: AtomicU64      EntryPool       TimerQueue (worker thread)  │
//!   │   (generations)       (free list)     min-heap of deadline jobs   │
//!   └───────────────────────────────────────────────────────────────────┘
//!
//!   Each Arc<Entry> carries its own Mutex over {key, value, seq,
//!   deadline, timer, closed} plus a Weak back-reference to the shared
//!   state, used by timer callbacks to re-enter through delete_by_seq.
//! ```
//!
//! ## Operations
//!
//! | Method            | Recency  | Deadline   | Exchanger                      |
//! |-------------------|----------|------------|--------------------------------|
//! | `get`             | promotes | untouched  | —                              |
//! | `fetch` (hit)     | promotes | re-armed   | —                              |
//! | `fetch` (miss)    | inserts  | armed      | `(new, ⊥, false)`              |
//! | `set` (present)   | promotes | re-armed   | `(new, old, false)`            |
//! | `set` (absent)    | inserts  | armed      | `(new, ⊥, false)`              |
//! | `keep_alive`      | promotes | re-armed   | —                              |
//! | `delete`          | unlinks  | cancelled  | `(⊥, old, true)`               |
//! | eviction / expiry | unlinks  | cancelled  | `(⊥, old, true)`               |
//! | `clear`           | unlinks  | cancelled  | `(⊥, old, true)` per entry     |
//!
//! Note the `set` contract: on a present key it reports the new value
//! to the exchanger but does **not** replace the stored value. The
//! exchanger is the write-through channel; the cache is the read model.
//! Use `delete` followed by `set` to actually swap a stored value.
//!
//! ## Concurrency model
//!
//! Lock order is table → entry → timer heap, and no lock earlier in the
//! order is ever acquired while holding a later one. The exchanger runs
//! while the affected entry's lock is held, never the table lock, so a
//! key's notifications are linearized (insert, update*, release; exactly
//! one release) while the table stays available to other keys. The
//! exchanger must return quickly and must not call back into the same
//! table.
//!
//! Timer callbacks run on the queue's worker thread and race freely with
//! callers; every asynchronous action is qualified by the entry
//! generation it captured (see [`crate::entry`]), so a lapsed callback
//! or a post-eviction mutation is a no-op rather than a resurrection.
//!
//! Recency is strict under the table lock, but two operations racing on
//! the same key may promote in either order; eviction order is LRU as
//! observed by the lock.
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use memotable::Table;
//!
//! let table: Table<u32, String> = Table::new(100, Duration::ZERO);
//! table.set(1, "one".to_string());
//!
//! assert_eq!(table.get(&1).as_deref().map(String::as_str), Some("one"));
//! assert!(table.delete(&1));
//! assert!(table.get(&1).is_none());
//! ```

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::ds::timer::TimerQueue;
use crate::ds::{RecencyList, SlotId};
use crate::entry::{Entry, EntryPool, EntryState};
use crate::error::InvariantError;
use crate::options::{KeepAliveOptions, SetOptions};

/// Callback notified of every value transition in a [`Table`].
///
/// `exchange(key, new, old, released)` is invoked as:
///
/// - insert: `new = Some(inserted)`, `old = None`, `released = false`
/// - replace (`set` on a present key): `new = Some(argument)`,
///   `old = Some(current)`, `released = false`
/// - release (delete, eviction, expiry, clear): `new = None`,
///   `old = Some(last value)`, `released = true`
///
/// The exchanger is called exactly once per transition, while the
/// affected entry's lock is held. It must be quick and must not call
/// back into the same table.
///
/// Any `Fn(&K, Option<&V>, Option<&V>, bool) + Send + Sync` closure is
/// an exchanger.
pub trait Exchanger<K, V>: Send + Sync {
    /// Reports one state transition on `key`.
    fn exchange(&self, key: &K, new: Option<&V>, old: Option<&V>, released: bool);
}

impl<K, V, F> Exchanger<K, V> for F
where
    F: Fn(&K, Option<&V>, Option<&V>, bool) + Send + Sync,
{
    fn exchange(&self, key: &K, new: Option<&V>, old: Option<&V>, released: bool) {
        self(key, new, old, released)
    }
}

/// Exchanger that ignores every transition. The default when none is
/// supplied.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExchanger;

impl<K, V> Exchanger<K, V> for NoopExchanger {
    fn exchange(&self, _key: &K, _new: Option<&V>, _old: Option<&V>, _released: bool) {}
}

struct TableState<K, V> {
    index: FxHashMap<K, SlotId>,
    recency: RecencyList<Arc<Entry<K, V>>>,
}

/// Shared core behind every [`Table`] handle. Entries hold a `Weak`
/// back-reference to this so timer callbacks can re-enter.
pub(crate) struct TableShared<K, V> {
    max_entries: usize,
    default_ttl: Duration,
    exchanger: Arc<dyn Exchanger<K, V>>,
    seq: AtomicU64,
    pool: EntryPool<K, V>,
    timers: TimerQueue,
    state: Mutex<TableState<K, V>>,
}

impl<K, V> TableShared<K, V>
where
    K: Clone + Eq + Hash + Send + 'static,
    V: Send + Sync + 'static,
{
    /// Checks out a pooled entry and rewrites every field for a fresh
    /// insertion under a new generation.
    fn new_entry(self: &Arc<Self>, key: K, value: Arc<V>) -> (Arc<Entry<K, V>>, u64) {
        let entry = self.pool.get();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        {
            let mut state = entry.state.lock();
            if let Some(timer) = state.timer.take() {
                timer.cancel();
            }
            state.key = Some(key);
            state.value = Some(value);
            state.seq = seq;
            state.deadline = None;
            state.closed = false;
            state.table = Arc::downgrade(self);
        }
        (entry, seq)
    }

    /// Inserts a fresh entry at the most-recent position, evicting from
    /// the least-recent end past the cap. Victims are unlinked here
    /// (under the table lock) and collected for release after it drops.
    fn add_locked(
        self: &Arc<Self>,
        state: &mut TableState<K, V>,
        key: K,
        value: Arc<V>,
        ttl: Duration,
        evicted: &mut Vec<(Arc<Entry<K, V>>, u64)>,
    ) -> (Arc<Entry<K, V>>, u64) {
        let (entry, seq) = self.new_entry(key.clone(), value);
        let slot = state.recency.push_back(Arc::clone(&entry));
        state.index.insert(key, slot);

        if self.max_entries != 0 {
            while state.recency.len() > self.max_entries {
                let victim = match state.recency.pop_front() {
                    Some(victim) => victim,
                    None => break,
                };
                let (victim_key, victim_seq) = {
                    let victim_state = victim.state.lock();
                    (victim_state.key.clone(), victim_state.seq)
                };
                if let Some(victim_key) = victim_key {
                    state.index.remove(&victim_key);
                }
                evicted.push((victim, victim_seq));
            }
        }

        if ttl > Duration::ZERO {
            Entry::keep_alive(&entry, ttl, seq, &self.timers);
        }
        (entry, seq)
    }

    /// Looks up `key`; on a hit, re-arms its deadline with `ttl` and
    /// promotes it, on a miss inserts `value`. Returns the entry, its
    /// generation, and whether it was already present.
    fn load_locked(
        self: &Arc<Self>,
        state: &mut TableState<K, V>,
        key: &K,
        value: &Arc<V>,
        ttl: Duration,
        evicted: &mut Vec<(Arc<Entry<K, V>>, u64)>,
    ) -> (Arc<Entry<K, V>>, u64, bool) {
        if let Some(&slot) = state.index.get(key) {
            if let Some(entry) = state.recency.get(slot).cloned() {
                let seq = entry.seq();
                Entry::keep_alive(&entry, ttl, seq, &self.timers);
                state.recency.move_to_back(slot);
                return (entry, seq, true);
            }
        }
        let (entry, seq) = self.add_locked(state, key.clone(), Arc::clone(value), ttl, evicted);
        (entry, seq, false)
    }

    /// Reports an insertion to the exchanger. The caller holds the
    /// entry's lock (and has already dropped the table lock), so no
    /// release can be reported ahead of this insert.
    fn announce_insert(&self, entry_state: &EntryState<K, V>) {
        if let (Some(key), Some(value)) = (entry_state.key.as_ref(), entry_state.value.as_ref()) {
            self.exchanger.exchange(key, Some(value.as_ref()), None, false);
        }
    }

    /// Releases an unlinked entry and recycles it. Returns `true` iff
    /// this call performed the release (the generation was still live).
    fn release_entry(&self, entry: Arc<Entry<K, V>>, seq: u64) -> bool {
        if entry.release(self.exchanger.as_ref(), seq) {
            self.pool.put(entry);
            return true;
        }
        false
    }

    fn finish_evictions(&self, evicted: Vec<(Arc<Entry<K, V>>, u64)>) {
        for (entry, seq) in evicted {
            self.release_entry(entry, seq);
        }
    }

    /// Generation-qualified delete, used by timer callbacks: removes
    /// `key` only if the entry currently indexed under it still carries
    /// the generation the caller captured.
    pub(crate) fn delete_by_seq(&self, key: &K, seq: u64) -> bool {
        let entry = {
            let mut state = self.state.lock();
            let slot = match state.index.get(key) {
                Some(&slot) => slot,
                None => return false,
            };
            let entry = match state.recency.get(slot).cloned() {
                Some(entry) => entry,
                None => return false,
            };
            if entry.seq() != seq {
                return false;
            }
            state.index.remove(key);
            state.recency.remove(slot);
            entry
        };
        self.release_entry(entry, seq)
    }
}

/// Concurrent, bounded, TTL-based memoization table.
///
/// Cloning a `Table` clones a handle to the same shared state, the
/// usual pattern for sharing across threads. Values are stored as
/// `Arc<V>` and handed back as such; keys are cloned into each entry.
///
/// Construction:
///
/// - [`Table::new`]: cap + default TTL, no exchanger
/// - [`Table::with_exchanger`]: cap + default TTL + exchanger
/// - [`Table::builder`]: fluent form of the above
///
/// `max_entries == 0` means unbounded; `default_ttl == Duration::ZERO`
/// means entries carry no deadline unless a per-call override says
/// otherwise.
pub struct Table<K, V> {
    shared: Arc<TableShared<K, V>>,
}

impl<K, V> Clone for Table<K, V> {
    fn clone(&self) -> Self {
        Table {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V> Table<K, V>
where
    K: Clone + Eq + Hash + Send + 'static,
    V: Send + Sync + 'static,
{
    /// Creates a table with no exchanger.
    ///
    /// ```
    /// use std::time::Duration;
    /// use memotable::Table;
    ///
    /// let table: Table<&str, i32> = Table::new(0, Duration::ZERO);
    /// table.set("answer", 42);
    /// assert_eq!(table.get(&"answer").as_deref(), Some(&42));
    /// ```
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self::with_exchanger(max_entries, default_ttl, NoopExchanger)
    }

    /// Creates a table that reports transitions to `exchanger`.
    pub fn with_exchanger<E>(max_entries: usize, default_ttl: Duration, exchanger: E) -> Self
    where
        E: Exchanger<K, V> + 'static,
    {
        Self::with_exchanger_arc(max_entries, default_ttl, Arc::new(exchanger))
    }

    pub(crate) fn with_exchanger_arc(
        max_entries: usize,
        default_ttl: Duration,
        exchanger: Arc<dyn Exchanger<K, V>>,
    ) -> Self {
        Table {
            shared: Arc::new(TableShared {
                max_entries,
                default_ttl,
                exchanger,
                seq: AtomicU64::new(0),
                pool: EntryPool::new(),
                timers: TimerQueue::new(),
                state: Mutex::new(TableState {
                    index: FxHashMap::default(),
                    recency: RecencyList::new(),
                }),
            }),
        }
    }

    /// Starts a [`TableBuilder`](crate::builder::TableBuilder).
    pub fn builder() -> crate::builder::TableBuilder<K, V> {
        crate::builder::TableBuilder::new()
    }

    /// Looks up `key`, promoting it to most-recent.
    ///
    /// Returns `None` for an absent key, and for an entry found expired
    /// or concurrently released by the time its value is read. The
    /// deadline is not re-armed; use [`fetch`](Self::fetch),
    /// [`set`](Self::set) or [`keep_alive`](Self::keep_alive) for that.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let now = Instant::now();
        // The generation is captured while the index still vouches for
        // the entry; reading after the lock drops is then safe against
        // pool reuse.
        let (entry, seq) = {
            let mut state = self.shared.state.lock();
            let &slot = state.index.get(key)?;
            let entry = state.recency.get(slot).cloned()?;
            let seq = entry.seq();
            state.recency.move_to_back(slot);
            (entry, seq)
        };
        entry.read(now, seq)
    }

    /// Returns the value under `key`, inserting `default` if absent.
    ///
    /// The boolean is `true` when an existing value was returned and
    /// `false` when `default` was inserted (reported to the exchanger as
    /// an insert). A hit re-arms the entry's deadline with the table's
    /// default TTL and promotes it to most-recent.
    ///
    /// A lookup that loses the race with a concurrent release retries
    /// from scratch; the loop terminates because the next observation of
    /// that key either misses or sees a fresh generation.
    pub fn fetch(&self, key: K, default: V) -> (Arc<V>, bool) {
        let value = Arc::new(default);
        loop {
            let now = Instant::now();
            let mut evicted = Vec::new();
            let mut state = self.shared.state.lock();
            let (entry, seq, loaded) = self.shared.load_locked(
                &mut state,
                &key,
                &value,
                self.shared.default_ttl,
                &mut evicted,
            );
            if loaded {
                drop(state);
                self.shared.finish_evictions(evicted);
                match entry.read(now, seq) {
                    Some(found) => return (found, true),
                    None => continue,
                }
            }
            let entry_state = entry.state.lock();
            drop(state);
            self.shared.announce_insert(&entry_state);
            drop(entry_state);
            self.shared.finish_evictions(evicted);
            return (value, false);
        }
    }

    /// Writes `value` under `key` with the table's default TTL.
    ///
    /// See [`set_with`](Self::set_with).
    pub fn set(&self, key: K, value: V) {
        self.set_with(key, value, SetOptions::default());
    }

    /// Writes `value` under `key`.
    ///
    /// On an absent key this inserts (exchanger sees
    /// `(value, ⊥, false)`). On a present key it re-arms the deadline,
    /// promotes the entry, and reports `(value, current, false)` to the
    /// exchanger; the stored value itself is left unchanged (see the
    /// module docs).
    ///
    /// `options.keep_alive` overrides the table's default TTL.
    pub fn set_with(&self, key: K, value: V, options: SetOptions) {
        let ttl = options.keep_alive.unwrap_or(self.shared.default_ttl);
        let value = Arc::new(value);
        let mut evicted = Vec::new();
        let mut state = self.shared.state.lock();
        let (entry, seq, loaded) =
            self.shared
                .load_locked(&mut state, &key, &value, ttl, &mut evicted);
        if loaded {
            drop(state);
            entry.update(self.shared.exchanger.as_ref(), &value, seq);
        } else {
            let entry_state = entry.state.lock();
            drop(state);
            self.shared.announce_insert(&entry_state);
            drop(entry_state);
        }
        self.shared.finish_evictions(evicted);
    }

    /// Re-arms `key`'s deadline with the table's default TTL.
    ///
    /// See [`keep_alive_with`](Self::keep_alive_with).
    pub fn keep_alive(&self, key: &K) -> bool {
        self.keep_alive_with(key, KeepAliveOptions::default())
    }

    /// Re-arms `key`'s deadline and promotes it to most-recent, without
    /// touching the value or notifying the exchanger.
    ///
    /// Returns `true` on success, `false` when the key is absent or the
    /// entry was concurrently released. `options.duration` overrides the
    /// table's default TTL; a zero duration clears the deadline.
    pub fn keep_alive_with(&self, key: &K, options: KeepAliveOptions) -> bool {
        let ttl = options.duration.unwrap_or(self.shared.default_ttl);
        let (entry, seq) = {
            let mut state = self.shared.state.lock();
            let slot = match state.index.get(key) {
                Some(&slot) => slot,
                None => return false,
            };
            let entry = match state.recency.get(slot).cloned() {
                Some(entry) => entry,
                None => return false,
            };
            let seq = entry.seq();
            state.recency.move_to_back(slot);
            (entry, seq)
        };
        Entry::keep_alive(&entry, ttl, seq, &self.shared.timers)
    }

    /// Removes `key`, cancelling its timer and reporting the release to
    /// the exchanger.
    ///
    /// Returns `true` iff this call removed a live entry; a concurrent
    /// delete, eviction or expiry that got there first makes this a
    /// no-op returning `false`.
    pub fn delete(&self, key: &K) -> bool {
        let entry = {
            let mut state = self.shared.state.lock();
            let slot = match state.index.remove(key) {
                Some(slot) => slot,
                None => return false,
            };
            match state.recency.remove(slot) {
                Some(entry) => entry,
                None => return false,
            }
        };
        let seq = entry.seq();
        self.shared.release_entry(entry, seq)
    }

    /// Snapshot of the keys whose entries are unexpired at the time of
    /// the call. Order is unspecified.
    pub fn keys(&self) -> Vec<K> {
        let now = Instant::now();
        let state = self.shared.state.lock();
        let mut keys = Vec::with_capacity(state.index.len());
        for (key, &slot) in &state.index {
            if let Some(entry) = state.recency.get(slot) {
                if !entry.is_expired(now) {
                    keys.push(key.clone());
                }
            }
        }
        keys
    }

    /// Releases every entry (each reported to the exchanger with
    /// `released = true`), cancels every timer, and resets both indexes.
    pub fn clear(&self) {
        let drained = {
            let mut state = self.shared.state.lock();
            state.index.clear();
            state.recency.drain()
        };
        for entry in drained {
            let seq = entry.seq();
            self.shared.release_entry(entry, seq);
        }
    }

    /// Number of entries currently indexed, expired-but-uncollected ones
    /// included.
    pub fn len(&self) -> usize {
        self.shared.state.lock().recency.len()
    }

    /// Returns `true` if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The LRU cap this table was built with; `0` means unbounded.
    pub fn max_entries(&self) -> usize {
        self.shared.max_entries
    }

    /// The default keep-alive duration; `Duration::ZERO` means entries
    /// carry no deadline unless overridden per call.
    pub fn default_ttl(&self) -> Duration {
        self.shared.default_ttl
    }

    /// Audits the table's structural invariants: the key index and the
    /// recency list agree one-to-one, no reachable entry is closed, and
    /// the size respects the cap. Intended for tests and debugging; the
    /// table lock is held for the duration.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        let state = self.shared.state.lock();
        state.recency.validate()?;
        if state.index.len() != state.recency.len() {
            return Err(InvariantError::new(
                "key index and recency list disagree on size",
            ));
        }
        for (key, &slot) in &state.index {
            let entry = state
                .recency
                .get(slot)
                .ok_or_else(|| InvariantError::new("key index references a freed slot"))?;
            let entry_state = entry.state.lock();
            if entry_state.closed {
                return Err(InvariantError::new("closed entry reachable from key index"));
            }
            if entry_state.key.as_ref() != Some(key) {
                return Err(InvariantError::new("entry key disagrees with its index key"));
            }
        }
        if self.shared.max_entries != 0 && state.recency.len() > self.shared.max_entries {
            return Err(InvariantError::new("table size exceeds max_entries"));
        }
        Ok(())
    }
}

impl<K, V> fmt::Debug for Table<K, V>
where
    K: Clone + Eq + Hash + Send + 'static,
    V: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("len", &self.len())
            .field("max_entries", &self.shared.max_entries)
            .field("default_ttl", &self.shared.default_ttl)
            .finish_non_exhaustive()
    }
}
