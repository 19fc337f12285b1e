//! Slot-backed doubly linked recency list.
//!
//! Nodes live in a `Vec` arena and are linked by `SlotId`, giving stable
//! handles and O(1) splice operations without raw pointers. The list is
//! ordered by recency: oldest at the head, newest at the tail.
//!
//! ```text
//!   slots (Vec<Slot<T>>)
//!   ┌────────┬─────────────────────────────────────────────┐
//!   │ SlotId │ Slot { value, prev, next }                  │
//!   ├────────┼─────────────────────────────────────────────┤
//!   │   0    │ { value: A, prev: None, next: Some(1) }     │
//!   │   1    │ { value: B, prev: Some(0), next: Some(2) }  │
//!   │   2    │ { value: C, prev: Some(1), next: None }     │
//!   └────────┴─────────────────────────────────────────────┘
//!
//!   head ─► [0] ◄──► [1] ◄──► [2] ◄── tail
//!         oldest              newest
//! ```
//!
//! Removed slots are pushed onto a free list and reused by later inserts,
//! so a steady-state workload allocates nothing per operation.
//!
//! ## Operations
//! - `push_back(value)`: append at the tail (most recent), O(1)
//! - `move_to_back(id)`: re-rank an existing node as most recent, O(1)
//! - `remove(id)`: unlink and free a node, O(1)
//! - `pop_front()`: unlink the oldest node, O(1)
//! - `drain()`: empty the list, yielding values oldest-first
//!
//! `validate` is available for invariant audits in tests and debug builds.

use crate::error::InvariantError;

/// Stable handle to a node in a [`RecencyList`].
///
/// A `SlotId` is only meaningful for the list that issued it, and only
/// until the node is removed. The owner is expected to drop its handles
/// together with the node (the table keeps the key index and the list in
/// lockstep under one lock).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

#[derive(Debug)]
struct Slot<T> {
    value: Option<T>,
    prev: Option<SlotId>,
    next: Option<SlotId>,
}

/// Doubly linked list ranking values from least recently used (head) to
/// most recently used (tail).
#[derive(Debug)]
pub struct RecencyList<T> {
    slots: Vec<Slot<T>>,
    free: Vec<SlotId>,
    head: Option<SlotId>,
    tail: Option<SlotId>,
    len: usize,
}

impl<T> RecencyList<T> {
    /// Creates an empty list.
    pub fn new() -> Self {
        RecencyList {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Creates an empty list with reserved slot capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        RecencyList {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Returns the number of live nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the list holds no nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns a reference to the value stored at `id`, if the slot is live.
    #[inline]
    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.slots.get(id.0).and_then(|slot| slot.value.as_ref())
    }

    /// Returns the handle of the oldest node, if any.
    #[inline]
    pub fn front(&self) -> Option<SlotId> {
        self.head
    }

    /// Appends `value` at the tail (most recent position) and returns its
    /// handle.
    pub fn push_back(&mut self, value: T) -> SlotId {
        let id = match self.free.pop() {
            Some(id) => {
                self.slots[id.0] = Slot {
                    value: Some(value),
                    prev: self.tail,
                    next: None,
                };
                id
            },
            None => {
                let id = SlotId(self.slots.len());
                self.slots.push(Slot {
                    value: Some(value),
                    prev: self.tail,
                    next: None,
                });
                id
            },
        };

        match self.tail {
            Some(tail) => self.slots[tail.0].next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
        id
    }

    /// Unlinks the node at `id` and returns its value.
    ///
    /// Returns `None` if the slot is not live (already removed or never
    /// issued by this list).
    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        let value = self.slots.get_mut(id.0)?.value.take()?;
        self.detach(id);
        self.free.push(id);
        self.len -= 1;
        Some(value)
    }

    /// Unlinks and returns the oldest node's value.
    pub fn pop_front(&mut self) -> Option<T> {
        let head = self.head?;
        self.remove(head)
    }

    /// Re-ranks the node at `id` as the most recent. No-op if the slot is
    /// not live or already at the tail.
    pub fn move_to_back(&mut self, id: SlotId) {
        if self.tail == Some(id) {
            return;
        }
        let live = self
            .slots
            .get(id.0)
            .map(|slot| slot.value.is_some())
            .unwrap_or(false);
        if !live {
            return;
        }

        self.detach(id);
        self.slots[id.0].prev = self.tail;
        self.slots[id.0].next = None;
        match self.tail {
            Some(tail) => self.slots[tail.0].next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
    }

    /// Empties the list, returning every value oldest-first. Slot storage
    /// is reset so previously issued handles become dead.
    pub fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len);
        let mut current = self.head;
        while let Some(id) = current {
            let slot = &mut self.slots[id.0];
            current = slot.next;
            if let Some(value) = slot.value.take() {
                out.push(value);
            }
        }
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
        out
    }

    /// Iterates over values oldest-first.
    pub fn iter(&self) -> RecencyIter<'_, T> {
        RecencyIter {
            list: self,
            current: self.head,
        }
    }

    /// Unlink `id` from its neighbors without freeing the slot.
    fn detach(&mut self, id: SlotId) {
        let (prev, next) = {
            let slot = &self.slots[id.0];
            (slot.prev, slot.next)
        };

        match prev {
            Some(p) => self.slots[p.0].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n.0].prev = prev,
            None => self.tail = prev,
        }
    }

    /// Checks structural invariants: forward/backward link agreement,
    /// `len` accuracy, and free-list disjointness from the live chain.
    pub fn validate(&self) -> Result<(), InvariantError> {
        let mut count = 0usize;
        let mut prev: Option<SlotId> = None;
        let mut current = self.head;
        while let Some(id) = current {
            let slot = self
                .slots
                .get(id.0)
                .ok_or_else(|| InvariantError::new("recency list links to an out-of-range slot"))?;
            if slot.value.is_none() {
                return Err(InvariantError::new("recency list links to a freed slot"));
            }
            if slot.prev != prev {
                return Err(InvariantError::new("recency list back-link disagrees"));
            }
            count += 1;
            if count > self.len {
                return Err(InvariantError::new("cycle detected in recency list"));
            }
            prev = current;
            current = slot.next;
        }
        if prev != self.tail {
            return Err(InvariantError::new("recency list tail disagrees"));
        }
        if count != self.len {
            return Err(InvariantError::new("recency list length disagrees"));
        }
        for id in &self.free {
            let freed = self.slots.get(id.0).map(|slot| slot.value.is_none());
            if freed != Some(true) {
                return Err(InvariantError::new("free list references a live slot"));
            }
        }
        Ok(())
    }
}

impl<T> Default for RecencyList<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Oldest-first iterator over a [`RecencyList`].
pub struct RecencyIter<'a, T> {
    list: &'a RecencyList<T>,
    current: Option<SlotId>,
}

impl<'a, T> Iterator for RecencyIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let id = self.current?;
        let slot = self.list.slots.get(id.0)?;
        self.current = slot.next;
        slot.value.as_ref()
    }
}
