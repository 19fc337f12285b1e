//! Deadline-driven callback scheduler.
//!
//! A [`TimerQueue`] owns a min-heap of scheduled callbacks and one worker
//! thread that sleeps until the earliest deadline, pops due entries, and
//! runs them. Arming returns a [`TimerHandle`] whose `cancel` flips an
//! atomic flag: a callback that has not started yet is skipped, while one
//! that already left the heap runs to completion. Callers that need
//! stronger guarantees carry their own generation check inside the
//! callback (the table's entries do).
//!
//! ```text
//!   arm(delay, job) ──► heap: [(t₁, job₁), (t₂, job₂), ...] ──► worker
//!                                                                 │
//!                         wait_until(t₁) ◄── Condvar ◄────────────┘
//!                         pop due, drop lock, run job
//! ```
//!
//! The worker is spawned lazily on the first `arm`, so a queue that never
//! schedules anything costs no thread. Dropping the queue clears pending
//! entries and joins the worker.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

/// Callback scheduled by [`TimerQueue::arm`].
pub(crate) type TimerJob = Box<dyn FnOnce() + Send>;

/// Cancellation handle for one armed callback.
///
/// Cancellation is best-effort: it only touches an atomic flag, so it is
/// safe to call under any lock, and a callback that already started is
/// not interrupted.
#[derive(Debug)]
pub(crate) struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    /// Marks the callback as cancelled. A callback that has not yet been
    /// popped from the heap will be skipped.
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::Release);
    }
}

struct Scheduled {
    at: Instant,
    id: u64,
    cancelled: Arc<AtomicBool>,
    job: TimerJob,
}

impl Scheduled {
    fn run(self) {
        if !self.cancelled.load(AtomicOrdering::Acquire) {
            (self.job)();
        }
    }
}

// BinaryHeap is a max-heap; order by reversed deadline (ties broken by
// arming order) so the earliest deadline surfaces first.
impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.id == other.id
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

struct TimerState {
    heap: BinaryHeap<Scheduled>,
    next_id: u64,
    shutdown: bool,
    worker: Option<JoinHandle<()>>,
}

struct TimerInner {
    state: Mutex<TimerState>,
    wakeup: Condvar,
}

/// Min-heap timer driven by one worker thread.
pub(crate) struct TimerQueue {
    inner: Arc<TimerInner>,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        TimerQueue {
            inner: Arc::new(TimerInner {
                state: Mutex::new(TimerState {
                    heap: BinaryHeap::new(),
                    next_id: 0,
                    shutdown: false,
                    worker: None,
                }),
                wakeup: Condvar::new(),
            }),
        }
    }

    /// Schedules `job` to run `delay` from now on the worker thread.
    pub(crate) fn arm(&self, delay: Duration, job: TimerJob) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        {
            let mut state = self.inner.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.heap.push(Scheduled {
                at: Instant::now() + delay,
                id,
                cancelled: Arc::clone(&cancelled),
                job,
            });
            if state.worker.is_none() && !state.shutdown {
                let inner = Arc::clone(&self.inner);
                state.worker = Some(
                    std::thread::Builder::new()
                        .name("memotable-timer".into())
                        .spawn(move || worker_loop(inner))
                        .expect("failed to spawn timer worker thread"),
                );
            }
        }
        self.inner.wakeup.notify_one();
        TimerHandle { cancelled }
    }

    /// Number of heap entries, cancelled ones included. Test hook.
    #[cfg(test)]
    fn pending(&self) -> usize {
        self.inner.state.lock().heap.len()
    }
}

impl Drop for TimerQueue {
    fn drop(&mut self) {
        let worker = {
            let mut state = self.inner.state.lock();
            state.shutdown = true;
            state.heap.clear();
            state.worker.take()
        };
        self.inner.wakeup.notify_all();
        if let Some(worker) = worker {
            // The queue can be dropped from inside a callback when the
            // callback held the last reference to the owner; the worker
            // then exits on the shutdown flag rather than being joined
            // by itself.
            if worker.thread().id() != std::thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

fn worker_loop(inner: Arc<TimerInner>) {
    let mut state = inner.state.lock();
    loop {
        if state.shutdown {
            return;
        }
        match state.heap.peek().map(|scheduled| scheduled.at) {
            None => {
                inner.wakeup.wait(&mut state);
            },
            Some(at) if at <= Instant::now() => {
                if let Some(due) = state.heap.pop() {
                    // The heap lock is never held while user code runs.
                    MutexGuard::unlocked(&mut state, || due.run());
                }
            },
            Some(at) => {
                inner.wakeup.wait_until(&mut state, at);
            },
        }
    }
}
