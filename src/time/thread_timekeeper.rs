//! Wall-clock timekeeper backed by a worker thread.

use super::Timekeeper;
use crate::future::{make_semi_future, SemiFuture};
use crate::promise::Promise;
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// A timekeeper that sleeps on a worker thread and fires due promises.
///
/// Deadlines live in a binary heap ordered by expiry. The worker parks until
/// the nearest deadline (or a new registration) and fulfils due promises off
/// the lock, so timer continuations never run under it.
///
/// Continuations on a timer future that was never re-bound run on the
/// timekeeper thread; chain through `via` to move them elsewhere.
pub struct ThreadTimekeeper {
    inner: Arc<TimerInner>,
}

struct TimerInner {
    state: Mutex<TimerState>,
    cv: Condvar,
    shutdown: AtomicBool,
}

struct TimerState {
    heap: BinaryHeap<TimerEntry>,
    next_id: u64,
}

struct TimerEntry {
    deadline: Instant,
    id: u64,
    promise: Promise<()>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap yields the nearest deadline first.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl ThreadTimekeeper {
    /// Spawns the worker thread.
    ///
    /// # Errors
    ///
    /// Returns the underlying spawn error when the OS refuses a thread.
    pub fn start() -> std::io::Result<Arc<Self>> {
        let inner = Arc::new(TimerInner {
            state: Mutex::new(TimerState {
                heap: BinaryHeap::new(),
                next_id: 0,
            }),
            cv: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });
        let worker = Arc::clone(&inner);
        thread::Builder::new()
            .name("promissory-timekeeper".into())
            .spawn(move || worker.run())?;
        Ok(Arc::new(Self { inner }))
    }
}

impl TimerInner {
    fn run(&self) {
        loop {
            let due: Option<Promise<()>> = {
                let mut st = self.state.lock();
                loop {
                    if self.shutdown.load(AtomicOrdering::Acquire) {
                        return;
                    }
                    let now = Instant::now();
                    match st.heap.peek() {
                        None => {
                            self.cv.wait(&mut st);
                        }
                        Some(entry) if entry.deadline <= now => {
                            break st.heap.pop().map(|e| e.promise);
                        }
                        Some(entry) => {
                            let deadline = entry.deadline;
                            self.cv.wait_until(&mut st, deadline);
                        }
                    }
                }
            };
            // Fulfil off the lock: the dispatch may run user continuations.
            if let Some(mut promise) = due {
                tracing::trace!("timer fired");
                let _ = promise.set_value(());
            }
        }
    }
}

impl Timekeeper for ThreadTimekeeper {
    fn after(&self, dur: Duration) -> SemiFuture<()> {
        if dur.is_zero() {
            return make_semi_future(());
        }
        let (promise, semi) = Promise::pair();
        {
            let mut st = self.inner.state.lock();
            let id = st.next_id;
            st.next_id += 1;
            st.heap.push(TimerEntry {
                deadline: Instant::now() + dur,
                id,
                promise,
            });
        }
        self.inner.cv.notify_one();
        semi
    }
}

impl Drop for ThreadTimekeeper {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, AtomicOrdering::Release);
        self.inner.cv.notify_all();
        // Entries still queued are dropped with the inner state; their
        // promises deliver BrokenPromise to any waiter.
    }
}

impl std::fmt::Debug for ThreadTimekeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadTimekeeper")
            .field("pending", &self.inner.state.lock().heap.len())
            .finish()
    }
}
