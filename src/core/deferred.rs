//! One-shot placeholder executor for cold continuation chains.
//!
//! A [`DeferredExecutor`] stands in for the executor a `SemiFuture` does not
//! have yet. It resolves a three-way race among the continuation arriving
//! (the core dispatched), a real executor arriving (`via`), and a blocking
//! waiter arriving (`wait`). The race is decided by CAS over a five-valued
//! state word; the stored function runs at most once and never inside a CAS
//! loop.
//!
//! ```text
//! EMPTY ─ add ──────────► HAS_FUNCTION ─ run_and_destroy / detach ─► (done)
//! EMPTY ─ set_executor ─► HAS_EXECUTOR ─ add ───► HAS_FUNCTION (enqueued)
//! EMPTY ─ wait ─────────► HAS_BATON ──── add ───► HAS_FUNCTION (baton posted)
//! EMPTY ─ detach ───────► DETACHED ───── add ───► function dropped
//! HAS_BATON ─ wait_for timeout ─► EMPTY
//! ```

use crate::executor::{Executor, Task};
use crate::sync::Baton;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const EMPTY: u8 = 0;
const HAS_FUNCTION: u8 = 1;
const HAS_EXECUTOR: u8 = 2;
const HAS_BATON: u8 = 3;
const DETACHED: u8 = 4;

/// Stores one unit of work until a real executor or a waiter arrives.
///
/// Owned through `Arc`: the consumer handle and the enqueued run closure each
/// hold a clone, and terminal transitions release the stored state so the
/// last clone frees the allocation.
pub(crate) struct DeferredExecutor {
    state: AtomicU8,
    func: Mutex<Option<Task>>,
    executor: Mutex<Option<(Arc<dyn Executor>, i8)>>,
    baton: Mutex<Option<Arc<Baton>>>,
}

impl DeferredExecutor {
    /// Creates a placeholder in the EMPTY state.
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(EMPTY),
            func: Mutex::new(None),
            executor: Mutex::new(None),
            baton: Mutex::new(None),
        })
    }

    /// Hands the dispatched continuation to the placeholder.
    ///
    /// Called by the core when it dispatches onto a deferred binding.
    pub(crate) fn add(self: &Arc<Self>, task: Task) {
        let mut state = self.state.load(Ordering::Acquire);
        if state == HAS_FUNCTION {
            // We are inside run_and_destroy: a chained core on the same
            // placeholder is dispatching. Run inline, in order.
            task();
            return;
        }

        *self.func.lock() = Some(task);
        loop {
            match state {
                HAS_EXECUTOR => {
                    self.state.store(HAS_FUNCTION, Ordering::Release);
                    let stored = self.executor.lock().clone();
                    let Some((executor, priority)) = stored else {
                        debug_assert!(false, "HAS_EXECUTOR without a stored executor");
                        return;
                    };
                    tracing::trace!("deferred function enqueued on attached executor");
                    let this = Arc::clone(self);
                    executor
                        .add_with_priority(Box::new(move || this.run_and_destroy()), priority);
                    return;
                }
                DETACHED => {
                    // The owning SemiFuture is gone; the work is dropped.
                    tracing::trace!("deferred function dropped: placeholder detached");
                    *self.func.lock() = None;
                    return;
                }
                EMPTY | HAS_BATON => {
                    let baton = if state == HAS_BATON {
                        self.baton.lock().clone()
                    } else {
                        None
                    };
                    match self.state.compare_exchange_weak(
                        state,
                        HAS_FUNCTION,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            if let Some(baton) = baton {
                                baton.post();
                            }
                            return;
                        }
                        Err(actual) => state = actual,
                    }
                }
                _ => {
                    debug_assert!(false, "deferred add from impossible state {state}");
                    return;
                }
            }
        }
    }

    /// Attaches a real executor; the stored function (now or later) is
    /// enqueued on it exactly once.
    pub(crate) fn set_executor(self: &Arc<Self>, executor: Arc<dyn Executor>, priority: i8) {
        *self.executor.lock() = Some((Arc::clone(&executor), priority));
        let mut state = self.state.load(Ordering::Acquire);
        loop {
            match state {
                HAS_FUNCTION => {
                    let this = Arc::clone(self);
                    executor
                        .add_with_priority(Box::new(move || this.run_and_destroy()), priority);
                    return;
                }
                EMPTY => match self.state.compare_exchange_weak(
                    EMPTY,
                    HAS_EXECUTOR,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return,
                    Err(actual) => state = actual,
                },
                _ => {
                    debug_assert!(false, "executor attached from impossible state {state}");
                    return;
                }
            }
        }
    }

    /// Runs the stored function and releases it.
    pub(crate) fn run_and_destroy(&self) {
        debug_assert_eq!(self.state.load(Ordering::Relaxed), HAS_FUNCTION);
        let func = self.func.lock().take();
        if let Some(func) = func {
            func();
        }
    }

    /// Detaches the owning handle, dropping any stored function.
    pub(crate) fn detach(&self) {
        let mut state = self.state.load(Ordering::Acquire);
        loop {
            match state {
                HAS_FUNCTION => {
                    *self.func.lock() = None;
                    return;
                }
                EMPTY => match self.state.compare_exchange_weak(
                    EMPTY,
                    DETACHED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return,
                    Err(actual) => state = actual,
                },
                _ => return,
            }
        }
    }

    /// Blocks until the continuation arrives.
    ///
    /// On return the state is HAS_FUNCTION; the caller is expected to invoke
    /// [`run_and_destroy`](Self::run_and_destroy) on its own thread.
    pub(crate) fn wait(&self) {
        let baton = Arc::new(Baton::new());
        *self.baton.lock() = Some(Arc::clone(&baton));
        let mut state = self.state.load(Ordering::Acquire);
        loop {
            match state {
                HAS_FUNCTION => return,
                EMPTY => match self.state.compare_exchange_weak(
                    EMPTY,
                    HAS_BATON,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => break,
                    Err(actual) => state = actual,
                },
                _ => {
                    debug_assert!(false, "wait from impossible state {state}");
                    return;
                }
            }
        }
        baton.wait();
        debug_assert_eq!(self.state.load(Ordering::Relaxed), HAS_FUNCTION);
    }

    /// Blocks until the continuation arrives or `dur` elapses.
    ///
    /// A timed-out wait reverts HAS_BATON back to EMPTY so a later `via` or
    /// `wait` starts clean. Returns true if the function arrived.
    pub(crate) fn wait_for(&self, dur: std::time::Duration) -> bool {
        let baton = Arc::new(Baton::new());
        *self.baton.lock() = Some(Arc::clone(&baton));
        let mut state = self.state.load(Ordering::Acquire);
        loop {
            match state {
                HAS_FUNCTION => return true,
                EMPTY => match self.state.compare_exchange_weak(
                    EMPTY,
                    HAS_BATON,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => break,
                    Err(actual) => state = actual,
                },
                _ => {
                    debug_assert!(false, "timed wait from impossible state {state}");
                    return false;
                }
            }
        }

        if baton.wait_for(dur) {
            debug_assert_eq!(self.state.load(Ordering::Relaxed), HAS_FUNCTION);
            return true;
        }

        // Timed out; revert unless the function arrived in the window.
        let mut state = self.state.load(Ordering::Acquire);
        loop {
            match state {
                HAS_FUNCTION => return true,
                HAS_BATON => match self.state.compare_exchange_weak(
                    HAS_BATON,
                    EMPTY,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return false,
                    Err(actual) => state = actual,
                },
                _ => {
                    debug_assert!(false, "timed-out wait observed state {state}");
                    return false;
                }
            }
        }
    }
}

impl std::fmt::Debug for DeferredExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state.load(Ordering::Relaxed) {
            EMPTY => "EMPTY",
            HAS_FUNCTION => "HAS_FUNCTION",
            HAS_EXECUTOR => "HAS_EXECUTOR",
            HAS_BATON => "HAS_BATON",
            DETACHED => "DETACHED",
            _ => "?",
        };
        f.debug_struct("DeferredExecutor").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ManualExecutor;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counting_task(count: &Arc<AtomicUsize>) -> Task {
        let count = Arc::clone(count);
        Box::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn executor_first_then_function_enqueues() {
        let deferred = DeferredExecutor::new();
        let exec = Arc::new(ManualExecutor::new());
        let count = Arc::new(AtomicUsize::new(0));

        deferred.set_executor(Arc::clone(&exec) as Arc<dyn Executor>, 0);
        deferred.add(counting_task(&count));

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(exec.run(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn function_first_then_executor_enqueues() {
        let deferred = DeferredExecutor::new();
        let exec = Arc::new(ManualExecutor::new());
        let count = Arc::new(AtomicUsize::new(0));

        deferred.add(counting_task(&count));
        deferred.set_executor(Arc::clone(&exec) as Arc<dyn Executor>, 0);

        assert_eq!(exec.run(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn waiter_is_posted_and_runs_the_function() {
        let deferred = DeferredExecutor::new();
        let count = Arc::new(AtomicUsize::new(0));

        let adder = Arc::clone(&deferred);
        let c = Arc::clone(&count);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            adder.add(counting_task(&c));
        });

        deferred.wait();
        deferred.run_and_destroy();
        handle.join().expect("adder panicked");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn timed_out_wait_reverts_to_empty() {
        let deferred = DeferredExecutor::new();
        assert!(!deferred.wait_for(Duration::from_millis(10)));

        // The placeholder is reusable after the revert.
        let count = Arc::new(AtomicUsize::new(0));
        deferred.add(counting_task(&count));
        assert!(deferred.wait_for(Duration::from_millis(10)));
        deferred.run_and_destroy();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn detached_placeholder_drops_the_function() {
        let deferred = DeferredExecutor::new();
        deferred.detach();

        let count = Arc::new(AtomicUsize::new(0));
        deferred.add(counting_task(&count));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn nested_add_during_run_executes_inline() {
        let deferred = DeferredExecutor::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let inner = Arc::clone(&deferred);
        let o = Arc::clone(&order);
        deferred.add(Box::new(move || {
            o.lock().push(1);
            let o2 = Arc::clone(&o);
            inner.add(Box::new(move || o2.lock().push(2)));
            o.lock().push(3);
        }));

        deferred.wait_for(Duration::ZERO);
        deferred.run_and_destroy();
        assert_eq!(*order.lock(), vec![1, 2, 3]);
    }
}
