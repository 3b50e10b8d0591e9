//! Shared state machine between a producer and a consumer.
//!
//! A [`Core`] is mutated independently by two sides: the producer sets the
//! result, the consumer installs the continuation. One atomic state word
//! records which of the two is present; whichever writer completes the pair
//! wins the `DONE` transition and becomes responsible for dispatch. The
//! result and callback slots are written before the state transition that
//! publishes them, so the dispatching thread always observes both fully
//! constructed.
//!
//! Interrupts flow the other way (consumer to producer) on a separate
//! channel: a handler installed by the producer, and a pending slot for an
//! interrupt raised before the handler exists.
//!
//! # State transitions
//!
//! ```text
//! EMPTY ──set_result──► RESULT_ONLY ──set_callback──► DONE (consumer dispatches)
//! EMPTY ──set_callback► CALLBACK_ONLY ──set_result──► DONE (producer dispatches)
//! ```

mod deferred;

pub(crate) use deferred::DeferredExecutor;

use crate::error::Error;
use crate::executor::Executor;
use crate::try_value::Try;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Continuation stored in a core. Invoked exactly once with the result.
type Callback<T> = Box<dyn FnOnce(Try<T>) + Send + 'static>;

/// Interrupt handler installed by the producer side.
///
/// Shared (`Arc<dyn Fn>`) so `then` chains can propagate the upstream handler
/// into every downstream core.
pub(crate) type InterruptHandler = Arc<dyn Fn(Error) + Send + Sync + 'static>;

const EMPTY: u8 = 0;
const RESULT_ONLY: u8 = 1;
const CALLBACK_ONLY: u8 = 2;
const DONE: u8 = 3;

/// Where a core dispatches its continuation.
#[derive(Clone)]
pub(crate) enum ExecutorBinding {
    /// No executor: the continuation runs inline on the dispatching thread.
    None,
    /// A real executor with a scheduling priority.
    Bound {
        executor: Arc<dyn Executor>,
        priority: i8,
    },
    /// A deferred-executor placeholder awaiting a real executor or a waiter.
    Deferred(Arc<DeferredExecutor>),
}

impl ExecutorBinding {
    /// Returns the bound real executor, if any.
    pub(crate) fn bound(&self) -> Option<(Arc<dyn Executor>, i8)> {
        match self {
            Self::Bound { executor, priority } => Some((Arc::clone(executor), *priority)),
            _ => None,
        }
    }
}

impl std::fmt::Debug for ExecutorBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bound { priority, .. } => f.debug_struct("Bound").field("priority", priority).finish(),
            Self::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

/// Producer/consumer interrupt channel.
#[derive(Default)]
struct InterruptState {
    handler: Option<InterruptHandler>,
    pending: Option<Error>,
    raised: bool,
}

/// The shared state between a promise and a future.
///
/// Both sides hold an `Arc`; the core is freed when the last side (or the
/// last in-flight dispatch closure) lets go.
pub(crate) struct Core<T> {
    state: AtomicU8,
    result: Mutex<Option<Try<T>>>,
    callback: Mutex<Option<Callback<T>>>,
    executor: Mutex<ExecutorBinding>,
    interrupt: Mutex<InterruptState>,
}

impl<T: Send + 'static> Core<T> {
    /// Creates an unfulfilled core with no continuation and no executor.
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(EMPTY),
            result: Mutex::new(None),
            callback: Mutex::new(None),
            executor: Mutex::new(ExecutorBinding::None),
            interrupt: Mutex::new(InterruptState::default()),
        })
    }

    /// Creates a core that is fulfilled at birth.
    pub(crate) fn make(result: Try<T>) -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(RESULT_ONLY),
            result: Mutex::new(Some(result)),
            callback: Mutex::new(None),
            executor: Mutex::new(ExecutorBinding::None),
            interrupt: Mutex::new(InterruptState::default()),
        })
    }

    /// Returns true if the producer has fulfilled this core.
    pub(crate) fn has_result(&self) -> bool {
        matches!(self.state.load(Ordering::Acquire), RESULT_ONLY | DONE)
    }

    /// Peeks at the result: `Some(true)` value, `Some(false)` error, `None`
    /// if unfulfilled or already drained.
    pub(crate) fn peek_value(&self) -> Option<bool> {
        self.result.lock().as_ref().map(Try::has_value)
    }

    /// Moves the result out of the core, if present.
    pub(crate) fn take_result(&self) -> Option<Try<T>> {
        self.result.lock().take()
    }

    /// Stores the producer's result. Returns false if a result was already
    /// set; the earlier result is untouched.
    pub(crate) fn try_set_result(&self, result: Try<T>) -> bool {
        // Single producer: the state can only move EMPTY -> CALLBACK_ONLY
        // underneath us, never gain a result.
        let observed = self.state.load(Ordering::Acquire);
        if observed == RESULT_ONLY || observed == DONE {
            return false;
        }
        *self.result.lock() = Some(result);
        if self
            .state
            .compare_exchange(EMPTY, RESULT_ONLY, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return true;
        }
        // The consumer won the first slot; we complete the pair and own
        // dispatch.
        let won = self
            .state
            .compare_exchange(CALLBACK_ONLY, DONE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        debug_assert!(won, "producer lost a transition it cannot race");
        self.dispatch();
        true
    }

    /// Installs the continuation. The continuation is invoked exactly once,
    /// on the executor bound at dispatch time.
    pub(crate) fn set_callback(&self, callback: impl FnOnce(Try<T>) + Send + 'static) {
        {
            let mut slot = self.callback.lock();
            debug_assert!(slot.is_none(), "continuation installed twice");
            *slot = Some(Box::new(callback));
        }
        if self
            .state
            .compare_exchange(EMPTY, CALLBACK_ONLY, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return;
        }
        let won = self
            .state
            .compare_exchange(RESULT_ONLY, DONE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        debug_assert!(won, "consumer lost a transition it cannot race");
        self.dispatch();
    }

    /// Runs after the DONE transition, on the thread that won it.
    fn dispatch(&self) {
        let callback = self.callback.lock().take();
        let result = self.result.lock().take();
        let (Some(callback), Some(result)) = (callback, result) else {
            debug_assert!(false, "dispatch without both slots populated");
            return;
        };
        let binding = self.executor.lock().clone();
        match binding {
            ExecutorBinding::None => {
                tracing::trace!("dispatching continuation inline");
                callback(result);
            }
            ExecutorBinding::Bound { executor, priority } => {
                tracing::trace!(priority, "dispatching continuation to executor");
                executor.add_with_priority(Box::new(move || callback(result)), priority);
            }
            ExecutorBinding::Deferred(placeholder) => {
                tracing::trace!("handing continuation to deferred placeholder");
                placeholder.add(Box::new(move || callback(result)));
            }
        }
    }

    /// Returns the current executor binding.
    pub(crate) fn executor_binding(&self) -> ExecutorBinding {
        self.executor.lock().clone()
    }

    /// Replaces the executor binding.
    pub(crate) fn set_executor(&self, binding: ExecutorBinding) {
        *self.executor.lock() = binding;
    }

    /// Raises an interrupt towards the producer. Only the first raise is
    /// delivered; a raise after fulfilment is ignored.
    pub(crate) fn raise(&self, error: Error) {
        let mut st = self.interrupt.lock();
        if st.raised || self.has_result() {
            return;
        }
        st.raised = true;
        if let Some(handler) = st.handler.clone() {
            drop(st);
            handler(error);
        } else {
            st.pending = Some(error);
        }
    }

    /// Installs the producer's interrupt handler, delivering any interrupt
    /// raised before installation.
    pub(crate) fn set_interrupt_handler(&self, handler: InterruptHandler) {
        let pending = {
            let mut st = self.interrupt.lock();
            st.handler = Some(Arc::clone(&handler));
            st.pending.take()
        };
        if let Some(error) = pending {
            handler(error);
        }
    }

    /// Returns the installed interrupt handler, if any.
    pub(crate) fn interrupt_handler(&self) -> Option<InterruptHandler> {
        self.interrupt.lock().handler.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::executor::ManualExecutor;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn result_then_callback_dispatches_once() {
        let core: Arc<Core<i32>> = Core::new();
        let calls = Arc::new(AtomicUsize::new(0));
        assert!(core.try_set_result(Try::value(7)));

        let c = Arc::clone(&calls);
        core.set_callback(move |t| {
            assert_eq!(t.unwrap(), 7);
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_then_result_dispatches_once() {
        let core: Arc<Core<i32>> = Core::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&calls);
        core.set_callback(move |t| {
            assert_eq!(t.unwrap(), 9);
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(core.try_set_result(Try::value(9)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn second_result_is_rejected() {
        let core: Arc<Core<i32>> = Core::new();
        assert!(core.try_set_result(Try::value(1)));
        assert!(!core.try_set_result(Try::value(2)));
        assert_eq!(core.take_result().map(Try::unwrap), Some(1));
    }

    #[test]
    fn bound_executor_receives_the_dispatch() {
        let core: Arc<Core<i32>> = Core::new();
        let exec = Arc::new(ManualExecutor::new());
        core.set_executor(ExecutorBinding::Bound {
            executor: Arc::clone(&exec) as Arc<dyn Executor>,
            priority: 0,
        });

        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        core.set_callback(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(core.try_set_result(Try::value(3)));

        // Dispatch is parked on the executor until driven.
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(exec.run(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn interrupt_before_handler_is_remembered() {
        let core: Arc<Core<i32>> = Core::new();
        core.raise(Error::new(ErrorKind::Timeout));

        let seen = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&seen);
        core.set_interrupt_handler(Arc::new(move |e| {
            assert!(e.is_timeout());
            s.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn only_first_interrupt_is_delivered() {
        let core: Arc<Core<i32>> = Core::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&seen);
        core.set_interrupt_handler(Arc::new(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        }));
        core.raise(Error::new(ErrorKind::Timeout));
        core.raise(Error::new(ErrorKind::User));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn raise_after_fulfilment_is_ignored() {
        let core: Arc<Core<i32>> = Core::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&seen);
        core.set_interrupt_handler(Arc::new(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(core.try_set_result(Try::value(1)));
        core.raise(Error::new(ErrorKind::Timeout));
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn racing_producer_and_consumer_dispatch_exactly_once() {
        for _ in 0..200 {
            let core: Arc<Core<u64>> = Core::new();
            let calls = Arc::new(AtomicUsize::new(0));

            let producer = {
                let core = Arc::clone(&core);
                std::thread::spawn(move || {
                    assert!(core.try_set_result(Try::value(42)));
                })
            };
            let consumer = {
                let core = Arc::clone(&core);
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    core.set_callback(move |t| {
                        assert_eq!(t.unwrap(), 42);
                        calls.fetch_add(1, Ordering::SeqCst);
                    });
                })
            };
            producer.join().expect("producer panicked");
            consumer.join().expect("consumer panicked");
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }
}
