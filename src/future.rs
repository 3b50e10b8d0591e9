//! Consumer-side handles and the continuation plumbing.
//!
//! [`SemiFuture`] is a cold handle: it has no real executor, and `defer*`
//! continuations accumulate behind a [`DeferredExecutor`] placeholder until
//! `via` attaches an executor or a blocking waiter drains the chain.
//! [`Future`] is the hot handle: `then*` continuations are scheduled on its
//! bound executor.
//!
//! Every chaining operation goes through one private helper, [`then_core`]:
//! build the downstream promise, propagate the upstream interrupt handler,
//! bind the executor onto the downstream core, then install the forwarding
//! callback on the upstream core. Results flow downstream through `Try`
//! values; interrupts flow upstream through the cores' interrupt channel.

use crate::combinator::collect_all2;
use crate::core::{Core, DeferredExecutor, ExecutorBinding};
use crate::error::{Error, ErrorKind, Result};
use crate::executor::{DrivableExecutor, Executor, InlineExecutor, TimedDrivableExecutor};
use crate::promise::Promise;
use crate::sync::Baton;
use crate::time::{sleep_on, Timekeeper};
use crate::try_value::Try;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

mod sealed {
    pub trait Sealed {}
}

/// A continuation result that can be chained behind a core: either an
/// executor-bound [`Future`] or a cold [`SemiFuture`].
///
/// A `SemiFuture` returned from a continuation is first re-bound through the
/// downstream core's executor (or the inline executor if none) so deferred
/// work is never silently run inline.
pub trait Chainable<R: Send + 'static>: sealed::Sealed + Send + Sized + 'static {
    #[doc(hidden)]
    fn chain(self, executor: Option<(Arc<dyn Executor>, i8)>) -> Future<R>;
}

/// A consumer handle a combinator can subscribe to.
///
/// Implemented by [`Future`] and [`SemiFuture`]; the combinator layer accepts
/// either, leaving each input's own executor binding in charge of where its
/// completion callback runs.
pub trait Completable<T: Send + 'static>: sealed::Sealed + Send + Sized + 'static {
    #[doc(hidden)]
    fn on_complete<F>(self, f: F)
    where
        F: FnOnce(Try<T>) + Send + 'static;
}

/// Consumer handle without a bound executor.
///
/// Dropping a `SemiFuture` whose chain is parked behind a deferred
/// placeholder detaches the placeholder and discards the deferred work.
pub struct SemiFuture<T: Send + 'static> {
    core: Option<Arc<Core<T>>>,
}

/// Consumer handle bound to an executor.
pub struct Future<T: Send + 'static> {
    core: Arc<Core<T>>,
}

// === constructors ===

/// Creates a future fulfilled with `value`.
pub fn make_future<T: Send + 'static>(value: T) -> Future<T> {
    make_future_try(Try::value(value))
}

/// Creates a future fulfilled with the given `Try`.
pub fn make_future_try<T: Send + 'static>(result: Try<T>) -> Future<T> {
    Future {
        core: Core::make(result),
    }
}

/// Creates a future fulfilled with an error.
pub fn make_future_error<T: Send + 'static>(error: Error) -> Future<T> {
    make_future_try(Try::err(error))
}

/// Creates a future from a closure, capturing its returned `Try`.
pub fn make_future_with<T: Send + 'static, F: FnOnce() -> Try<T>>(func: F) -> Future<T> {
    make_future_try(func())
}

/// Creates a semifuture fulfilled with `value`.
pub fn make_semi_future<T: Send + 'static>(value: T) -> SemiFuture<T> {
    make_semi_future_try(Try::value(value))
}

/// Creates a semifuture fulfilled with the given `Try`.
pub fn make_semi_future_try<T: Send + 'static>(result: Try<T>) -> SemiFuture<T> {
    SemiFuture {
        core: Some(Core::make(result)),
    }
}

/// Creates a semifuture fulfilled with an error.
pub fn make_semi_future_error<T: Send + 'static>(error: Error) -> SemiFuture<T> {
    make_semi_future_try(Try::err(error))
}

/// Creates a semifuture from a closure, capturing its returned `Try`.
pub fn make_semi_future_with<T: Send + 'static, F: FnOnce() -> Try<T>>(func: F) -> SemiFuture<T> {
    make_semi_future_try(func())
}

/// Creates a unit future running on `executor`.
///
/// # Errors
///
/// Returns [`NoExecutor`](ErrorKind::NoExecutor) when no executor is given.
pub fn via(executor: Option<Arc<dyn Executor>>, priority: i8) -> Result<Future<()>> {
    match executor {
        Some(executor) => Ok(make_future(()).via_priority(executor, priority)),
        None => Err(Error::new(ErrorKind::NoExecutor)),
    }
}

// === the one true chaining helper ===

/// Chains a fresh core behind `core`: the downstream promise is handed to
/// `install` together with the upstream result when it arrives.
fn then_core<T, R, F>(core: Arc<Core<T>>, binding: ExecutorBinding, install: F) -> Arc<Core<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: FnOnce(Try<T>, Promise<R>) + Send + 'static,
{
    let p: Promise<R> = Promise::new();
    if let Some(handler) = core.interrupt_handler() {
        p.core().set_interrupt_handler(handler);
    }
    let new_core = Arc::clone(p.core());
    new_core.set_executor(binding);
    core.set_callback(move |t| install(t, p));
    new_core
}

fn drain_try<T: Send + 'static>(core: &Arc<Core<T>>) -> Try<T> {
    core.take_result()
        .unwrap_or_else(|| Try::err(Error::new(ErrorKind::NoState)))
}

/// Blocks until `core` is fulfilled, re-threading the result through a fresh
/// core so the caller keeps a usable handle. Returns the replacement core and
/// whether it is ready.
fn wait_core<T: Send + 'static>(
    core: Arc<Core<T>>,
    dur: Option<Duration>,
) -> (Arc<Core<T>>, bool) {
    if core.has_result() {
        return (core, true);
    }
    let mut p: Promise<T> = Promise::new();
    let ret = Arc::clone(p.core());
    let baton = Arc::new(Baton::new());
    let posted = Arc::clone(&baton);
    core.set_callback(move |t| {
        let _ = p.set_try(t);
        posted.post();
    });
    let ready = match dur {
        None => {
            baton.wait();
            true
        }
        Some(dur) => baton.wait_for(dur),
    };
    (ret, ready)
}

// === SemiFuture ===

impl<T: Send + 'static> SemiFuture<T> {
    pub(crate) fn from_core(core: Arc<Core<T>>) -> Self {
        Self { core: Some(core) }
    }

    fn core(&self) -> &Arc<Core<T>> {
        self.core.as_ref().expect("semifuture has no state")
    }

    fn into_core(mut self) -> Arc<Core<T>> {
        self.core.take().expect("semifuture has no state")
    }

    /// Returns true if the producer has fulfilled this chain.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.core().has_result()
    }

    /// Returns true if ready with a value.
    #[must_use]
    pub fn has_value(&self) -> bool {
        self.core().peek_value() == Some(true)
    }

    /// Returns true if ready with an error.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.core().peek_value() == Some(false)
    }

    /// Non-blocking peek: takes the result out if it is present.
    pub fn poll(&mut self) -> Option<Try<T>> {
        self.core().take_result()
    }

    /// Returns the result if ready.
    ///
    /// # Errors
    ///
    /// Returns [`NoState`](ErrorKind::NoState) if the chain is not ready or
    /// the result was already drained.
    pub fn value(self) -> Result<T> {
        if !self.is_ready() {
            return Err(Error::new(ErrorKind::NoState).with_context("semifuture not ready"));
        }
        drain_try(&self.into_core()).into_result()
    }

    /// Raises an interrupt towards the producer.
    pub fn raise(&self, error: Error) {
        self.core().raise(error);
    }

    fn deferred(&self) -> Option<Arc<DeferredExecutor>> {
        match self.core().executor_binding() {
            ExecutorBinding::Deferred(d) => Some(d),
            _ => None,
        }
    }

    fn defer_impl<R, F>(self, install: F) -> SemiFuture<R>
    where
        R: Send + 'static,
        F: FnOnce(Try<T>, Promise<R>) + Send + 'static,
    {
        let core = self.into_core();
        let placeholder = match core.executor_binding() {
            ExecutorBinding::Deferred(d) => d,
            _ => {
                let d = DeferredExecutor::new();
                core.set_executor(ExecutorBinding::Deferred(Arc::clone(&d)));
                d
            }
        };
        let new_core = then_core(core, ExecutorBinding::Deferred(placeholder), install);
        SemiFuture::from_core(new_core)
    }

    /// Attaches a continuation that receives the `Try`.
    ///
    /// The work is parked behind the chain's deferred placeholder: it runs on
    /// the executor later attached with [`via`](Self::via), or on the waiter's
    /// thread for a blocking drain, never inline at fulfilment time.
    pub fn defer<R, F>(self, func: F) -> SemiFuture<R>
    where
        R: Send + 'static,
        F: FnOnce(Try<T>) -> Try<R> + Send + 'static,
    {
        self.defer_impl(move |t, mut p| {
            let _ = p.set_try(func(t));
        })
    }

    /// Attaches a value continuation; errors bypass it.
    pub fn defer_value<R, F>(self, func: F) -> SemiFuture<R>
    where
        R: Send + 'static,
        F: FnOnce(T) -> R + Send + 'static,
    {
        self.defer_impl(move |t, mut p| match t.into_result() {
            Ok(v) => {
                let _ = p.set_value(func(v));
            }
            Err(e) => {
                let _ = p.set_error(e);
            }
        })
    }

    /// Attaches an error continuation recovering errors of `kind`; values and
    /// other errors pass through.
    pub fn defer_error<F>(self, kind: ErrorKind, func: F) -> SemiFuture<T>
    where
        F: FnOnce(Error) -> T + Send + 'static,
    {
        self.defer_impl(move |t, mut p| match t.error_of_kind(kind) {
            Ok(e) => {
                let _ = p.set_value(func(e));
            }
            Err(passthrough) => {
                let _ = p.set_try(passthrough);
            }
        })
    }

    /// Promotes to a [`Future`] bound to `executor`.
    ///
    /// Any deferred work parked behind the placeholder is enqueued on the
    /// executor as soon as (or as soon after as) the producer fulfils.
    pub fn via(self, executor: Arc<dyn Executor>) -> Future<T> {
        self.via_priority(executor, 0)
    }

    /// [`via`](Self::via) with a scheduling priority.
    pub fn via_priority(self, executor: Arc<dyn Executor>, priority: i8) -> Future<T> {
        let core = self.into_core();
        if let ExecutorBinding::Deferred(d) = core.executor_binding() {
            d.set_executor(Arc::clone(&executor), priority);
        }
        core.set_executor(ExecutorBinding::Bound { executor, priority });
        Future { core }
    }

    /// Promotes to a [`Future`] on the inline executor.
    ///
    /// Explicit opt-in: continuations may run on the producer's thread.
    pub fn into_unsafe_future(self) -> Future<T> {
        self.via(InlineExecutor::instance())
    }

    /// Delivers the result after at least `dur` has elapsed.
    #[must_use]
    pub fn delayed(self, dur: Duration) -> SemiFuture<T> {
        self.delayed_on(dur, None)
    }

    /// [`delayed`](Self::delayed) against an explicit timekeeper.
    pub fn delayed_on(self, dur: Duration, tk: Option<&Arc<dyn Timekeeper>>) -> SemiFuture<T> {
        collect_all2(self, sleep_on(dur, tk))
            .into_unsafe_future()
            .then_try(|pair| match pair.into_result() {
                Ok((t, _slept)) => t,
                Err(e) => Try::err(e),
            })
            .semi()
    }

    /// Blocks until the chain is ready.
    ///
    /// With a deferred placeholder the rendezvous goes through the
    /// placeholder's baton and the parked chain runs on this thread.
    #[must_use]
    pub fn wait(self) -> Self {
        if let Some(d) = self.deferred() {
            let core = self.into_core();
            d.wait();
            d.run_and_destroy();
            core.set_executor(ExecutorBinding::None);
            return Self::from_core(core);
        }
        let (core, _) = wait_core(self.into_core(), None);
        Self::from_core(core)
    }

    /// Blocks until the chain is ready or `dur` elapses.
    ///
    /// On timeout the handle is returned not-ready and stays usable; a timed
    /// deferred rendezvous is reverted cleanly.
    #[must_use]
    pub fn wait_for(self, dur: Duration) -> Self {
        if let Some(d) = self.deferred() {
            let core = self.into_core();
            if d.wait_for(dur) {
                d.run_and_destroy();
                core.set_executor(ExecutorBinding::None);
            }
            return Self::from_core(core);
        }
        let (core, _) = wait_core(self.into_core(), Some(dur));
        Self::from_core(core)
    }

    /// Blocks and returns the value.
    ///
    /// # Errors
    ///
    /// Returns the chain's error if it completed with one.
    pub fn get(self) -> Result<T> {
        self.get_try().into_result()
    }

    /// Blocks and returns the `Try`.
    pub fn get_try(self) -> Try<T> {
        let done = self.wait();
        drain_try(&done.into_core())
    }

    /// Blocks up to `dur` and returns the value.
    ///
    /// # Errors
    ///
    /// Returns [`Timeout`](ErrorKind::Timeout) if the deadline expires first.
    pub fn get_for(self, dur: Duration) -> Result<T> {
        let done = self.wait_for(dur);
        let core = done.into_core();
        if let ExecutorBinding::Deferred(d) = core.executor_binding() {
            d.detach();
            core.set_executor(ExecutorBinding::None);
        }
        if !core.has_result() {
            return Err(Error::new(ErrorKind::Timeout));
        }
        drain_try(&core).into_result()
    }
}

impl<T: Send + 'static> Drop for SemiFuture<T> {
    fn drop(&mut self) {
        if let Some(core) = self.core.take() {
            if let ExecutorBinding::Deferred(d) = core.executor_binding() {
                d.detach();
                core.set_executor(ExecutorBinding::None);
            }
        }
    }
}

impl<T: Send + 'static> From<Future<T>> for SemiFuture<T> {
    fn from(f: Future<T>) -> Self {
        f.semi()
    }
}

impl<T: Send + 'static> std::fmt::Debug for SemiFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemiFuture")
            .field("ready", &self.core.as_ref().is_some_and(|c| c.has_result()))
            .finish()
    }
}

// === Future ===

impl<T: Send + 'static> Future<T> {
    /// Returns true if the producer has fulfilled this chain.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.core.has_result()
    }

    /// Returns true if ready with a value.
    #[must_use]
    pub fn has_value(&self) -> bool {
        self.core.peek_value() == Some(true)
    }

    /// Returns true if ready with an error.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.core.peek_value() == Some(false)
    }

    /// Non-blocking peek: takes the result out if it is present.
    pub fn poll(&mut self) -> Option<Try<T>> {
        self.core.take_result()
    }

    /// Returns the result if ready.
    ///
    /// # Errors
    ///
    /// Returns [`NoState`](ErrorKind::NoState) if the chain is not ready or
    /// the result was already drained.
    pub fn value(self) -> Result<T> {
        if !self.is_ready() {
            return Err(Error::new(ErrorKind::NoState).with_context("future not ready"));
        }
        drain_try(&self.core).into_result()
    }

    /// Raises an interrupt towards the producer.
    pub fn raise(&self, error: Error) {
        self.core.raise(error);
    }

    fn then_impl<R, F>(self, install: F) -> Future<R>
    where
        R: Send + 'static,
        F: FnOnce(Try<T>, Promise<R>) + Send + 'static,
    {
        let binding = self.core.executor_binding();
        Future {
            core: then_core(self.core, binding, install),
        }
    }

    /// Attaches a continuation that receives the `Try` and may recover.
    pub fn then_try<R, F>(self, func: F) -> Future<R>
    where
        R: Send + 'static,
        F: FnOnce(Try<T>) -> Try<R> + Send + 'static,
    {
        self.then_impl(move |t, mut p| {
            let _ = p.set_try(func(t));
        })
    }

    /// Attaches a value continuation; errors bypass it.
    pub fn then_value<R, F>(self, func: F) -> Future<R>
    where
        R: Send + 'static,
        F: FnOnce(T) -> R + Send + 'static,
    {
        self.then_impl(move |t, mut p| match t.into_result() {
            Ok(v) => {
                let _ = p.set_value(func(v));
            }
            Err(e) => {
                let _ = p.set_error(e);
            }
        })
    }

    /// Attaches a continuation returning another future; the chains are
    /// joined. A returned [`SemiFuture`] is re-bound through this chain's
    /// executor (or the inline executor if none) before it is subscribed,
    /// so deferred work is never run inline without opt-in.
    pub fn then_future<R, C, F>(self, func: F) -> Future<R>
    where
        R: Send + 'static,
        C: Chainable<R>,
        F: FnOnce(T) -> C + Send + 'static,
    {
        self.then_impl(move |t, mut p| match t.into_result() {
            Err(e) => {
                let _ = p.set_error(e);
            }
            Ok(v) => {
                let next = func(v).chain(p.core().executor_binding().bound());
                next.core.set_callback(move |r| {
                    let _ = p.set_try(r);
                });
            }
        })
    }

    /// Recovers errors of `kind` with `func`; values and other errors pass
    /// through. The result is rebound to this chain's executor, falling back
    /// to the inline executor when none is bound.
    pub fn then_error<F>(self, kind: ErrorKind, func: F) -> Future<T>
    where
        F: FnOnce(Error) -> T + Send + 'static,
    {
        let executor = self.core.executor_binding().bound();
        let recovered = then_core(self.core, ExecutorBinding::None, move |t, mut p| {
            match t.error_of_kind(kind) {
                Ok(e) => {
                    let _ = p.set_value(func(e));
                }
                Err(passthrough) => {
                    let _ = p.set_try(passthrough);
                }
            }
        });
        let f = Future { core: recovered };
        match executor {
            Some((e, priority)) => f.via_priority(e, priority),
            None => f.via(InlineExecutor::instance()),
        }
    }

    /// Catch-all recovery: `func` receives any error and may itself fail.
    /// The result returns through the inline executor.
    pub fn on_error<F>(self, func: F) -> Future<T>
    where
        F: FnOnce(Error) -> Try<T> + Send + 'static,
    {
        let recovered = then_core(self.core, ExecutorBinding::None, move |t, mut p| {
            match t.into_result() {
                Ok(v) => {
                    let _ = p.set_value(v);
                }
                Err(e) => {
                    let _ = p.set_try(func(e));
                }
            }
        });
        Future { core: recovered }.via(InlineExecutor::instance())
    }

    /// Runs `func` on success and on error; the result passes through.
    pub fn ensure<F>(self, func: F) -> Future<T>
    where
        F: FnOnce() + Send + 'static,
    {
        self.then_try(move |t| {
            func();
            t
        })
    }

    /// Fails with [`PredicateDoesNotObtain`](ErrorKind::PredicateDoesNotObtain)
    /// when `predicate` rejects the value.
    pub fn filter<P>(self, predicate: P) -> Future<T>
    where
        P: FnOnce(&T) -> bool + Send + 'static,
    {
        self.then_try(move |t| {
            t.and_then(|v| {
                if predicate(&v) {
                    Try::value(v)
                } else {
                    Try::err(Error::new(ErrorKind::PredicateDoesNotObtain))
                }
            })
        })
    }

    /// Discards the value.
    pub fn unit(self) -> Future<()> {
        self.then_value(|_| ())
    }

    /// Rebinds downstream continuations to `executor`.
    pub fn via(self, executor: Arc<dyn Executor>) -> Future<T> {
        self.via_priority(executor, 0)
    }

    /// [`via`](Self::via) with a scheduling priority.
    pub fn via_priority(self, executor: Arc<dyn Executor>, priority: i8) -> Future<T> {
        self.core
            .set_executor(ExecutorBinding::Bound { executor, priority });
        self
    }

    /// Demotes to a [`SemiFuture`], dropping the executor binding.
    #[must_use]
    pub fn semi(self) -> SemiFuture<T> {
        self.core.set_executor(ExecutorBinding::None);
        SemiFuture::from_core(self.core)
    }

    /// Completes with this chain's result if it arrives within `dur`, else
    /// with [`Timeout`](ErrorKind::Timeout).
    pub fn within(self, dur: Duration) -> Future<T> {
        self.within_error(dur, Error::new(ErrorKind::Timeout))
    }

    /// [`within`](Self::within) with a custom deadline error.
    pub fn within_error(self, dur: Duration, error: Error) -> Future<T> {
        self.within_on(dur, error, None)
    }

    /// [`within`](Self::within) against an explicit timekeeper.
    pub fn within_on(
        self,
        dur: Duration,
        error: Error,
        tk: Option<&Arc<dyn Timekeeper>>,
    ) -> Future<T> {
        if self.is_ready() {
            return self;
        }
        let executor = self.core.executor_binding().bound();
        let semi = within_implementation(self, dur, error, tk);
        match executor {
            Some((e, priority)) => semi.via_priority(e, priority),
            None => semi.into_unsafe_future(),
        }
    }

    /// Recovers a [`within`](Self::within) timeout by calling `func`.
    pub fn on_timeout<F>(self, dur: Duration, func: F) -> Future<T>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        self.within(dur).then_error(ErrorKind::Timeout, move |_| func())
    }

    /// Delivers the result after at least `dur` has elapsed.
    #[must_use]
    pub fn delayed(self, dur: Duration) -> Future<T> {
        self.delayed_on(dur, None)
    }

    /// [`delayed`](Self::delayed) against an explicit timekeeper.
    pub fn delayed_on(self, dur: Duration, tk: Option<&Arc<dyn Timekeeper>>) -> Future<T> {
        let executor = self.core.executor_binding().bound();
        let delayed = self.semi().delayed_on(dur, tk);
        match executor {
            Some((e, priority)) => delayed.via_priority(e, priority),
            None => delayed.into_unsafe_future(),
        }
    }

    /// Blocks until the chain is ready.
    ///
    /// The chain is re-bound through the inline executor so progress does not
    /// depend on an external driver.
    #[must_use]
    pub fn wait(self) -> Self {
        let f = self.via(InlineExecutor::instance());
        let (core, _) = wait_core(f.core, None);
        Future { core }.via(InlineExecutor::instance())
    }

    /// Blocks until the chain is ready or `dur` elapses; the handle stays
    /// usable either way.
    #[must_use]
    pub fn wait_for(self, dur: Duration) -> Self {
        let f = self.via(InlineExecutor::instance());
        let (core, _) = wait_core(f.core, Some(dur));
        Future { core }.via(InlineExecutor::instance())
    }

    /// Drives `driver` until the chain is ready.
    #[must_use]
    pub fn wait_via<E>(self, driver: &Arc<E>) -> Self
    where
        E: DrivableExecutor + 'static,
    {
        if self.is_ready() {
            return self;
        }
        // Re-enter the driver so every completion leaves it a task to run.
        let f = self
            .via(Arc::clone(driver) as Arc<dyn Executor>)
            .then_value(|v| v);
        while !f.is_ready() {
            driver.drive();
        }
        f.via(InlineExecutor::instance())
    }

    /// Drives `driver` until the chain is ready or `dur` elapses.
    #[must_use]
    pub fn wait_via_timed<E>(self, driver: &Arc<E>, dur: Duration) -> Self
    where
        E: TimedDrivableExecutor + 'static,
    {
        if self.is_ready() {
            return self;
        }
        let f = self
            .via(Arc::clone(driver) as Arc<dyn Executor>)
            .then_value(|v| v);
        let deadline = Instant::now() + dur;
        while !f.is_ready() && Instant::now() < deadline {
            driver.try_drive_until(deadline);
        }
        if f.is_ready() {
            f.via(InlineExecutor::instance())
        } else {
            f
        }
    }

    /// Blocks and returns the value.
    ///
    /// # Errors
    ///
    /// Returns the chain's error if it completed with one.
    pub fn get(self) -> Result<T> {
        self.get_try().into_result()
    }

    /// Blocks and returns the `Try`.
    pub fn get_try(self) -> Try<T> {
        let done = self.wait();
        drain_try(&done.core)
    }

    /// Blocks up to `dur` and returns the value.
    ///
    /// # Errors
    ///
    /// Returns [`Timeout`](ErrorKind::Timeout) if the deadline expires first.
    pub fn get_for(self, dur: Duration) -> Result<T> {
        let done = self.wait_for(dur);
        if !done.is_ready() {
            return Err(Error::new(ErrorKind::Timeout));
        }
        drain_try(&done.core).into_result()
    }

    /// Drives `driver` to completion and returns the value.
    ///
    /// # Errors
    ///
    /// Returns the chain's error if it completed with one.
    pub fn get_via<E>(self, driver: &Arc<E>) -> Result<T>
    where
        E: DrivableExecutor + 'static,
    {
        let done = self.wait_via(driver);
        drain_try(&done.core).into_result()
    }

    /// Drives `driver` up to `dur` and returns the value.
    ///
    /// # Errors
    ///
    /// Returns [`Timeout`](ErrorKind::Timeout) if the deadline expires first.
    pub fn get_via_timed<E>(self, driver: &Arc<E>, dur: Duration) -> Result<T>
    where
        E: TimedDrivableExecutor + 'static,
    {
        let done = self.wait_via_timed(driver, dur);
        if !done.is_ready() {
            return Err(Error::new(ErrorKind::Timeout));
        }
        drain_try(&done.core).into_result()
    }
}

impl<V: Send + 'static> Future<Vec<V>> {
    /// Folds the contained collection once it arrives.
    pub fn reduce<I, F>(self, initial: I, func: F) -> Future<I>
    where
        I: Send + 'static,
        F: FnMut(I, V) -> I + Send + 'static,
    {
        self.then_value(move |vals| vals.into_iter().fold(initial, func))
    }
}

impl<T: Send + 'static> std::fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Future")
            .field("ready", &self.core.has_result())
            .finish()
    }
}

// === chaining and subscription seams ===

impl<T: Send + 'static> sealed::Sealed for Future<T> {}
impl<T: Send + 'static> sealed::Sealed for SemiFuture<T> {}

impl<R: Send + 'static> Chainable<R> for Future<R> {
    fn chain(self, _executor: Option<(Arc<dyn Executor>, i8)>) -> Future<R> {
        self
    }
}

impl<R: Send + 'static> Chainable<R> for SemiFuture<R> {
    fn chain(self, executor: Option<(Arc<dyn Executor>, i8)>) -> Future<R> {
        match executor {
            Some((e, priority)) => self.via_priority(e, priority),
            None => self.into_unsafe_future(),
        }
    }
}

impl<T: Send + 'static> Completable<T> for Future<T> {
    fn on_complete<F>(self, f: F)
    where
        F: FnOnce(Try<T>) + Send + 'static,
    {
        self.core.set_callback(f);
    }
}

impl<T: Send + 'static> Completable<T> for SemiFuture<T> {
    fn on_complete<F>(self, f: F)
    where
        F: FnOnce(Try<T>) + Send + 'static,
    {
        self.into_core().set_callback(f);
    }
}

// === within ===

struct WithinContext<T: Send + 'static> {
    token: AtomicBool,
    promise: Mutex<Option<Promise<T>>>,
    source: Mutex<Option<Future<()>>>,
    error: Mutex<Option<Error>>,
}

fn within_implementation<T: Send + 'static>(
    f: Future<T>,
    dur: Duration,
    error: Error,
    tk: Option<&Arc<dyn Timekeeper>>,
) -> SemiFuture<T> {
    let mut p: Promise<T> = Promise::new();
    let out = p.semi();
    let ctx = Arc::new(WithinContext {
        token: AtomicBool::new(false),
        promise: Mutex::new(Some(p)),
        source: Mutex::new(None),
        error: Mutex::new(Some(error)),
    });

    // Source side: whoever flips the token first fulfils the output.
    let source_ctx = Arc::clone(&ctx);
    let chained = f.then_try(move |t| {
        if !source_ctx.token.swap(true, Ordering::AcqRel) {
            if let Some(mut p) = source_ctx.promise.lock().take() {
                let _ = p.set_try(t);
            }
        }
        Try::value(())
    });
    *ctx.source.lock() = Some(chained);

    // Interrupts raised downstream of the timed future keep propagating
    // towards the original producer through the stored source chain.
    let weak = Arc::downgrade(&ctx);
    {
        let guard = ctx.promise.lock();
        if let Some(p) = guard.as_ref() {
            p.set_interrupt_handler(move |e| {
                if let Some(ctx) = weak.upgrade() {
                    if let Some(src) = ctx.source.lock().as_ref() {
                        src.raise(e);
                    }
                }
            });
        }
    }

    // Timer side: holds the context weakly so the source winning releases
    // everything without waiting for the timer to fire.
    let weak = Arc::downgrade(&ctx);
    let _ = sleep_on(dur, tk).into_unsafe_future().then_try(move |t| {
        let Some(ctx) = weak.upgrade() else {
            return Try::value(());
        };
        if let Some(src) = ctx.source.lock().as_ref() {
            src.raise(Error::new(ErrorKind::Timeout));
        }
        if !ctx.token.swap(true, Ordering::AcqRel) {
            if let Some(mut p) = ctx.promise.lock().take() {
                match t.into_result() {
                    Err(e) => {
                        let _ = p.set_error(e);
                    }
                    Ok(()) => {
                        let e = ctx
                            .error
                            .lock()
                            .take()
                            .unwrap_or_else(|| Error::new(ErrorKind::Timeout));
                        let _ = p.set_error(e);
                    }
                }
            }
        }
        Try::value(())
    });

    out
}
