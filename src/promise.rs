//! Producer-side handle over a shared core.

use crate::core::Core;
use crate::error::{Error, ErrorKind, Result};
use crate::future::{Future, SemiFuture};
use crate::try_value::Try;
use std::sync::Arc;

/// One-time producer handle. Fulfils its core exactly once.
///
/// A promise that is dropped without being fulfilled fulfils the core with a
/// [`BrokenPromise`](ErrorKind::BrokenPromise) error, so a consumer waiting on
/// the other side is never stranded.
pub struct Promise<T: Send + 'static> {
    core: Arc<Core<T>>,
    retrieved: bool,
}

impl<T: Send + 'static> Promise<T> {
    /// Creates an unfulfilled promise.
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: Core::new(),
            retrieved: false,
        }
    }

    /// Creates a promise and its paired consumer handle.
    #[must_use]
    pub fn pair() -> (Self, SemiFuture<T>) {
        let mut promise = Self::new();
        let semi = promise.semi();
        (promise, semi)
    }

    pub(crate) fn core(&self) -> &Arc<Core<T>> {
        &self.core
    }

    /// Internal retrieval without the already-retrieved bookkeeping.
    pub(crate) fn semi(&mut self) -> SemiFuture<T> {
        self.retrieved = true;
        SemiFuture::from_core(Arc::clone(&self.core))
    }

    /// Fulfils the core with a value.
    ///
    /// # Errors
    ///
    /// Returns [`PromiseAlreadySatisfied`](ErrorKind::PromiseAlreadySatisfied)
    /// if the core was already fulfilled; the first result is untouched.
    pub fn set_value(&mut self, value: T) -> Result<()> {
        self.set_try(Try::value(value))
    }

    /// Fulfils the core with an error.
    ///
    /// # Errors
    ///
    /// Returns [`PromiseAlreadySatisfied`](ErrorKind::PromiseAlreadySatisfied)
    /// if the core was already fulfilled.
    pub fn set_error(&mut self, error: Error) -> Result<()> {
        self.set_try(Try::err(error))
    }

    /// Fulfils the core with a `Try`.
    ///
    /// # Errors
    ///
    /// Returns [`PromiseAlreadySatisfied`](ErrorKind::PromiseAlreadySatisfied)
    /// if the core was already fulfilled.
    pub fn set_try(&mut self, result: Try<T>) -> Result<()> {
        if self.core.try_set_result(result) {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::PromiseAlreadySatisfied))
        }
    }

    /// Returns true if the core has been fulfilled.
    #[must_use]
    pub fn is_fulfilled(&self) -> bool {
        self.core.has_result()
    }

    /// Yields the consumer handle without an executor.
    ///
    /// # Errors
    ///
    /// Returns [`FutureAlreadyRetrieved`](ErrorKind::FutureAlreadyRetrieved)
    /// on a second call.
    pub fn semi_future(&mut self) -> Result<SemiFuture<T>> {
        if self.retrieved {
            return Err(Error::new(ErrorKind::FutureAlreadyRetrieved));
        }
        Ok(self.semi())
    }

    /// Yields the consumer handle bound to the inline executor.
    ///
    /// Continuations attached to the returned future may run on the
    /// fulfilling thread; this is the same opt-in as
    /// [`SemiFuture::into_unsafe_future`].
    ///
    /// # Errors
    ///
    /// Returns [`FutureAlreadyRetrieved`](ErrorKind::FutureAlreadyRetrieved)
    /// on a second call.
    pub fn future(&mut self) -> Result<Future<T>> {
        self.semi_future().map(SemiFuture::into_unsafe_future)
    }

    /// Installs the handler invoked when a consumer raises an interrupt.
    ///
    /// An interrupt raised before installation is delivered immediately.
    pub fn set_interrupt_handler(&self, handler: impl Fn(Error) + Send + Sync + 'static) {
        self.core.set_interrupt_handler(Arc::new(handler));
    }
}

impl<T: Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Drop for Promise<T> {
    fn drop(&mut self) {
        if !self.core.has_result() {
            tracing::debug!("promise dropped unfulfilled; delivering BrokenPromise");
            let _ = self
                .core
                .try_set_result(Try::err(Error::new(ErrorKind::BrokenPromise)));
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("fulfilled", &self.is_fulfilled())
            .field("retrieved", &self.retrieved)
            .finish()
    }
}
