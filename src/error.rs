//! Error types and error handling strategy for promissory.
//!
//! This module defines the core error types used throughout the library.
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - User errors flow through [`Try`](crate::try_value::Try) values in the
//!   continuation chain; library errors are reported at the call site
//! - There is no global error sink: an error that is never observed is
//!   discarded when its core is reaped

use std::fmt;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Promise/Future lifecycle ===
    /// The producer handle was dropped without fulfilling its core.
    BrokenPromise,
    /// Operation on a handle whose result was already drained.
    NoState,
    /// Second fulfilment attempt on an already-satisfied promise.
    PromiseAlreadySatisfied,
    /// Second retrieval of a consumer handle from a promise.
    FutureAlreadyRetrieved,

    // === Executors and time ===
    /// An executor was required but none was supplied.
    NoExecutor,
    /// No timekeeper is available to service a timed operation.
    NoTimekeeper,
    /// A deadline expired before the operation completed.
    Timeout,

    // === Combinators ===
    /// A `filter` predicate returned false.
    PredicateDoesNotObtain,
    /// `collect_n` was asked for more completions than there are inputs.
    NotEnoughFutures,

    // === User ===
    /// User-provided error.
    User,
}

/// The main error type for promissory operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            source: None,
        }
    }

    /// Creates a user error with context text.
    #[must_use]
    pub fn user(ctx: impl Into<String>) -> Self {
        Self::new(ErrorKind::User).with_context(ctx)
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this error is a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout)
    }

    /// Returns true if this error came from a dropped producer handle.
    #[must_use]
    pub const fn is_broken_promise(&self) -> bool {
        matches!(self.kind, ErrorKind::BrokenPromise)
    }

    /// Adds deterministic context text to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the context text, if any.
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(ctx) = &self.context {
            write!(f, ": {ctx}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Attach a context string on error.
    fn context(self, ctx: impl Into<String>) -> Result<T>;
    /// Attach context computed lazily on error.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(ctx))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.into().with_context(f()))
    }
}

/// A specialized Result type for promissory operations.
pub type Result<T> = std::result::Result<T, Error>;
