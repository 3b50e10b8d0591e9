//! Two-valued result container carried through continuation chains.
//!
//! [`Try`] holds either a value of `T` or an [`Error`]. It is the currency of
//! every continuation: producers fulfil a core with a `Try`, callbacks receive
//! the `Try` by value, and error-aware combinators inspect it to decide
//! whether to recover or pass through.

use crate::error::{Error, ErrorKind, Result};
use std::fmt;

/// The result of an asynchronous operation: a value or an error.
#[derive(Debug, Clone)]
pub enum Try<T> {
    /// Success with a value.
    Value(T),
    /// Failure with an error.
    Error(Error),
}

impl<T> Try<T> {
    /// Creates a successful `Try`.
    #[must_use]
    pub const fn value(v: T) -> Self {
        Self::Value(v)
    }

    /// Creates a failed `Try`.
    #[must_use]
    pub const fn err(e: Error) -> Self {
        Self::Error(e)
    }

    /// Returns true if this holds a value.
    #[must_use]
    pub const fn has_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Returns true if this holds an error.
    #[must_use]
    pub const fn has_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Returns a reference to the contained value, if any.
    #[must_use]
    pub const fn value_ref(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            Self::Error(_) => None,
        }
    }

    /// Returns a reference to the contained error, if any.
    #[must_use]
    pub const fn error_ref(&self) -> Option<&Error> {
        match self {
            Self::Value(_) => None,
            Self::Error(e) => Some(e),
        }
    }

    /// Returns the kind of the contained error, if any.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_ref().map(Error::kind)
    }

    /// Returns the contained error if its kind matches, consuming self.
    ///
    /// A `Try` that holds a value, or an error of a different kind, comes back
    /// unchanged in the `Err` position so the caller can pass it through.
    pub fn error_of_kind(self, kind: ErrorKind) -> std::result::Result<Error, Self> {
        match self {
            Self::Error(e) if e.kind() == kind => Ok(e),
            other => Err(other),
        }
    }

    /// Converts into a standard `Result`.
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Value(v) => Ok(v),
            Self::Error(e) => Err(e),
        }
    }

    /// Maps the success value using the provided function.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Try<U> {
        match self {
            Self::Value(v) => Try::Value(f(v)),
            Self::Error(e) => Try::Error(e),
        }
    }

    /// Chains a fallible transformation of the success value.
    pub fn and_then<U, F: FnOnce(T) -> Try<U>>(self, f: F) -> Try<U> {
        match self {
            Self::Value(v) => f(v),
            Self::Error(e) => Try::Error(e),
        }
    }

    /// Returns the success value or panics.
    ///
    /// # Panics
    ///
    /// Panics if this holds an error.
    #[track_caller]
    pub fn unwrap(self) -> T {
        match self {
            Self::Value(v) => v,
            Self::Error(e) => panic!("called `Try::unwrap()` on an `Error` value: {e}"),
        }
    }

    /// Returns the success value or a default.
    pub fn unwrap_or(self, default: T) -> T {
        match self {
            Self::Value(v) => v,
            Self::Error(_) => default,
        }
    }
}

impl<T> From<Result<T>> for Try<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(v) => Self::Value(v),
            Err(e) => Self::Error(e),
        }
    }
}

impl<T> From<Try<T>> for Result<T> {
    fn from(t: Try<T>) -> Self {
        t.into_result()
    }
}

impl<T: fmt::Display> fmt::Display for Try<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "Value({v})"),
            Self::Error(e) => write!(f, "Error({e})"),
        }
    }
}
