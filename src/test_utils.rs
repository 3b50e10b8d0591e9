//! Test utilities for promissory.
//!
//! Shared helpers for unit and end-to-end tests:
//! - Consistent tracing-based logging initialization
//! - Phase/section macros for readable test output
//! - Assertion macros that log expected/actual values
//!
//! # Example
//! ```
//! use promissory::test_utils::init_test_logging;
//!
//! fn my_test() {
//!     init_test_logging();
//!     promissory::test_phase!("setup");
//!     // test code
//! }
//! ```

use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
///
/// The first call wins; later calls are no-ops.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}

/// Assert that a `Try` holds a specific value.
#[macro_export]
macro_rules! assert_try_value {
    ($try:expr, $expected:expr) => {
        match $try {
            $crate::Try::Value(v) => assert_eq!(v, $expected),
            $crate::Try::Error(e) => {
                unreachable!("expected Try::Value({:?}), got error: {}", $expected, e)
            }
        }
    };
}

/// Assert that a `Try` holds an error of a specific kind.
#[macro_export]
macro_rules! assert_try_error {
    ($try:expr, $kind:expr) => {
        match $try {
            $crate::Try::Error(e) => assert_eq!(e.kind(), $kind),
            $crate::Try::Value(_) => unreachable!("expected Try::Error({:?}), got a value", $kind),
        }
    };
}
