//! Promissory: a callback-based promise/future library with executor-aware
//! continuation scheduling.
//!
//! # Overview
//!
//! Promissory pairs a producer handle ([`Promise`]) with a consumer handle
//! ([`Future`] or [`SemiFuture`]) over a shared core. The core is a lock-free
//! state machine: the producer's result and the consumer's continuation can
//! arrive from different threads in either order, and whichever side
//! completes the pair dispatches the continuation exactly once on the bound
//! executor.
//!
//! There is no poll-based suspension: a continuation is a closure that runs
//! to completion on the thread its executor picks. The crate intentionally
//! does not implement `std::future::Future`.
//!
//! # Core Guarantees
//!
//! - **Exactly-once delivery**: a chain's continuation runs exactly once,
//!   with the producer's result, on the chain's executor
//! - **No stranded consumers**: dropping a producer delivers `BrokenPromise`
//! - **Cold chains stay cold**: `defer`red work never runs inline at
//!   fulfilment time; it waits for an executor or a blocking waiter
//! - **Interrupts flow upstream**: `raise` on any downstream handle reaches
//!   the producer's interrupt handler, independent of result flow
//!
//! # Module Structure
//!
//! - [`error`]: Typed errors (`Error`, `ErrorKind`)
//! - [`try_value`]: The `Try` value-or-error container
//! - [`executor`]: Executor contracts and built-in executors
//! - [`promise`]: The producer handle
//! - [`future`]: Consumer handles and the continuation plumbing
//! - [`combinator`]: Fan-in/fan-out, folds, windowing, loops
//! - [`time`]: Timekeepers and sleep futures
//! - [`sync`]: The baton used by the blocking bridge
//! - [`test_utils`]: Logging and assertion helpers for tests
//!
//! # Example
//!
//! ```
//! use promissory::{make_future, Promise};
//!
//! // Ready-made chains run as soon as continuations attach.
//! let doubled = make_future(21).then_value(|x| x * 2);
//! assert_eq!(doubled.get().unwrap(), 42);
//!
//! // Promise/future pairs rendezvous across threads.
//! let (mut p, sf) = Promise::pair();
//! std::thread::spawn(move || {
//!     p.set_value(5).unwrap();
//! });
//! assert_eq!(sf.get().unwrap(), 5);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod combinator;
mod core;
pub mod error;
pub mod executor;
pub mod future;
pub mod promise;
pub mod sync;
pub mod test_utils;
pub mod time;
pub mod try_value;

pub use combinator::{
    collect, collect_all, collect_all2, collect_any, collect_any_without_error, collect_n, map,
    reduce, times, unordered_reduce, when, while_do, window, window_on,
};
pub use error::{Error, ErrorKind, Result, ResultExt};
pub use executor::{
    DrivableExecutor, Executor, InlineExecutor, ManualExecutor, QueuedImmediateExecutor, Task,
    ThreadPoolExecutor, TimedDrivableExecutor,
};
pub use future::{
    make_future, make_future_error, make_future_try, make_future_with, make_semi_future,
    make_semi_future_error, make_semi_future_try, make_semi_future_with, via, Chainable,
    Completable, Future, SemiFuture,
};
pub use promise::Promise;
pub use sync::Baton;
pub use time::{sleep, sleep_on, ManualTimekeeper, ThreadTimekeeper, Timekeeper};
pub use try_value::Try;
