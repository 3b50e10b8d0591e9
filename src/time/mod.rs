//! Timekeeping: futures that complete after a duration.
//!
//! A [`Timekeeper`] turns durations into cold futures. Production code uses
//! the lazily started global [`ThreadTimekeeper`]; tests inject a
//! [`ManualTimekeeper`] and advance virtual time deterministically.

mod manual;
mod thread_timekeeper;

pub use manual::ManualTimekeeper;
pub use thread_timekeeper::ThreadTimekeeper;

use crate::error::{Error, ErrorKind, Result};
use crate::future::{make_semi_future, make_semi_future_error, SemiFuture};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Produces futures that complete after a duration.
pub trait Timekeeper: Send + Sync {
    /// Returns a cold future that completes at least `dur` from now.
    fn after(&self, dur: Duration) -> SemiFuture<()>;

    /// Returns a cold future that completes at `when`.
    fn at(&self, when: Instant) -> SemiFuture<()> {
        let now = Instant::now();
        if when <= now {
            make_semi_future(())
        } else {
            self.after(when - now)
        }
    }
}

/// Returns the process-wide timekeeper, starting it on first use.
///
/// # Errors
///
/// Returns [`NoTimekeeper`](ErrorKind::NoTimekeeper) if the timekeeper thread
/// could not be spawned.
pub fn global() -> Result<Arc<dyn Timekeeper>> {
    static GLOBAL: OnceLock<Option<Arc<ThreadTimekeeper>>> = OnceLock::new();
    GLOBAL
        .get_or_init(|| ThreadTimekeeper::start().ok())
        .as_ref()
        .map(|tk| Arc::clone(tk) as Arc<dyn Timekeeper>)
        .ok_or_else(|| Error::new(ErrorKind::NoTimekeeper))
}

/// Returns a cold future that completes at least `dur` from now, using the
/// global timekeeper.
pub fn sleep(dur: Duration) -> SemiFuture<()> {
    sleep_on(dur, None)
}

/// [`sleep`] against an explicit timekeeper.
///
/// With `None` the global timekeeper is used; if none can be started the
/// returned future carries [`NoTimekeeper`](ErrorKind::NoTimekeeper).
pub fn sleep_on(dur: Duration, tk: Option<&Arc<dyn Timekeeper>>) -> SemiFuture<()> {
    match tk {
        Some(tk) => tk.after(dur),
        None => match global() {
            Ok(tk) => tk.after(dur),
            Err(e) => make_semi_future_error(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_timekeeper_is_shared() {
        let a = global().expect("timekeeper");
        let b = global().expect("timekeeper");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn sleep_completes() {
        let start = Instant::now();
        sleep(Duration::from_millis(20)).get().expect("slept");
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn at_in_the_past_is_ready() {
        let tk = global().expect("timekeeper");
        let f = tk.at(Instant::now() - Duration::from_millis(1));
        assert!(f.is_ready());
    }
}
