//! Virtual-time timekeeper for deterministic tests.

use super::Timekeeper;
use crate::future::{make_semi_future, SemiFuture};
use crate::promise::Promise;
use parking_lot::Mutex;
use std::time::Duration;

/// A timekeeper whose clock only moves when the test advances it.
///
/// Registrations are held until [`advance`](Self::advance) carries virtual
/// time past their deadline; due promises are fulfilled in deadline order on
/// the advancing thread.
#[derive(Default)]
pub struct ManualTimekeeper {
    state: Mutex<ManualState>,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    pending: Vec<(Duration, Promise<()>)>,
}

impl ManualTimekeeper {
    /// Creates a timekeeper at virtual time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current virtual time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Advances virtual time, firing every timer whose deadline is reached.
    pub fn advance(&self, dur: Duration) {
        let mut due: Vec<(Duration, Promise<()>)> = {
            let mut st = self.state.lock();
            st.now += dur;
            let now = st.now;
            let mut due = Vec::new();
            let mut keep = Vec::new();
            for entry in st.pending.drain(..) {
                if entry.0 <= now {
                    due.push(entry);
                } else {
                    keep.push(entry);
                }
            }
            st.pending = keep;
            due
        };
        due.sort_by_key(|(deadline, _)| *deadline);
        // Fulfil off the lock: continuations may re-register timers.
        for (_, mut promise) in due {
            let _ = promise.set_value(());
        }
    }

    /// Returns the number of timers still waiting.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }
}

impl Timekeeper for ManualTimekeeper {
    fn after(&self, dur: Duration) -> SemiFuture<()> {
        if dur.is_zero() {
            return make_semi_future(());
        }
        let (promise, semi) = Promise::pair();
        let mut st = self.state.lock();
        let deadline = st.now + dur;
        st.pending.push((deadline, promise));
        semi
    }
}

impl std::fmt::Debug for ManualTimekeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.state.lock();
        f.debug_struct("ManualTimekeeper")
            .field("now", &st.now)
            .field("pending", &st.pending.len())
            .finish()
    }
}
