//! One-shot rendezvous between a poster and a waiter.
//!
//! [`Baton`] is the primitive behind the blocking bridge: a completion
//! callback posts it, a synchronous waiter blocks on it. A post that happens
//! before anyone waits is stored; waiting on an already-posted baton returns
//! immediately. The baton is one-shot and never resets.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A one-shot post/wait rendezvous.
#[derive(Debug, Default)]
pub struct Baton {
    posted: Mutex<bool>,
    cv: Condvar,
}

impl Baton {
    /// Creates a baton in the unposted state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts the baton, waking any current or future waiter.
    ///
    /// Posting more than once is allowed and has no further effect.
    pub fn post(&self) {
        let mut posted = self.posted.lock();
        *posted = true;
        self.cv.notify_all();
    }

    /// Returns true if the baton has been posted.
    #[must_use]
    pub fn is_posted(&self) -> bool {
        *self.posted.lock()
    }

    /// Blocks until the baton is posted.
    pub fn wait(&self) {
        let mut posted = self.posted.lock();
        while !*posted {
            self.cv.wait(&mut posted);
        }
    }

    /// Blocks until the baton is posted or `dur` elapses.
    ///
    /// Returns true if the baton was posted within the window.
    pub fn wait_for(&self, dur: Duration) -> bool {
        let deadline = Instant::now() + dur;
        let mut posted = self.posted.lock();
        while !*posted {
            if self.cv.wait_until(&mut posted, deadline).timed_out() {
                return *posted;
            }
        }
        true
    }
}
