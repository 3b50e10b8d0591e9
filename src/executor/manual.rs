//! Executor driven explicitly by a controlling thread.

use super::{DrivableExecutor, Executor, Task, TimedDrivableExecutor};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Instant;

/// An executor that holds tasks until the owner drives it.
///
/// Tests and the `wait_via` bridge use this to decide exactly when and on
/// which thread continuations run.
#[derive(Default)]
pub struct ManualExecutor {
    queue: Mutex<VecDeque<Task>>,
    cv: Condvar,
}

impl std::fmt::Debug for ManualExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualExecutor")
            .field("pending", &self.queue.lock().len())
            .finish()
    }
}

impl ManualExecutor {
    /// Creates an empty manual executor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every task currently queued, returning how many ran.
    ///
    /// Tasks added by the tasks being run are not picked up; they wait for
    /// the next call.
    pub fn run(&self) -> usize {
        let batch: Vec<Task> = {
            let mut queue = self.queue.lock();
            queue.drain(..).collect()
        };
        let n = batch.len();
        for task in batch {
            task();
        }
        n
    }

    /// Returns the number of queued tasks.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Executor for ManualExecutor {
    fn add(&self, task: Task) {
        self.queue.lock().push_back(task);
        self.cv.notify_one();
    }
}

impl DrivableExecutor for ManualExecutor {
    fn drive(&self) {
        {
            let mut queue = self.queue.lock();
            while queue.is_empty() {
                self.cv.wait(&mut queue);
            }
        }
        self.run();
    }
}

impl TimedDrivableExecutor for ManualExecutor {
    fn try_drive_until(&self, deadline: Instant) -> bool {
        {
            let mut queue = self.queue.lock();
            while queue.is_empty() {
                if self.cv.wait_until(&mut queue, deadline).timed_out() {
                    break;
                }
            }
        }
        self.run() > 0
    }
}
