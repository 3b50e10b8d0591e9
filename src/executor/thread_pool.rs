//! Fixed-size worker pool executor.

use super::{Executor, Task};
use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long an idle worker parks before re-checking the queue.
const IDLE_PARK: Duration = Duration::from_millis(100);

/// A fixed pool of worker threads draining a shared queue.
pub struct ThreadPoolExecutor {
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

struct PoolInner {
    queue: SegQueue<Task>,
    shutdown: AtomicBool,
    mutex: Mutex<()>,
    cv: Condvar,
}

impl ThreadPoolExecutor {
    /// Spawns a pool with `threads` workers.
    ///
    /// # Panics
    ///
    /// Panics if `threads` is zero or a worker thread cannot be spawned.
    #[must_use]
    pub fn new(threads: usize) -> Arc<Self> {
        assert!(threads > 0, "thread pool needs at least one worker");
        let inner = Arc::new(PoolInner {
            queue: SegQueue::new(),
            shutdown: AtomicBool::new(false),
            mutex: Mutex::new(()),
            cv: Condvar::new(),
        });
        let workers = (0..threads)
            .map(|i| {
                let inner = Arc::clone(&inner);
                thread::Builder::new()
                    .name(format!("promissory-pool-{i}"))
                    .spawn(move || inner.worker_loop())
                    .expect("failed to spawn pool worker")
            })
            .collect();
        Arc::new(Self {
            inner,
            workers: Mutex::new(workers),
        })
    }

    /// Requests shutdown and joins all workers.
    ///
    /// Queued tasks that have not started are dropped.
    pub fn join(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.cv.notify_all();
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl PoolInner {
    fn worker_loop(&self) {
        loop {
            if let Some(task) = self.queue.pop() {
                task();
                continue;
            }
            if self.shutdown.load(Ordering::SeqCst) {
                return;
            }
            let mut guard = self.mutex.lock();
            // Re-check under the lock so a task pushed between the pop and
            // the park is not missed past the notify.
            if self.queue.is_empty() && !self.shutdown.load(Ordering::SeqCst) {
                self.cv.wait_for(&mut guard, IDLE_PARK);
            }
        }
    }
}

impl Executor for ThreadPoolExecutor {
    fn add(&self, task: Task) {
        self.inner.queue.push(task);
        self.inner.cv.notify_one();
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        self.join();
    }
}

impl std::fmt::Debug for ThreadPoolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPoolExecutor")
            .field("workers", &self.workers.lock().len())
            .field("pending", &self.inner.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::Baton;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn runs_tasks_off_the_calling_thread() {
        let pool = ThreadPoolExecutor::new(2);
        let caller = thread::current().id();
        let baton = Arc::new(Baton::new());
        let b = Arc::clone(&baton);
        pool.add(Box::new(move || {
            assert_ne!(thread::current().id(), caller);
            b.post();
        }));
        assert!(baton.wait_for(Duration::from_secs(5)));
    }

    #[test]
    fn runs_many_tasks() {
        let pool = ThreadPoolExecutor::new(4);
        let count = Arc::new(AtomicUsize::new(0));
        let baton = Arc::new(Baton::new());
        for _ in 0..100 {
            let count = Arc::clone(&count);
            let baton = Arc::clone(&baton);
            pool.add(Box::new(move || {
                if count.fetch_add(1, Ordering::SeqCst) == 99 {
                    baton.post();
                }
            }));
        }
        assert!(baton.wait_for(Duration::from_secs(5)));
        assert_eq!(count.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn join_stops_workers() {
        let pool = ThreadPoolExecutor::new(2);
        pool.join();
    }
}
