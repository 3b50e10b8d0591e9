//! Executor that drains a thread-local FIFO on the calling thread.

use super::{Executor, Task};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};

thread_local! {
    static QUEUE: RefCell<VecDeque<Task>> = RefCell::new(VecDeque::new());
    static DRAINING: Cell<bool> = const { Cell::new(false) };
}

/// Runs tasks on the calling thread through a per-thread FIFO.
///
/// Unlike [`InlineExecutor`](super::InlineExecutor), a task added while
/// another task is running is queued behind it instead of nesting on the
/// stack. `window` uses this as its default executor so long respawn chains
/// cannot overflow the stack.
#[derive(Debug, Default)]
pub struct QueuedImmediateExecutor;

impl QueuedImmediateExecutor {
    /// Returns the process-wide instance.
    #[must_use]
    pub fn instance() -> Arc<QueuedImmediateExecutor> {
        static INSTANCE: OnceLock<Arc<QueuedImmediateExecutor>> = OnceLock::new();
        Arc::clone(INSTANCE.get_or_init(|| Arc::new(QueuedImmediateExecutor)))
    }
}

impl Executor for QueuedImmediateExecutor {
    fn add(&self, task: Task) {
        QUEUE.with(|q| q.borrow_mut().push_back(task));
        if DRAINING.get() {
            // A task further up this thread's stack owns the drain loop.
            return;
        }
        DRAINING.set(true);
        loop {
            let next = QUEUE.with(|q| q.borrow_mut().pop_front());
            match next {
                Some(task) => task(),
                None => break,
            }
        }
        DRAINING.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn nested_adds_run_in_fifo_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let exec = QueuedImmediateExecutor::instance();

        let o1 = Arc::clone(&order);
        let inner_exec = Arc::clone(&exec);
        exec.add(Box::new(move || {
            o1.lock().unwrap().push(1);
            let o2 = Arc::clone(&o1);
            inner_exec.add(Box::new(move || {
                o2.lock().unwrap().push(3);
            }));
            o1.lock().unwrap().push(2);
        }));

        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn nested_adds_do_not_deepen_the_stack() {
        // A self-scheduling chain of this length would overflow the stack if
        // each add recursed; through the queue it is a flat loop.
        let count = Arc::new(AtomicUsize::new(0));
        let exec = QueuedImmediateExecutor::instance();

        fn spawn(count: Arc<AtomicUsize>, exec: Arc<QueuedImmediateExecutor>) {
            if count.fetch_add(1, Ordering::SeqCst) < 100_000 {
                let e = Arc::clone(&exec);
                exec.add(Box::new(move || spawn(count, e)));
            }
        }

        spawn(Arc::clone(&count), exec);
        assert!(count.load(Ordering::SeqCst) > 100_000);
    }
}
