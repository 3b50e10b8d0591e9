//! Executor that runs tasks on the caller's stack.

use super::{Executor, Task};
use std::sync::{Arc, OnceLock};

/// Runs each task immediately on the thread that adds it.
///
/// This is the explicit opt-in for running continuations on the fulfilling
/// thread; everything else in the library treats it as the fallback of last
/// resort.
#[derive(Debug, Default)]
pub struct InlineExecutor;

impl InlineExecutor {
    /// Returns the process-wide instance.
    #[must_use]
    pub fn instance() -> Arc<InlineExecutor> {
        static INSTANCE: OnceLock<Arc<InlineExecutor>> = OnceLock::new();
        Arc::clone(INSTANCE.get_or_init(|| Arc::new(InlineExecutor)))
    }
}

impl Executor for InlineExecutor {
    fn add(&self, task: Task) {
        task();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn runs_on_calling_thread() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let caller = std::thread::current().id();
        InlineExecutor::instance().add(Box::new(move || {
            assert_eq!(std::thread::current().id(), caller);
            flag.store(true, Ordering::SeqCst);
        }));
        assert!(ran.load(Ordering::SeqCst));
    }
}
