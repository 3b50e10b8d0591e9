//! Bounded-parallelism mapping over a collection.

use crate::executor::{Executor, QueuedImmediateExecutor};
use crate::future::{Completable, Future, SemiFuture};
use crate::promise::Promise;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct WindowContext<In, R: Send + 'static, F> {
    executor: Arc<dyn Executor>,
    input: Mutex<Vec<Option<In>>>,
    promises: Vec<Mutex<Option<Promise<R>>>>,
    func: F,
    index: AtomicUsize,
}

impl<In, R, F> WindowContext<In, R, F>
where
    In: Send + 'static,
    R: Send + 'static,
    F: Fn(In) -> Future<R> + Send + Sync + 'static,
{
    /// Claims the next input index, maps it, and re-enters itself when the
    /// mapped future completes. The atomic index is the only coordination
    /// between the `n` concurrent spawn chains.
    fn spawn(ctx: Arc<Self>) {
        let i = ctx.index.fetch_add(1, Ordering::Relaxed);
        if i >= ctx.promises.len() {
            return;
        }
        let Some(item) = ctx.input.lock()[i].take() else {
            return;
        };
        let fut = (ctx.func)(item);
        let done = Arc::clone(&ctx);
        fut.on_complete(move |t| {
            let executor = Arc::clone(&done.executor);
            executor.add(Box::new(move || {
                if let Some(mut p) = done.promises[i].lock().take() {
                    let _ = p.set_try(t);
                }
                Self::spawn(done);
            }));
        });
    }
}

/// Maps `func` over `input` with at most `n` mapped futures in flight,
/// spawning replacements on the queued-immediate executor.
pub fn window<In, R, F>(input: Vec<In>, func: F, n: usize) -> Vec<Future<R>>
where
    In: Send + 'static,
    R: Send + 'static,
    F: Fn(In) -> Future<R> + Send + Sync + 'static,
{
    let executor: Arc<dyn Executor> = QueuedImmediateExecutor::instance();
    window_on(executor, input, func, n)
}

/// [`window`] with an explicit executor for the spawn chains.
///
/// The result futures come back immediately, in input order, each bound to
/// `executor`.
pub fn window_on<In, R, F>(
    executor: Arc<dyn Executor>,
    input: Vec<In>,
    func: F,
    n: usize,
) -> Vec<Future<R>>
where
    In: Send + 'static,
    R: Send + 'static,
    F: Fn(In) -> Future<R> + Send + Sync + 'static,
{
    let len = input.len();
    let mut promises = Vec::with_capacity(len);
    let mut outputs: Vec<SemiFuture<R>> = Vec::with_capacity(len);
    for _ in 0..len {
        let (p, sf) = Promise::pair();
        outputs.push(sf);
        promises.push(Mutex::new(Some(p)));
    }

    let ctx = Arc::new(WindowContext {
        executor: Arc::clone(&executor),
        input: Mutex::new(input.into_iter().map(Some).collect()),
        promises,
        func,
        index: AtomicUsize::new(0),
    });

    for _ in 0..n.min(len) {
        let seed = Arc::clone(&ctx);
        ctx.executor
            .add(Box::new(move || WindowContext::spawn(seed)));
    }

    outputs
        .into_iter()
        .map(|sf| sf.via(Arc::clone(&executor)))
        .collect()
}
