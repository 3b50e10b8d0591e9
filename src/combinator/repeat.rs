//! Control-flow helpers: conditional, looped, and element-wise chaining.

use crate::future::{make_future, Future};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Runs `thunk` if `condition` holds, else completes immediately.
pub fn when<F>(condition: bool, thunk: F) -> Future<()>
where
    F: FnOnce() -> Future<()> + Send + 'static,
{
    if condition {
        thunk()
    } else {
        make_future(())
    }
}

/// Repeats `thunk` while `predicate` holds, rescheduling through the chain
/// itself (tail-recursive composition, no blocking).
pub fn while_do<P, F>(predicate: P, thunk: F) -> Future<()>
where
    P: Fn() -> bool + Send + Sync + 'static,
    F: Fn() -> Future<()> + Send + Sync + 'static,
{
    while_do_inner(Arc::new(predicate), Arc::new(thunk))
}

fn while_do_inner(
    predicate: Arc<dyn Fn() -> bool + Send + Sync>,
    thunk: Arc<dyn Fn() -> Future<()> + Send + Sync>,
) -> Future<()> {
    if predicate() {
        let fut = thunk();
        fut.then_future(move |()| while_do_inner(predicate, thunk))
    } else {
        make_future(())
    }
}

/// Runs `thunk` `n` times in sequence.
pub fn times<F>(n: usize, thunk: F) -> Future<()>
where
    F: Fn() -> Future<()> + Send + Sync + 'static,
{
    let count = Arc::new(AtomicUsize::new(0));
    while_do(move || count.fetch_add(1, Ordering::AcqRel) < n, thunk)
}

/// Chains `func` onto every future, returning the mapped futures in order.
pub fn map<T, R, I, F>(futures: I, func: F) -> Vec<Future<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    I: IntoIterator<Item = Future<T>>,
    F: Fn(T) -> R + Send + Sync + 'static,
{
    let func = Arc::new(func);
    futures
        .into_iter()
        .map(|f| {
            let func = Arc::clone(&func);
            f.then_value(move |v| func(v))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinator::collect;

    #[test]
    fn when_false_is_immediate() {
        assert!(when(false, || make_future(())).is_ready());
    }

    #[test]
    fn while_do_runs_until_predicate_fails() {
        let runs = Arc::new(AtomicUsize::new(0));
        let limit = Arc::new(AtomicUsize::new(0));

        let r = Arc::clone(&runs);
        let l = Arc::clone(&limit);
        let out = while_do(
            move || l.fetch_add(1, Ordering::AcqRel) < 5,
            move || {
                r.fetch_add(1, Ordering::AcqRel);
                make_future(())
            },
        );
        out.get().expect("loop finished");
        assert_eq!(runs.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn times_runs_exactly_n() {
        let runs = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&runs);
        times(3, move || {
            r.fetch_add(1, Ordering::AcqRel);
            make_future(())
        })
        .get()
        .expect("loop finished");
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn map_chains_each_future() {
        let outs = map(vec![make_future(1), make_future(2)], |v| v * 2);
        assert_eq!(collect(outs).get().expect("mapped"), vec![2, 4]);
    }
}
