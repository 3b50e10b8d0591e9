//! Fan-in aggregators over collections of futures.

use crate::error::{Error, ErrorKind};
use crate::executor::InlineExecutor;
use crate::future::{make_semi_future_error, Completable, Future, SemiFuture};
use crate::promise::Promise;
use crate::try_value::Try;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Completes with every input's `Try`, in input order, once all inputs have
/// completed. Never fails itself.
pub fn collect_all<T, I>(futures: I) -> SemiFuture<Vec<Try<T>>>
where
    T: Send + 'static,
    I: IntoIterator,
    I::Item: Completable<T>,
{
    struct CollectAllContext<T: Send + 'static> {
        promise: Mutex<Option<Promise<Vec<Try<T>>>>>,
        results: Mutex<Vec<Option<Try<T>>>>,
    }

    impl<T: Send + 'static> Drop for CollectAllContext<T> {
        fn drop(&mut self) {
            let results = std::mem::take(self.results.get_mut());
            let collected: Vec<Try<T>> = results
                .into_iter()
                .map(|slot| slot.unwrap_or_else(|| Try::err(Error::new(ErrorKind::BrokenPromise))))
                .collect();
            if let Some(mut p) = self.promise.get_mut().take() {
                let _ = p.set_value(collected);
            }
        }
    }

    let futures: Vec<_> = futures.into_iter().collect();
    let n = futures.len();
    let mut promise = Promise::new();
    let out = promise.semi();
    let ctx = Arc::new(CollectAllContext {
        promise: Mutex::new(Some(promise)),
        results: Mutex::new((0..n).map(|_| None).collect()),
    });
    for (i, f) in futures.into_iter().enumerate() {
        let ctx = Arc::clone(&ctx);
        f.on_complete(move |t| {
            ctx.results.lock()[i] = Some(t);
        });
    }
    out
}

/// Completes with the pair of `Try`s once both inputs have completed.
pub fn collect_all2<A, B, CA, CB>(a: CA, b: CB) -> SemiFuture<(Try<A>, Try<B>)>
where
    A: Send + 'static,
    B: Send + 'static,
    CA: Completable<A>,
    CB: Completable<B>,
{
    struct PairContext<A: Send + 'static, B: Send + 'static> {
        promise: Mutex<Option<Promise<(Try<A>, Try<B>)>>>,
        left: Mutex<Option<Try<A>>>,
        right: Mutex<Option<Try<B>>>,
    }

    impl<A: Send + 'static, B: Send + 'static> Drop for PairContext<A, B> {
        fn drop(&mut self) {
            let left = self
                .left
                .get_mut()
                .take()
                .unwrap_or_else(|| Try::err(Error::new(ErrorKind::BrokenPromise)));
            let right = self
                .right
                .get_mut()
                .take()
                .unwrap_or_else(|| Try::err(Error::new(ErrorKind::BrokenPromise)));
            if let Some(mut p) = self.promise.get_mut().take() {
                let _ = p.set_value((left, right));
            }
        }
    }

    let mut promise = Promise::new();
    let out = promise.semi();
    let ctx = Arc::new(PairContext {
        promise: Mutex::new(Some(promise)),
        left: Mutex::new(None),
        right: Mutex::new(None),
    });
    let left = Arc::clone(&ctx);
    a.on_complete(move |t| {
        *left.left.lock() = Some(t);
    });
    let right = Arc::clone(&ctx);
    b.on_complete(move |t| {
        *right.right.lock() = Some(t);
    });
    out
}

/// Completes with every value in input order, or with the first error (by
/// completion order). Returns through the inline executor.
pub fn collect<T, I>(futures: I) -> Future<Vec<T>>
where
    T: Send + 'static,
    I: IntoIterator,
    I::Item: Completable<T>,
{
    struct CollectContext<T: Send + 'static> {
        promise: Mutex<Option<Promise<Vec<T>>>>,
        results: Mutex<Vec<Option<T>>>,
        threw: AtomicBool,
    }

    impl<T: Send + 'static> Drop for CollectContext<T> {
        fn drop(&mut self) {
            if !self.threw.swap(true, Ordering::AcqRel) {
                let results = std::mem::take(self.results.get_mut());
                let collected: Vec<T> = results.into_iter().flatten().collect();
                if let Some(mut p) = self.promise.get_mut().take() {
                    let _ = p.set_value(collected);
                }
            }
        }
    }

    let futures: Vec<_> = futures.into_iter().collect();
    let n = futures.len();
    let mut promise = Promise::new();
    let out = promise.semi();
    let ctx = Arc::new(CollectContext {
        promise: Mutex::new(Some(promise)),
        results: Mutex::new((0..n).map(|_| None).collect()),
        threw: AtomicBool::new(false),
    });
    for (i, f) in futures.into_iter().enumerate() {
        let ctx = Arc::clone(&ctx);
        f.on_complete(move |t| match t.into_result() {
            Ok(v) => {
                if !ctx.threw.load(Ordering::Acquire) {
                    ctx.results.lock()[i] = Some(v);
                }
            }
            Err(e) => {
                if !ctx.threw.swap(true, Ordering::AcqRel) {
                    if let Some(mut p) = ctx.promise.lock().take() {
                        let _ = p.set_error(e);
                    }
                }
            }
        });
    }
    out.via(InlineExecutor::instance())
}

/// Completes with `(index, Try)` of the first input to complete, success or
/// error. Returns through the inline executor.
pub fn collect_any<T, I>(futures: I) -> Future<(usize, Try<T>)>
where
    T: Send + 'static,
    I: IntoIterator,
    I::Item: Completable<T>,
{
    struct AnyContext<T: Send + 'static> {
        promise: Mutex<Option<Promise<(usize, Try<T>)>>>,
        done: AtomicBool,
    }

    let mut promise = Promise::new();
    let out = promise.semi();
    let ctx = Arc::new(AnyContext {
        promise: Mutex::new(Some(promise)),
        done: AtomicBool::new(false),
    });
    for (i, f) in futures.into_iter().enumerate() {
        let ctx = Arc::clone(&ctx);
        f.on_complete(move |t| {
            if !ctx.done.swap(true, Ordering::AcqRel) {
                if let Some(mut p) = ctx.promise.lock().take() {
                    let _ = p.set_value((i, t));
                }
            }
        });
    }
    out.via(InlineExecutor::instance())
}

/// Completes with `(index, value)` of the first input to succeed. If every
/// input errors, completes with the last error. Returns through the inline
/// executor.
pub fn collect_any_without_error<T, I>(futures: I) -> Future<(usize, T)>
where
    T: Send + 'static,
    I: IntoIterator,
    I::Item: Completable<T>,
{
    struct AnyValueContext<T: Send + 'static> {
        promise: Mutex<Option<Promise<(usize, T)>>>,
        done: AtomicBool,
        completed: AtomicUsize,
        total: usize,
    }

    let futures: Vec<_> = futures.into_iter().collect();
    let total = futures.len();
    let mut promise = Promise::new();
    let out = promise.semi();
    let ctx = Arc::new(AnyValueContext {
        promise: Mutex::new(Some(promise)),
        done: AtomicBool::new(false),
        completed: AtomicUsize::new(0),
        total,
    });
    for (i, f) in futures.into_iter().enumerate() {
        let ctx = Arc::clone(&ctx);
        f.on_complete(move |t| match t.into_result() {
            Ok(v) => {
                if !ctx.done.swap(true, Ordering::AcqRel) {
                    // The winner skips the completion count, so the
                    // all-errors path below can never reach the total.
                    if let Some(mut p) = ctx.promise.lock().take() {
                        let _ = p.set_value((i, v));
                    }
                } else {
                    ctx.completed.fetch_add(1, Ordering::AcqRel);
                }
            }
            Err(e) => {
                if ctx.completed.fetch_add(1, Ordering::AcqRel) + 1 == ctx.total {
                    if let Some(mut p) = ctx.promise.lock().take() {
                        let _ = p.set_error(e);
                    }
                }
            }
        });
    }
    out.via(InlineExecutor::instance())
}

/// Completes with the first `n` completions as `(index, Try)` pairs, indices
/// pairwise distinct.
///
/// The completed gate is relaxed (it guards control, not data); the stored
/// counter is acq_rel so every stored slot is visible to the emitter.
pub fn collect_n<T, I>(futures: I, n: usize) -> SemiFuture<Vec<(usize, Try<T>)>>
where
    T: Send + 'static,
    I: IntoIterator,
    I::Item: Completable<T>,
{
    struct CollectNContext<T: Send + 'static> {
        slots: Mutex<Vec<Option<Try<T>>>>,
        completed: AtomicUsize,
        stored: AtomicUsize,
        promise: Mutex<Option<Promise<Vec<(usize, Try<T>)>>>>,
        n: usize,
    }

    let futures: Vec<_> = futures.into_iter().collect();
    let total = futures.len();
    if n == 0 || total < n {
        return make_semi_future_error(
            Error::new(ErrorKind::NotEnoughFutures)
                .with_context(format!("need {n} completions, have {total} futures")),
        );
    }

    let mut promise = Promise::new();
    let out = promise.semi();
    let ctx = Arc::new(CollectNContext {
        slots: Mutex::new((0..total).map(|_| None).collect()),
        completed: AtomicUsize::new(0),
        stored: AtomicUsize::new(0),
        promise: Mutex::new(Some(promise)),
        n,
    });
    for (i, f) in futures.into_iter().enumerate() {
        let ctx = Arc::clone(&ctx);
        f.on_complete(move |t| {
            let c = 1 + ctx.completed.fetch_add(1, Ordering::Relaxed);
            if c > ctx.n {
                return;
            }
            ctx.slots.lock()[i] = Some(t);
            let s = 1 + ctx.stored.fetch_add(1, Ordering::AcqRel);
            if s < ctx.n {
                return;
            }
            let mut result = Vec::with_capacity(ctx.n);
            let mut slots = ctx.slots.lock();
            for (index, slot) in slots.iter_mut().enumerate() {
                if let Some(t) = slot.take() {
                    result.push((index, t));
                }
            }
            drop(slots);
            if let Some(mut p) = ctx.promise.lock().take() {
                let _ = p.set_value(result);
            }
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::{make_future, make_future_error};

    #[test]
    fn collect_all_preserves_input_order() {
        let out = collect_all(vec![make_future(1), make_future(2), make_future(3)]);
        let tries = out.get().expect("collected");
        let values: Vec<i32> = tries.into_iter().map(Try::unwrap).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn collect_all_carries_errors_per_slot() {
        let out = collect_all(vec![
            make_future(1),
            make_future_error(Error::user("mid")),
            make_future(3),
        ]);
        let tries = out.get().expect("collect_all itself never fails");
        assert!(tries[0].has_value());
        assert!(tries[1].has_error());
        assert!(tries[2].has_value());
    }

    #[test]
    fn collect_all_of_nothing_is_empty() {
        let out = collect_all(Vec::<Future<i32>>::new());
        assert!(out.get().expect("empty").is_empty());
    }

    #[test]
    fn collect_all2_pairs_heterogeneous_results() {
        let out = collect_all2(make_future(1), make_future("two"));
        let (a, b) = out.get().expect("pair");
        assert_eq!(a.unwrap(), 1);
        assert_eq!(b.unwrap(), "two");
    }

    #[test]
    fn collect_yields_values_or_first_error() {
        let out = collect(vec![make_future(1), make_future(2)]);
        assert_eq!(out.get().expect("values"), vec![1, 2]);

        let out = collect(vec![
            make_future(1),
            make_future_error(Error::user("boom")),
        ]);
        assert_eq!(out.get().expect_err("first error").kind(), ErrorKind::User);
    }

    #[test]
    fn collect_any_reports_the_first_completion() {
        let (_p, pending) = Promise::<i32>::pair();
        let out = collect_any(vec![pending.into_unsafe_future(), make_future(9)]);
        let (index, t) = out.get().expect("winner");
        assert_eq!(index, 1);
        assert_eq!(t.unwrap(), 9);
    }

    #[test]
    fn collect_any_without_error_skips_errors() {
        let out = collect_any_without_error(vec![
            make_future_error(Error::user("nope")),
            make_future(7),
        ]);
        let (index, v) = out.get().expect("first success");
        assert_eq!(index, 1);
        assert_eq!(v, 7);
    }

    #[test]
    fn collect_any_without_error_yields_last_error_when_all_fail() {
        let out = collect_any_without_error(vec![
            make_future_error::<i32>(Error::new(ErrorKind::Timeout)),
            make_future_error::<i32>(Error::user("last")),
        ]);
        let err = out.get().expect_err("all failed");
        assert_eq!(err.kind(), ErrorKind::User);
    }

    #[test]
    fn collect_n_takes_the_first_n() {
        let (_p, pending) = Promise::<i32>::pair();
        let out = collect_n(
            vec![make_future(1), pending.into_unsafe_future(), make_future(3)],
            2,
        );
        let pairs = out.get().expect("two done");
        assert_eq!(pairs.len(), 2);
        let indices: Vec<usize> = pairs.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn collect_n_rejects_short_input() {
        let out = collect_n(vec![make_future(1)], 2);
        assert_eq!(
            out.get().expect_err("short input").kind(),
            ErrorKind::NotEnoughFutures
        );
    }
}
