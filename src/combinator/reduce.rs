//! Sequential and completion-order folds over collections of futures.

use super::collect_all2;
use crate::future::{make_future, Completable, Future};
use crate::promise::Promise;
use crate::try_value::Try;
use parking_lot::Mutex;
use std::sync::Arc;

/// Folds the inputs left to right: each step waits for the accumulator and
/// the next input, then applies `func`. The first error short-circuits the
/// rest of the fold.
pub fn reduce<T, It, I, F>(futures: I, initial: T, func: F) -> Future<T>
where
    T: Send + 'static,
    It: Send + 'static,
    I: IntoIterator,
    I::Item: Completable<It>,
    F: Fn(T, It) -> T + Send + Sync + 'static,
{
    let mut iter = futures.into_iter();
    let Some(first) = iter.next() else {
        return make_future(initial);
    };
    let func = Arc::new(func);

    let (mut p, sf) = Promise::pair();
    {
        let func = Arc::clone(&func);
        first.on_complete(move |t| match t.into_result() {
            Ok(v) => {
                let _ = p.set_value(func(initial, v));
            }
            Err(e) => {
                let _ = p.set_error(e);
            }
        });
    }
    let mut acc = sf.into_unsafe_future();

    for next in iter {
        let (mut p, sf) = Promise::pair();
        let func = Arc::clone(&func);
        collect_all2(acc, next).on_complete(move |pair| match pair.into_result() {
            Ok((ta, tb)) => match (ta.into_result(), tb.into_result()) {
                (Ok(a), Ok(b)) => {
                    let _ = p.set_value(func(a, b));
                }
                (Err(e), _) | (_, Err(e)) => {
                    let _ = p.set_error(e);
                }
            },
            Err(e) => {
                let _ = p.set_error(e);
            }
        });
        acc = sf.into_unsafe_future();
    }
    acc
}

/// Folds the inputs in completion order.
///
/// Each completer swaps the shared memo future for a fresh pending one and
/// chains its reduction onto the old memo, so reductions are linearized in
/// the order inputs finish without ever blocking a completer. The lock below
/// covers only the memo swap, never `func`. Requires `func` to be
/// commutative and associative for a deterministic value.
pub fn unordered_reduce<T, It, I, F>(futures: I, initial: T, func: F) -> Future<T>
where
    T: Send + 'static,
    It: Send + 'static,
    I: IntoIterator,
    I::Item: Completable<It>,
    F: Fn(T, It) -> T + Send + Sync + 'static,
{
    struct MemoState<T: Send + 'static> {
        memo: Option<Future<T>>,
        num_thens: usize,
    }

    struct ReduceContext<T: Send + 'static, F> {
        memo: Mutex<MemoState<T>>,
        func: F,
        num_futures: usize,
        promise: Mutex<Option<Promise<T>>>,
    }

    let futures: Vec<_> = futures.into_iter().collect();
    if futures.is_empty() {
        return make_future(initial);
    }
    let num_futures = futures.len();

    let mut promise = Promise::new();
    let out = promise.semi().into_unsafe_future();
    let ctx = Arc::new(ReduceContext {
        memo: Mutex::new(MemoState {
            memo: Some(make_future(initial)),
            num_thens: 0,
        }),
        func,
        num_futures,
        promise: Mutex::new(Some(promise)),
    });

    for f in futures {
        let ctx = Arc::clone(&ctx);
        f.on_complete(move |t: Try<It>| {
            let (mut p, sf) = Promise::pair();
            let replacement = sf.into_unsafe_future();

            let (old, final_memo) = {
                let mut st = ctx.memo.lock();
                let old = st.memo.replace(replacement);
                st.num_thens += 1;
                let fin = if st.num_thens == ctx.num_futures {
                    st.memo.take()
                } else {
                    None
                };
                (old, fin)
            };

            if let Some(fin) = final_memo {
                // The last completer arms the forwarding of the newest
                // pending memo into the aggregate promise.
                let forward = Arc::clone(&ctx);
                fin.on_complete(move |t2| {
                    if let Some(mut p) = forward.promise.lock().take() {
                        let _ = p.set_try(t2);
                    }
                });
            }

            let Some(old) = old else {
                return;
            };
            let reducer = Arc::clone(&ctx);
            old.on_complete(move |acc: Try<T>| match acc.into_result() {
                Ok(a) => match t.into_result() {
                    Ok(item) => {
                        let _ = p.set_value((reducer.func)(a, item));
                    }
                    Err(e) => {
                        let _ = p.set_error(e);
                    }
                },
                Err(e) => {
                    let _ = p.set_error(e);
                }
            });
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ErrorKind};
    use crate::future::make_future_error;

    fn ready(values: &[i64]) -> Vec<Future<i64>> {
        values.iter().copied().map(make_future).collect()
    }

    #[test]
    fn reduce_folds_in_input_order() {
        let out = reduce(ready(&[1, 2, 3, 4, 5]), 0_i64, |acc, v| acc + v);
        assert_eq!(out.get().expect("sum"), 15);
    }

    #[test]
    fn reduce_of_nothing_is_the_initial_value() {
        let out = reduce(Vec::<Future<i64>>::new(), 42_i64, |acc, v| acc + v);
        assert_eq!(out.get().expect("initial"), 42);
    }

    #[test]
    fn reduce_short_circuits_on_error() {
        let out = reduce(
            vec![
                make_future(1_i64),
                make_future_error(Error::user("mid")),
                make_future(3_i64),
            ],
            0_i64,
            |acc, v| acc + v,
        );
        assert_eq!(out.get().expect_err("error wins").kind(), ErrorKind::User);
    }

    #[test]
    fn unordered_reduce_matches_ordered_for_commutative_ops() {
        let out = unordered_reduce(ready(&[1, 2, 3, 4, 5]), 0_i64, |acc, v| acc + v);
        assert_eq!(out.get().expect("sum"), 15);
    }

    #[test]
    fn unordered_reduce_handles_out_of_order_completion() {
        let mut promises = Vec::new();
        let mut semis = Vec::new();
        for _ in 0..4 {
            let (p, sf) = Promise::<i64>::pair();
            promises.push(p);
            semis.push(sf);
        }
        let out = unordered_reduce(semis, 0_i64, |acc, v| acc + v);

        // Complete in reverse registration order.
        for (i, p) in promises.iter_mut().enumerate().rev() {
            p.set_value(i as i64 + 1).expect("set");
        }
        assert_eq!(out.get().expect("sum"), 10);
    }

    #[test]
    fn unordered_reduce_propagates_errors() {
        let out = unordered_reduce(
            vec![
                make_future(1_i64),
                make_future_error(Error::user("boom")),
            ],
            0_i64,
            |acc, v| acc + v,
        );
        assert_eq!(out.get().expect_err("error wins").kind(), ErrorKind::User);
    }
}
