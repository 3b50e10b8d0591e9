//! Combinators that compose many futures into one.
//!
//! Each aggregator owns a reference-counted shared context from inside the
//! input callbacks; the caller never has to keep the inputs alive. Contexts
//! that fulfil "when everything has reported" do so from their destructor,
//! which runs when the last input callback lets go.
//!
//! - [`collect_all`] / [`collect_all2`]: gather every `Try`, never fails.
//! - [`collect`]: gather values; the first error wins.
//! - [`collect_any`]: first completion wins.
//! - [`collect_any_without_error`]: first success wins; all-errors yields the
//!   last error.
//! - [`collect_n`]: the first `n` completions.
//! - [`reduce`] / [`unordered_reduce`]: sequential and completion-order
//!   folds.
//! - [`window`] / [`window_on`]: bounded-parallelism mapping.
//! - [`while_do`] / [`times`] / [`when`] / [`map`]: control-flow helpers.

mod collect;
mod reduce;
mod repeat;
mod window;

pub use collect::{
    collect, collect_all, collect_all2, collect_any, collect_any_without_error, collect_n,
};
pub use reduce::{reduce, unordered_reduce};
pub use repeat::{map, times, when, while_do};
pub use window::{window, window_on};
