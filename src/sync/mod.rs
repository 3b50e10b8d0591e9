//! Synchronous primitives used by the blocking bridge.

mod baton;

pub use baton::Baton;
