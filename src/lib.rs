//! Pull-based sequences fed by concurrent producers and worker pools.
//!
//! - [`sequence`]: the `advance` / `current` / `error` contract, consumers
//!   and synchronous combinators.
//! - [`bridge`]: merge many producer threads into one sequence.
//! - [`pool`]: run a transform over a sequence on `n` worker threads.
//! - [`utils::CancelToken`]: one-shot, hierarchical cancellation shared by
//!   both.

pub mod bridge;
pub mod config;
pub mod error;
pub mod io;
pub mod outcome;
pub mod pool;
pub mod prelude;
pub mod sequence;
pub mod utils;
