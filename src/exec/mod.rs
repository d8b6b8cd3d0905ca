//! Bounded background execution.
//!
//! LLM calls run off the caller's thread on a small fixed-width pool so
//! a slow backend can never saturate the host.

pub mod pool;

pub use pool::{PoolError, WORKER_SLOTS, WorkerPool};
