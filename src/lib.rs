//! Multiway CPU worker pool for Cryptonight-family proof-of-work mining.
//!
//! The pool owns long-lived worker threads that hash the current work item
//! with a kernel of width 1, 2, 4, 5 or 6 nonces per invocation, compare
//! each digest against the job's difficulty target, and emit solutions to
//! the executor's event channel. New jobs are published by value through
//! [`WorkerPool::switch_work`]; a monotonic generation counter tells every
//! worker to abandon the old job at its next iteration.
//!
//! The Cryptonight kernels themselves are external: embedders supply a
//! [`KernelSet`] satisfying the [`CnHashFn`] contract, and the pool
//! verifies it against known-answer vectors before any worker spawns.

mod affinity;
mod config;
mod job;
mod kernel;
mod log;
mod pool;
mod scratchpad;
mod selftest;
mod telemetry;
mod worker;

pub use config::{CpuConfig, ThreadConfig};
pub use job::{digest_comparand, JobId, MinerEvent, Solution, WorkItem};
pub use kernel::{CnHashFn, KernelSet, Multiway};
pub use pool::{PoolHashrate, WorkerPool};
pub use scratchpad::{scratchpad_init, CnContext, SlowMemory};
pub use selftest::self_test;
pub use telemetry::Telemetry;
