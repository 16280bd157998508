//! batchkit-core — coalesce many single-key calls into fewer bulk calls.
//!
//! # Overview
//!
//! The core crate defines:
//!
//! - [`Batcher`] — debounced, optionally parallel, size-capped batch scheduler
//! - [`Series`] — strictly sequential one-unit-at-a-time scheduler
//! - [`BatchFn`] / [`UnitFn`] — the contracts the schedulers drive
//! - [`BatcherConfig`] — `delay`, `parallel` and `limit` options
//! - [`Scheduler`] — timer/spawn port, with [`TokioScheduler`] for
//!   production and [`ManualScheduler`] for virtual-time tests
//! - [`OrderedQueue`] — the double-ended queue holding pending batches
//! - [`BatchError`] — errors fanned out to callers

pub mod batch_fn;
pub mod batcher;
pub mod config;
pub mod error;
pub mod queue;
pub mod scheduler;
pub mod series;
pub mod waiter;

pub use batch_fn::{sync_batch_fn, sync_unit_fn, BatchFn, UnitFn};
pub use batcher::{Batcher, BatcherStats};
pub use config::BatcherConfig;
pub use error::{BatchError, BoxError, QueueError};
pub use queue::OrderedQueue;
pub use scheduler::{ManualScheduler, Scheduler, Task, TokioScheduler};
pub use series::Series;
pub use waiter::{Pending, Waiter};
