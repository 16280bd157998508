//! Batch scheduler: coalesce single-key calls into bulk invocations.
//!
//! Each [`Batcher::call`] registers a waiter in the open (tail) batch of a
//! FIFO of pending batches and asks the scheduler to re-evaluate after
//! `delay`. When the evaluation finds the scheduler idle (or `parallel` is
//! set) it detaches the front batch, invokes the batch function once with
//! the batch's distinct keys, and fans the results back out.
//!
//! ```text
//! call(k) ──► [tail batch] ─ recheck(delay) ─► check ─► batch_fn(keys)
//!                                               ▲            │
//!                                               └─ recheck ◄─┘ fan-out
//! ```

use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::batch_fn::BatchFn;
use crate::config::BatcherConfig;
use crate::error::BatchError;
use crate::queue::OrderedQueue;
use crate::scheduler::{lock, Scheduler, TokioScheduler};
use crate::waiter::{Pending, Waiter};

/// Keys waiting for the same bulk invocation, in first-seen order.
struct PendingBatch<K, R> {
    entries: IndexMap<K, Vec<Waiter<R>>>,
    calls: usize,
}

impl<K: Hash + Eq, R> PendingBatch<K, R> {
    fn new() -> Self {
        Self {
            entries: IndexMap::new(),
            calls: 0,
        }
    }

    /// Distinct keys.
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `key` can join without pushing the batch past `limit`.
    fn accepts(&self, key: &K, limit: usize) -> bool {
        self.entries.len() < limit || self.entries.contains_key(key)
    }

    fn register(&mut self, key: K, waiter: Waiter<R>) {
        self.entries.entry(key).or_default().push(waiter);
        self.calls += 1;
    }

    /// Split into the key list for the batch function and the positionally
    /// matching waiter groups.
    fn into_parts(self) -> (Vec<K>, Vec<Vec<Waiter<R>>>) {
        self.entries.into_iter().unzip()
    }
}

struct SchedulerState<K, R> {
    queue: OrderedQueue<PendingBatch<K, R>>,
    in_flight: usize,
}

struct Shared<K, R> {
    batch_fn: Arc<dyn BatchFn<K, R>>,
    config: BatcherConfig,
    scheduler: Arc<dyn Scheduler>,
    state: Mutex<SchedulerState<K, R>>,
    call_count: AtomicU64,
}

/// Point-in-time view of a batcher's scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatcherStats {
    /// Invocations of the batch function so far.
    pub call_count: u64,
    /// Batches currently inside the batch function.
    pub in_flight: usize,
    /// Batches waiting for dispatch (including the open one).
    pub queued_batches: usize,
    /// Caller-facing calls waiting in those batches.
    pub queued_calls: usize,
}

/// Coalescing front-end for a [`BatchFn`].
///
/// Cloning is cheap; clones share one queue, one in-flight counter and one
/// call counter.
///
/// # Example
/// ```rust,no_run
/// use batchkit_core::Batcher;
/// use std::convert::Infallible;
///
/// # async fn demo() {
/// let batcher: Batcher<u32, u32> = Batcher::new(|keys: Vec<u32>| async move {
///     Ok::<_, Infallible>(keys.into_iter().map(|k| k + 1).collect::<Vec<_>>())
/// });
/// let (a, b) = futures::join!(batcher.call(1), batcher.call(2));
/// assert_eq!((a.unwrap(), b.unwrap()), (2, 3));
/// assert_eq!(batcher.call_count(), 1);
/// # }
/// ```
pub struct Batcher<K, R> {
    shared: Arc<Shared<K, R>>,
}

impl<K, R> Clone for Batcher<K, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, R> Batcher<K, R>
where
    K: Hash + Eq + Send + 'static,
    R: Clone + Send + 'static,
{
    /// Batcher with the default configuration on the Tokio scheduler.
    ///
    /// Calls made back to back coalesce only on a current-thread runtime;
    /// see [`TokioScheduler`] for the multi-thread case.
    pub fn new(batch_fn: impl BatchFn<K, R>) -> Self {
        Self::build(
            Arc::new(batch_fn),
            BatcherConfig::default(),
            Arc::new(TokioScheduler),
        )
    }

    /// Batcher with a validated configuration on the Tokio scheduler.
    ///
    /// Same runtime requirement as [`Batcher::new`].
    pub fn with_config(
        batch_fn: impl BatchFn<K, R>,
        config: BatcherConfig,
    ) -> Result<Self, BatchError> {
        Self::with_scheduler(batch_fn, config, Arc::new(TokioScheduler))
    }

    /// Batcher driven by an explicit scheduling port.
    pub fn with_scheduler(
        batch_fn: impl BatchFn<K, R>,
        config: BatcherConfig,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Self, BatchError> {
        config.validate()?;
        Ok(Self::build(Arc::new(batch_fn), config, scheduler))
    }

    fn build(
        batch_fn: Arc<dyn BatchFn<K, R>>,
        config: BatcherConfig,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                batch_fn,
                config,
                scheduler,
                state: Mutex::new(SchedulerState {
                    queue: OrderedQueue::new(),
                    in_flight: 0,
                }),
                call_count: AtomicU64::new(0),
            }),
        }
    }

    /// Submit one key. The key joins the open batch immediately; the
    /// returned future resolves once that batch has been processed.
    pub fn call(&self, key: K) -> Pending<R> {
        let (waiter, pending) = Waiter::channel();
        self.shared.enqueue(key, waiter);
        self.shared.recheck();
        pending
    }

    /// Number of times the batch function has been invoked.
    pub fn call_count(&self) -> u64 {
        self.shared.call_count.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &BatcherConfig {
        &self.shared.config
    }

    pub fn stats(&self) -> BatcherStats {
        let state = lock(&self.shared.state);
        BatcherStats {
            call_count: self.call_count(),
            in_flight: state.in_flight,
            queued_batches: state.queue.len(),
            queued_calls: state.queue.iter().map(|b| b.calls).sum(),
        }
    }
}

impl<K, R> Shared<K, R>
where
    K: Hash + Eq + Send + 'static,
    R: Clone + Send + 'static,
{
    fn enqueue(&self, key: K, waiter: Waiter<R>) {
        let limit = self.config.max_keys();
        let mut state = lock(&self.state);

        match state.queue.back_mut() {
            Ok(tail) if tail.accepts(&key, limit) => {
                tail.register(key, waiter);
                trace!(batches = state.queue.len(), "call joined open batch");
                return;
            }
            _ => {}
        }

        let mut batch = PendingBatch::new();
        batch.register(key, waiter);
        state.queue.push_back(batch);
        trace!(batches = state.queue.len(), "call opened new batch");
    }

    fn recheck(self: &Arc<Self>) {
        let this = Arc::clone(self);
        self.scheduler
            .schedule(self.config.delay_duration(), Box::new(move || this.check()));
    }

    /// Dispatch every batch that is currently eligible.
    fn check(self: &Arc<Self>) {
        loop {
            let (call, batch) = {
                let mut state = lock(&self.state);
                if state.in_flight > 0 && !self.config.parallel {
                    return;
                }
                if !state.queue.front().map_or(false, |b| !b.is_empty()) {
                    return;
                }
                let Ok(batch) = state.queue.pop_front() else {
                    return;
                };
                state.in_flight += 1;
                let call = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
                (call, batch)
            };

            let this = Arc::clone(self);
            self.scheduler
                .spawn(Box::pin(async move { this.dispatch(call, batch).await }));
        }
    }

    async fn dispatch(self: Arc<Self>, call: u64, batch: PendingBatch<K, R>) {
        let callers = batch.calls;
        let expected = batch.len();
        let (keys, waiters) = batch.into_parts();
        debug!(call, keys = expected, callers, "dispatching batch");

        let outcome = AssertUnwindSafe(self.batch_fn.call_batch(keys))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(BatchError::from_panic(payload)))
            .and_then(|results| {
                if results.len() == expected {
                    Ok(results)
                } else {
                    Err(BatchError::ContractViolation {
                        expected,
                        actual: results.len(),
                    })
                }
            });

        if let Err(e) = &outcome {
            warn!(call, keys = expected, callers, error = %e, "batch failed");
        }
        fan_out(waiters, outcome);

        lock(&self.state).in_flight -= 1;
        self.recheck();
    }
}

/// Deliver one outcome to every waiter of a batch, each exactly once.
fn fan_out<R: Clone>(waiters: Vec<Vec<Waiter<R>>>, outcome: Result<Vec<R>, BatchError>) {
    match outcome {
        Ok(results) => {
            for (group, result) in waiters.into_iter().zip(results) {
                for waiter in group.into_iter().filter(|w| !w.is_abandoned()) {
                    waiter.resolve(result.clone());
                }
            }
        }
        Err(err) => {
            for waiter in waiters.into_iter().flatten().filter(|w| !w.is_abandoned()) {
                waiter.reject(err.clone());
            }
        }
    }
}

impl<K, R> std::fmt::Debug for Batcher<K, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batcher")
            .field("config", &self.shared.config)
            .field("call_count", &self.shared.call_count.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;
    use std::convert::Infallible;

    fn identity(keys: Vec<&'static str>) -> std::future::Ready<Result<Vec<&'static str>, Infallible>> {
        std::future::ready(Ok(keys))
    }

    fn manual(config: BatcherConfig) -> (Batcher<&'static str, &'static str>, Arc<ManualScheduler>) {
        let scheduler = Arc::new(ManualScheduler::new());
        let batcher = Batcher::with_scheduler(identity, config, scheduler.clone()).unwrap();
        (batcher, scheduler)
    }

    #[test]
    fn pending_batch_dedups_keys_in_first_seen_order() {
        let mut batch = PendingBatch::<&str, u32>::new();
        let mut pendings = Vec::new();
        for key in ["b", "a", "b", "c", "a"] {
            let (w, p) = Waiter::channel();
            batch.register(key, w);
            pendings.push(p);
        }
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.calls, 5);

        let (keys, waiters) = batch.into_parts();
        assert_eq!(keys, vec!["b", "a", "c"]);
        assert_eq!(waiters.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2, 1]);
    }

    #[test]
    fn accepts_existing_key_in_full_batch() {
        let mut batch = PendingBatch::<&str, u32>::new();
        let (w, _p) = Waiter::channel();
        batch.register("a", w);
        assert!(batch.accepts(&"a", 1));
        assert!(!batch.accepts(&"b", 1));
    }

    #[tokio::test]
    async fn intake_splits_batches_at_limit() {
        let (batcher, _s) = manual(BatcherConfig::default().limit(2));
        let _p: Vec<_> = ["a", "b", "c", "a", "d", "e"]
            .into_iter()
            .map(|k| batcher.call(k))
            .collect();

        // [a b] [c a] [d e]: the second "a" lands in the open batch, not the first.
        let stats = batcher.stats();
        assert_eq!(stats.queued_batches, 3);
        assert_eq!(stats.queued_calls, 6);
        assert_eq!(stats.call_count, 0);
    }

    #[tokio::test]
    async fn nothing_dispatches_before_scheduler_runs() {
        let (batcher, scheduler) = manual(BatcherConfig::default());
        let p = batcher.call("x");
        assert_eq!(batcher.call_count(), 0);
        assert_eq!(scheduler.pending(), 1);

        scheduler.run_due();
        assert_eq!(batcher.call_count(), 1);
        assert_eq!(batcher.stats().in_flight, 1);
        assert_eq!(p.await.unwrap(), "x");
    }

    #[tokio::test]
    async fn fan_out_rejects_every_waiter_on_error() {
        let mut pendings = Vec::new();
        let mut groups = Vec::new();
        for _ in 0..2 {
            let mut group = Vec::new();
            for _ in 0..2 {
                let (w, p) = Waiter::<u32>::channel();
                group.push(w);
                pendings.push(p);
            }
            groups.push(group);
        }
        fan_out(groups, Err(BatchError::failed("x")));
        for p in pendings {
            assert!(p.await.unwrap_err().is_underlying());
        }
    }

    #[tokio::test]
    async fn fan_out_skips_abandoned_waiters() {
        let (gone, dropped) = Waiter::<u32>::channel();
        let (live, pending) = Waiter::<u32>::channel();
        drop(dropped);
        assert!(gone.is_abandoned());
        fan_out(vec![vec![gone, live]], Ok(vec![7]));
        assert_eq!(pending.await.unwrap(), 7);
    }
}
