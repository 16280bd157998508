//! Series scheduler: strictly one unit at a time, first come first served.
//!
//! Callers push units into an unbounded channel; a single background worker
//! takes them in arrival order, runs the unit function, delivers the result,
//! and only then takes the next unit. Failures reach only the caller of the
//! unit that failed.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::batch_fn::UnitFn;
use crate::error::BatchError;
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::waiter::{Pending, Waiter};

struct Unit<K, R> {
    key: K,
    waiter: Waiter<R>,
}

#[derive(Default)]
struct SeriesState {
    call_count: AtomicU64,
    queued: AtomicUsize,
    busy: AtomicBool,
}

/// Serializing front-end for a [`UnitFn`].
///
/// Cloning is cheap; all clones feed the same worker. The worker drains any
/// queued units and exits once every handle has been dropped.
pub struct Series<K, R> {
    tx: mpsc::UnboundedSender<Unit<K, R>>,
    state: Arc<SeriesState>,
}

impl<K, R> Clone for Series<K, R> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<K, R> Series<K, R>
where
    K: Send + 'static,
    R: Send + 'static,
{
    /// Create a series and start its worker.
    ///
    /// Must be called from within a Tokio runtime. Units keep arrival order
    /// on any runtime flavor; only [`Batcher`](crate::Batcher) coalescing
    /// depends on a current-thread runtime (see [`TokioScheduler`]).
    pub fn new(unit_fn: impl UnitFn<K, R>) -> Self {
        Self::with_scheduler(unit_fn, Arc::new(TokioScheduler))
    }

    /// Create a series whose worker is spawned through `scheduler`.
    pub fn with_scheduler(unit_fn: impl UnitFn<K, R>, scheduler: Arc<dyn Scheduler>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(SeriesState::default());
        scheduler.spawn(Box::pin(run_units(rx, unit_fn, Arc::clone(&state))));
        Self { tx, state }
    }

    /// Queue one unit behind every unit submitted before it.
    pub fn call(&self, key: K) -> Pending<R> {
        let (waiter, pending) = Waiter::channel();
        self.state.queued.fetch_add(1, Ordering::SeqCst);
        if let Err(mpsc::error::SendError(unit)) = self.tx.send(Unit { key, waiter }) {
            self.state.queued.fetch_sub(1, Ordering::SeqCst);
            unit.waiter.reject(BatchError::Dropped);
        }
        pending
    }

    /// Number of units handed to the unit function so far.
    pub fn call_count(&self) -> u64 {
        self.state.call_count.load(Ordering::SeqCst)
    }

    /// Units waiting behind the one in progress.
    pub fn queued(&self) -> usize {
        self.state.queued.load(Ordering::SeqCst)
    }

    /// Whether a unit is inside the unit function right now.
    pub fn is_busy(&self) -> bool {
        self.state.busy.load(Ordering::SeqCst)
    }
}

async fn run_units<K, R>(
    mut rx: mpsc::UnboundedReceiver<Unit<K, R>>,
    unit_fn: impl UnitFn<K, R>,
    state: Arc<SeriesState>,
) {
    while let Some(Unit { key, waiter }) = rx.recv().await {
        state.queued.fetch_sub(1, Ordering::SeqCst);
        state.busy.store(true, Ordering::SeqCst);
        let unit = state.call_count.fetch_add(1, Ordering::SeqCst) + 1;

        let outcome = AssertUnwindSafe(unit_fn.call_unit(key))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(BatchError::from_panic(payload)));

        match &outcome {
            Ok(_) => debug!(unit, "series unit completed"),
            Err(e) => warn!(unit, error = %e, "series unit failed"),
        }
        waiter.settle(outcome);
        state.busy.store(false, Ordering::SeqCst);
    }
    debug!("series closed, worker exiting");
}

impl<K, R> std::fmt::Debug for Series<K, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Series")
            .field("call_count", &self.state.call_count.load(Ordering::SeqCst))
            .field("queued", &self.state.queued.load(Ordering::SeqCst))
            .finish()
    }
}
