//! Scheduling port used by the batch and series schedulers.
//!
//! The schedulers never touch timers or the runtime directly. They ask a
//! [`Scheduler`] to run a callback after a duration and to drive detached
//! futures. [`TokioScheduler`] is the production port; [`ManualScheduler`]
//! replaces wall-clock time with a virtual clock that only moves when a test
//! calls [`ManualScheduler::advance`].

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, Once, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::warn;

/// A one-shot callback handed to [`Scheduler::schedule`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Timer and task-spawning port.
///
/// # Contract
/// - `schedule` must never run `task` before returning, even when `after`
///   is zero. Deferral is what lets synchronous calls coalesce.
/// - `task` runs no earlier than `after` from the moment it was scheduled.
pub trait Scheduler: Send + Sync + 'static {
    /// Run `task` once, no earlier than `after` from now.
    fn schedule(&self, after: Duration, task: Task);

    /// Drive `fut` to completion in the background.
    fn spawn(&self, fut: BoxFuture<'static, ()>);
}

/// Scheduler backed by the ambient Tokio runtime.
///
/// Both methods must be called from within a Tokio runtime context.
///
/// # Runtime flavor
/// Coalescing relies on a deferred check running only after the caller
/// yields. That holds on a current-thread runtime (`#[tokio::main(flavor =
/// "current_thread")]`, the default `#[tokio::test]`). On a multi-thread
/// runtime an idle worker can
/// pick the check up while the caller is still submitting keys, so calls
/// made back to back may be split across several batches. Results stay
/// correct; only `call_count` grows. A warning is logged the first time
/// this scheduler is used on a multi-thread runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

static MULTI_THREAD_WARNING: Once = Once::new();

fn is_multi_thread() -> bool {
    Handle::try_current().is_ok_and(|h| h.runtime_flavor() == RuntimeFlavor::MultiThread)
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, after: Duration, task: Task) {
        if is_multi_thread() {
            MULTI_THREAD_WARNING.call_once(|| {
                warn!("TokioScheduler on a multi-thread runtime; synchronous calls may not coalesce");
            });
        }
        tokio::spawn(async move {
            if !after.is_zero() {
                tokio::time::sleep(after).await;
            }
            task();
        });
    }

    fn spawn(&self, fut: BoxFuture<'static, ()>) {
        tokio::spawn(fut);
    }
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ManualInner {
    now: Duration,
    seq: u64,
    timers: BTreeMap<(Duration, u64), Task>,
}

/// Deterministic virtual-time scheduler.
///
/// Scheduled tasks only run inside [`advance`](Self::advance), in due-time
/// order (ties broken by scheduling order). Spawned futures are handed to
/// the ambient Tokio runtime, so a test still needs to await them.
pub struct ManualScheduler {
    inner: Mutex<ManualInner>,
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ManualInner {
                now: Duration::ZERO,
                seq: 0,
                timers: BTreeMap::new(),
            }),
        }
    }

    /// Current virtual time since construction.
    pub fn now(&self) -> Duration {
        lock(&self.inner).now
    }

    /// Number of scheduled tasks not yet run.
    pub fn pending(&self) -> usize {
        lock(&self.inner).timers.len()
    }

    /// Move the clock forward by `by` and run every task that has come due,
    /// including tasks scheduled by those tasks. Returns how many ran.
    pub fn advance(&self, by: Duration) -> usize {
        let deadline = {
            let mut inner = lock(&self.inner);
            inner.now += by;
            inner.now
        };

        let mut ran = 0;
        loop {
            // Lock is released before running the task; tasks may reschedule.
            let next = {
                let mut inner = lock(&self.inner);
                let due = inner.timers.first_key_value().map(|(&(due, _), _)| due);
                match due {
                    Some(due) if due <= deadline => inner.timers.pop_first(),
                    _ => None,
                }
            };
            match next {
                Some((_, task)) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }
        ran
    }

    /// Run tasks that are already due without moving the clock.
    pub fn run_due(&self) -> usize {
        self.advance(Duration::ZERO)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, after: Duration, task: Task) {
        let mut inner = lock(&self.inner);
        let due = inner.now + after;
        let seq = inner.seq;
        inner.seq += 1;
        inner.timers.insert((due, seq), task);
    }

    fn spawn(&self, fut: BoxFuture<'static, ()>) {
        tokio::spawn(fut);
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("ManualScheduler")
            .field("now", &inner.now)
            .field("pending", &inner.timers.len())
            .finish()
    }
}
