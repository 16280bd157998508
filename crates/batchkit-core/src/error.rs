//! Batcher-level error types.

use std::sync::Arc;

use thiserror::Error;

/// Boxed error accepted from user-supplied batch and unit functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors delivered to a caller awaiting a batched (or series) result.
///
/// Every waiter of a failed batch receives a clone of the same error, so the
/// type is cheap to clone.
#[derive(Debug, Clone, Error)]
pub enum BatchError {
    /// The batch function returned a result sequence of the wrong length.
    #[error("batch function returned {actual} results for {expected} keys")]
    ContractViolation { expected: usize, actual: usize },

    /// The batch or unit function itself failed.
    #[error("batch function failed: {0}")]
    Failed(#[source] Arc<dyn std::error::Error + Send + Sync + 'static>),

    /// The batch or unit function panicked.
    #[error("batch function panicked: {0}")]
    Panicked(String),

    /// The waiter was discarded before a result was delivered.
    #[error("batcher dropped before the call completed")]
    Dropped,

    /// Rejected configuration at construction time.
    #[error("invalid batcher configuration: {0}")]
    InvalidConfig(String),
}

impl BatchError {
    /// Wrap an arbitrary error returned by the underlying function.
    pub fn failed(err: impl Into<BoxError>) -> Self {
        Self::Failed(Arc::from(err.into()))
    }

    /// Returns `true` if the batch function broke its result-length contract.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::ContractViolation { .. })
    }

    /// Returns `true` if the underlying function failed or panicked.
    pub fn is_underlying(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Panicked(_))
    }

    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::Panicked(msg)
    }
}

/// Errors from [`OrderedQueue`](crate::queue::OrderedQueue) access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Removal or peek on an empty queue.
    #[error("queue is empty")]
    Empty,
}
