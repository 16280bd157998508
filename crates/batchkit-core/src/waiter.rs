//! One-shot completion plumbing between the schedulers and their callers.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::BatchError;

/// Completion slot for a single caller.
///
/// `resolve` and `reject` consume the waiter, so it fires at most once.
/// A waiter that is dropped without firing surfaces as
/// [`BatchError::Dropped`] on the caller side.
#[derive(Debug)]
pub struct Waiter<R> {
    tx: oneshot::Sender<Result<R, BatchError>>,
}

impl<R> Waiter<R> {
    /// Create a waiter and the future its caller awaits.
    pub fn channel() -> (Self, Pending<R>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, Pending { rx })
    }

    pub fn resolve(self, value: R) {
        self.settle(Ok(value));
    }

    pub fn reject(self, err: BatchError) {
        self.settle(Err(err));
    }

    pub fn settle(self, result: Result<R, BatchError>) {
        // The caller may have stopped listening; nothing to deliver then.
        let _ = self.tx.send(result);
    }

    /// Returns `true` once the caller has dropped its [`Pending`].
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Single-resolution future returned to a caller.
#[derive(Debug)]
#[must_use = "a pending call does nothing observable unless awaited"]
pub struct Pending<R> {
    rx: oneshot::Receiver<Result<R, BatchError>>,
}

impl<R> Future for Pending<R> {
    type Output = Result<R, BatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(BatchError::Dropped)),
            Poll::Pending => Poll::Pending,
        }
    }
}
