//! The `BatchFn` and `UnitFn` traits — the contracts the schedulers drive.
//!
//! Async closures get both traits through blanket impls. Plain synchronous
//! closures are wrapped with [`sync_batch_fn`] / [`sync_unit_fn`].

use std::future::Future;

use async_trait::async_trait;

use crate::error::{BatchError, BoxError};

/// Bulk function invoked once per dispatched batch.
///
/// # Contract
/// The returned sequence must have exactly one result per key, in the same
/// order as `keys`. Any other length is reported to every caller of the
/// batch as [`BatchError::ContractViolation`].
#[async_trait]
pub trait BatchFn<K, R>: Send + Sync + 'static {
    async fn call_batch(&self, keys: Vec<K>) -> Result<Vec<R>, BatchError>;
}

/// Single-item function driven by [`Series`](crate::series::Series).
#[async_trait]
pub trait UnitFn<K, R>: Send + Sync + 'static {
    async fn call_unit(&self, key: K) -> Result<R, BatchError>;
}

#[async_trait]
impl<K, R, F, Fut, E> BatchFn<K, R> for F
where
    K: Send + 'static,
    R: Send + 'static,
    F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<R>, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    async fn call_batch(&self, keys: Vec<K>) -> Result<Vec<R>, BatchError> {
        (self)(keys).await.map_err(BatchError::failed)
    }
}

#[async_trait]
impl<K, R, F, Fut, E> UnitFn<K, R> for F
where
    K: Send + 'static,
    R: Send + 'static,
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    async fn call_unit(&self, key: K) -> Result<R, BatchError> {
        (self)(key).await.map_err(BatchError::failed)
    }
}

/// Adapter for a synchronous batch closure. See [`sync_batch_fn`].
#[derive(Debug, Clone)]
pub struct SyncBatchFn<F>(F);

/// Wrap `f: Fn(Vec<K>) -> Result<Vec<R>, E>` as a [`BatchFn`].
pub fn sync_batch_fn<F>(f: F) -> SyncBatchFn<F> {
    SyncBatchFn(f)
}

#[async_trait]
impl<K, R, F, E> BatchFn<K, R> for SyncBatchFn<F>
where
    K: Send + 'static,
    R: Send + 'static,
    F: Fn(Vec<K>) -> Result<Vec<R>, E> + Send + Sync + 'static,
    E: Into<BoxError> + 'static,
{
    async fn call_batch(&self, keys: Vec<K>) -> Result<Vec<R>, BatchError> {
        (self.0)(keys).map_err(BatchError::failed)
    }
}

/// Adapter for a synchronous unit closure. See [`sync_unit_fn`].
#[derive(Debug, Clone)]
pub struct SyncUnitFn<F>(F);

/// Wrap `f: Fn(K) -> Result<R, E>` as a [`UnitFn`].
pub fn sync_unit_fn<F>(f: F) -> SyncUnitFn<F> {
    SyncUnitFn(f)
}

#[async_trait]
impl<K, R, F, E> UnitFn<K, R> for SyncUnitFn<F>
where
    K: Send + 'static,
    R: Send + 'static,
    F: Fn(K) -> Result<R, E> + Send + Sync + 'static,
    E: Into<BoxError> + 'static,
{
    async fn call_unit(&self, key: K) -> Result<R, BatchError> {
        (self.0)(key).map_err(BatchError::failed)
    }
}
