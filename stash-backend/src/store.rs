use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{CacheKey, StoreError};

pub type StoreResult<T> = Result<T, StoreError>;

/// Narrow interface over an external keyed store with per-key expiry.
///
/// The four operations mirror the Redis `EXISTS`, `GET`, `SET key value EX ttl`
/// and `TTL` commands. Implementations own the lifetime of every entry: the
/// cache layer never deletes anything and keeps no index of its own.
#[async_trait]
pub trait Store: Send + Sync {
    /// Checks whether `key` currently holds an unexpired entry.
    async fn exists(&self, key: &CacheKey) -> StoreResult<bool>;

    /// Reads the payload stored under `key`.
    ///
    /// Returns [`StoreError::KeyNotFound`] when the entry is gone, which
    /// happens when it expires between [`exists`](Store::exists) and this call.
    async fn get(&self, key: &CacheKey) -> StoreResult<Bytes>;

    /// Writes or overwrites `key`, (re)starting its countdown from `ttl`.
    async fn set(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> StoreResult<()>;

    /// Remaining lifetime of `key` in whole seconds.
    ///
    /// `None` when the key does not exist or has no expiry.
    async fn ttl(&self, key: &CacheKey) -> StoreResult<Option<u64>>;

    /// Name of the store used in logs.
    fn label(&self) -> &str {
        "store"
    }
}

#[async_trait]
impl<T> Store for Arc<T>
where
    T: Store + ?Sized,
{
    async fn exists(&self, key: &CacheKey) -> StoreResult<bool> {
        (**self).exists(key).await
    }

    async fn get(&self, key: &CacheKey) -> StoreResult<Bytes> {
        (**self).get(key).await
    }

    async fn set(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> StoreResult<()> {
        (**self).set(key, value, ttl).await
    }

    async fn ttl(&self, key: &CacheKey) -> StoreResult<Option<u64>> {
        (**self).ttl(key).await
    }

    fn label(&self) -> &str {
        (**self).label()
    }
}

#[async_trait]
impl Store for Box<dyn Store> {
    async fn exists(&self, key: &CacheKey) -> StoreResult<bool> {
        (**self).exists(key).await
    }

    async fn get(&self, key: &CacheKey) -> StoreResult<Bytes> {
        (**self).get(key).await
    }

    async fn set(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> StoreResult<()> {
        (**self).set(key, value, ttl).await
    }

    async fn ttl(&self, key: &CacheKey) -> StoreResult<Option<u64>> {
        (**self).ttl(key).await
    }

    fn label(&self) -> &str {
        (**self).label()
    }
}

/// Converts a TTL to the whole seconds accepted by `SET .. EX`.
///
/// Sub-second remainders round up so an entry never lives shorter than asked
/// and a non-zero TTL never becomes `EX 0`.
pub fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 { secs + 1 } else { secs.max(1) }
}
