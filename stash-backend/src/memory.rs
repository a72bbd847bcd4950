//! In-process store with per-key expiry.
//!
//! Entries carry a [`tokio::time::Instant`] deadline. They are expired lazily
//! on access, and every write also drops whatever else has expired, so keys
//! that are never read again don't pile up. Because the deadline is measured on tokio's clock, paused-time tests
//! can move an entry through its whole lifetime with `tokio::time::advance`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::trace;

use crate::store::ttl_seconds;
use crate::{CacheKey, Store, StoreError, StoreResult};

#[derive(Debug, Clone)]
struct Entry {
    data: Bytes,
    deadline: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

/// Per-operation call counters.
#[derive(Debug, Default)]
pub struct StoreCounters {
    exists: AtomicUsize,
    get: AtomicUsize,
    set: AtomicUsize,
    ttl: AtomicUsize,
}

impl StoreCounters {
    pub fn exists_count(&self) -> usize {
        self.exists.load(Ordering::SeqCst)
    }

    pub fn get_count(&self) -> usize {
        self.get.load(Ordering::SeqCst)
    }

    pub fn set_count(&self) -> usize {
        self.set.load(Ordering::SeqCst)
    }

    pub fn ttl_count(&self) -> usize {
        self.ttl.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.exists.store(0, Ordering::SeqCst);
        self.get.store(0, Ordering::SeqCst);
        self.set.store(0, Ordering::SeqCst);
        self.ttl.store(0, Ordering::SeqCst);
    }
}

/// Store keeping entries in a concurrent map inside the process.
///
/// Useful for tests and single-instance deployments. Clones share the same
/// entries and counters.
///
/// ```
/// use std::time::Duration;
/// use bytes::Bytes;
/// use stash_backend::{CacheKey, MemoryStore, Store};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = MemoryStore::new();
/// let key = CacheKey::new("cache:/test");
/// store.set(&key, Bytes::from_static(b"{}"), Duration::from_secs(10)).await.unwrap();
/// assert!(store.exists(&key).await.unwrap());
/// assert_eq!(store.ttl(&key).await.unwrap(), Some(10));
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<CacheKey, Entry>>,
    counters: Arc<StoreCounters>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> &StoreCounters {
        &self.counters
    }

    /// Number of stored entries that have not expired yet.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Returns the live entry for `key`, dropping it if it has expired.
    fn live(&self, key: &CacheKey) -> Option<Entry> {
        let now = Instant::now();
        let entry = self.entries.get(key).map(|e| e.value().clone())?;
        if entry.is_expired(now) {
            trace!(%key, "evicting expired entry");
            self.entries.remove_if(key, |_, e| e.is_expired(now));
            None
        } else {
            Some(entry)
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn exists(&self, key: &CacheKey) -> StoreResult<bool> {
        self.counters.exists.fetch_add(1, Ordering::SeqCst);
        Ok(self.live(key).is_some())
    }

    async fn get(&self, key: &CacheKey) -> StoreResult<Bytes> {
        self.counters.get.fetch_add(1, Ordering::SeqCst);
        self.live(key)
            .map(|entry| entry.data)
            .ok_or_else(|| StoreError::key_not_found(key))
    }

    async fn set(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> StoreResult<()> {
        self.counters.set.fetch_add(1, Ordering::SeqCst);
        let purged = self.purge_expired();
        if purged > 0 {
            trace!(purged, "purged expired entries");
        }
        let deadline = Instant::now() + Duration::from_secs(ttl_seconds(ttl));
        self.entries.insert(
            key.clone(),
            Entry {
                data: value,
                deadline,
            },
        );
        Ok(())
    }

    async fn ttl(&self, key: &CacheKey) -> StoreResult<Option<u64>> {
        self.counters.ttl.fetch_add(1, Ordering::SeqCst);
        // Rounded to the nearest second, like Redis does for TTL.
        Ok(self.live(key).map(|entry| {
            let remaining = entry.deadline.saturating_duration_since(Instant::now());
            (remaining.as_millis() as u64 + 500) / 1000
        }))
    }

    fn label(&self) -> &str {
        "memory"
    }
}
