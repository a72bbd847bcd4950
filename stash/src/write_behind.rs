//! Fire-and-forget store writes.
//!
//! A response captured on a cache miss is delivered to the caller without
//! waiting for the store to acknowledge the write. The write runs as a
//! detached tokio task owned by a [`WriteBehind`] manager, which logs its
//! failures and keeps a handle so callers can wait for in-flight writes
//! (tests, graceful shutdown).
//!
//! ```ignore
//! let writes = WriteBehind::new();
//! writes.spawn(key.clone(), async move { store.set(&key, body, ttl).await });
//! writes.wait_all().await;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use stash_backend::{CacheKey, StoreResult};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, info_span, warn};

#[cfg(feature = "metrics")]
use crate::metrics::{WRITE_BEHIND_COMPLETED, WRITE_BEHIND_FAILED};

#[derive(Debug)]
struct WriteBehindInner {
    tasks: DashMap<u64, JoinHandle<()>>,
    next_id: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    slow_threshold: Option<Duration>,
}

/// Manager for detached store writes.
///
/// Clones share the same task set and counters.
#[derive(Clone, Debug)]
pub struct WriteBehind {
    inner: Arc<WriteBehindInner>,
}

impl WriteBehind {
    pub fn new() -> Self {
        Self::with_inner(None)
    }

    /// Logs a warning for writes taking longer than `threshold`.
    ///
    /// Slow writes are never cancelled.
    pub fn with_slow_threshold(threshold: Duration) -> Self {
        Self::with_inner(Some(threshold))
    }

    fn with_inner(slow_threshold: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(WriteBehindInner {
                tasks: DashMap::new(),
                next_id: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                slow_threshold,
            }),
        }
    }

    /// Spawns `write` in the background and returns immediately.
    ///
    /// A failed write is logged and counted, never propagated.
    pub fn spawn<F>(&self, key: CacheKey, write: F)
    where
        F: Future<Output = StoreResult<()>> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.clone();
        let slow_threshold = self.inner.slow_threshold;
        let span = info_span!("write_behind", %key, id);
        // The task removes its own handle when done, so it must not start
        // before that handle is tracked.
        let (tracked, wait_tracked) = oneshot::channel::<()>();

        let handle = tokio::spawn(
            async move {
                let _ = wait_tracked.await;
                let start = Instant::now();
                match write.await {
                    Ok(()) => {
                        debug!("cache entry written");
                        inner.completed.fetch_add(1, Ordering::Relaxed);
                        #[cfg(feature = "metrics")]
                        metrics::counter!(*WRITE_BEHIND_COMPLETED).increment(1);
                    }
                    Err(error) => {
                        warn!(%error, "cache write failed, entry not stored");
                        inner.failed.fetch_add(1, Ordering::Relaxed);
                        #[cfg(feature = "metrics")]
                        metrics::counter!(*WRITE_BEHIND_FAILED).increment(1);
                    }
                }
                let elapsed = start.elapsed();
                if slow_threshold.is_some_and(|threshold| elapsed > threshold) {
                    warn!(
                        elapsed_ms = elapsed.as_millis(),
                        "cache write exceeded slow threshold"
                    );
                }
                inner.tasks.remove(&id);
            }
            .instrument(span),
        );
        self.inner.tasks.insert(id, handle);
        let _ = tracked.send(());
    }

    /// Number of writes still running.
    pub fn active_count(&self) -> usize {
        self.inner
            .tasks
            .iter()
            .filter(|e| !e.value().is_finished())
            .count()
    }

    /// Number of writes that completed successfully.
    pub fn completed_writes(&self) -> u64 {
        self.inner.completed.load(Ordering::Relaxed)
    }

    /// Number of writes that failed.
    pub fn failed_writes(&self) -> u64 {
        self.inner.failed.load(Ordering::Relaxed)
    }

    /// Waits until every tracked write has finished.
    ///
    /// Writes spawned while waiting are awaited too.
    pub async fn wait_all(&self) {
        loop {
            let ids: Vec<u64> = self.inner.tasks.iter().map(|e| *e.key()).collect();
            if ids.is_empty() {
                break;
            }
            for id in ids {
                if let Some((_, handle)) = self.inner.tasks.remove(&id)
                    && let Err(error) = handle.await
                {
                    warn!(%error, "cache write task did not complete");
                }
            }
        }
    }

    /// Like [`wait_all`](Self::wait_all), giving up after `timeout`.
    ///
    /// Returns `false` if writes were still running when the timeout expired.
    pub async fn wait_all_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_all()).await.is_ok()
    }
}

impl Default for WriteBehind {
    fn default() -> Self {
        Self::new()
    }
}
