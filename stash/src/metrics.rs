//! Metrics declaration and initialization.

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

use crate::CacheStatus;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Track number of cache hit events.
    pub static ref CACHE_HIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "stash_cache_hit_total",
            "Total number of cache hit events."
        );
        "stash_cache_hit_total"
    };
    /// Track number of cache miss events.
    pub static ref CACHE_MISS_COUNTER: &'static str = {
        metrics::describe_counter!(
            "stash_cache_miss_total",
            "Total number of cache miss events."
        );
        "stash_cache_miss_total"
    };
    /// Track number of store errors recovered as misses.
    pub static ref STORE_ERROR_COUNTER: &'static str = {
        metrics::describe_counter!(
            "stash_store_error_total",
            "Total number of store errors bypassed by the cache layer."
        );
        "stash_store_error_total"
    };
    /// Track number of background writes that completed.
    pub static ref WRITE_BEHIND_COMPLETED: &'static str = {
        metrics::describe_counter!(
            "stash_write_behind_completed_total",
            "Total number of background cache writes that completed."
        );
        "stash_write_behind_completed_total"
    };
    /// Track number of background writes that failed.
    pub static ref WRITE_BEHIND_FAILED: &'static str = {
        metrics::describe_counter!(
            "stash_write_behind_failed_total",
            "Total number of background cache writes that failed."
        );
        "stash_write_behind_failed_total"
    };
}

/// Records the outcome of a lookup. No-op without the `metrics` feature.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_status(status: CacheStatus, store: &str) {
    let name = match status {
        CacheStatus::Hit => *CACHE_HIT_COUNTER,
        CacheStatus::Miss => *CACHE_MISS_COUNTER,
    };
    metrics::counter!(name, "store" => store.to_owned()).increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_status(_status: CacheStatus, _store: &str) {}

/// Records a store error that was bypassed. No-op without the `metrics` feature.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_store_error(operation: &'static str, store: &str) {
    metrics::counter!(*STORE_ERROR_COUNTER, "operation" => operation, "store" => store.to_owned())
        .increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_store_error(_operation: &'static str, _store: &str) {}
