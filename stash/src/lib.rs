//! Cache-aside response caching.
//!
//! `stash` holds the protocol-level pieces shared by the middleware crates:
//!
//! - [`CacheConfig`] - deployment-wide TTL and response header names
//! - [`extractor`] - derives the [`CacheKey`] for a request
//! - [`CacheStatus`] - `HIT` / `MISS` outcome reported to the caller
//! - [`WriteBehind`] - runs store writes in the background and logs failures
//! - [`CacheError`] - errors that fail a request
//!
//! The store interface itself lives in [`stash_backend`]; the Tower layer
//! that puts everything together lives in `stash-tower`.
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Cache configuration.
pub mod config;
/// Error types for cache operations.
pub mod error;
/// Cache key derivation.
pub mod extractor;
/// Metrics collection for cache observability.
///
/// With the `metrics` feature enabled, hits, misses, bypassed store errors and
/// background write outcomes are counted through the `metrics` facade.
pub mod metrics;
/// Cache lookup outcome.
pub mod status;
/// Background store writes.
pub mod write_behind;

pub use config::{
    CacheConfig, CacheConfigBuilder, DEFAULT_CACHE_STATUS_HEADER, DEFAULT_TTL, DEFAULT_TTL_HEADER,
};
pub use error::CacheError;
pub use extractor::{KeyExtractor, PathKey};
pub use status::CacheStatus;
pub use write_behind::WriteBehind;

pub use stash_backend::{CacheKey, Store, StoreError, StoreResult};

/// Backend-related re-exports.
pub mod backend {
    pub use stash_backend::*;
}
