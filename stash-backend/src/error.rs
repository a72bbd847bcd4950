//! Error types for store operations.

use thiserror::Error;

use crate::CacheKey;

/// Error type for store operations.
///
/// The cache layer never lets one of these reach the caller. `Unavailable`
/// and `KeyNotFound` are recovered as cache misses, `Internal` is logged and
/// treated the same way.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached.
    ///
    /// Connection refused, dropped connections, IO errors and timeouts.
    #[error("store unavailable: {0}")]
    Unavailable(Box<dyn std::error::Error + Send + Sync>),

    /// The key disappeared between an `exists` and the following `get`.
    #[error("key not found: {0}")]
    KeyNotFound(crate::CacheKey),

    /// Any other store-side failure (protocol errors, unexpected replies).
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wraps a connection-level failure.
    pub fn unavailable(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Unavailable(error.into())
    }

    /// Builds the expiry-race error for `key`.
    pub fn key_not_found(key: &CacheKey) -> Self {
        Self::KeyNotFound(key.clone())
    }

    /// Returns `true` for errors caused by the store being unreachable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Returns `true` for the `exists`/`get` expiry race.
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound(_))
    }
}
