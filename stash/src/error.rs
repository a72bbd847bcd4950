use stash_backend::StoreError;
use thiserror::Error;

/// Errors raised while serving a request through the cache layer.
///
/// Only [`Serialization`](CacheError::Serialization) and
/// [`Body`](CacheError::Body) fail a request. Store errors are recovered by
/// bypassing the cache and only show up in logs.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The store could not be used for this request.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A payload could not be encoded or decoded as JSON.
    #[error("cache payload is not valid JSON: {0}")]
    Serialization(String),

    /// The handler's response body failed while being buffered.
    #[error("response body error: {0}")]
    Body(String),
}

impl CacheError {
    pub fn serialization(error: impl std::fmt::Display) -> Self {
        Self::Serialization(error.to_string())
    }

    pub fn body(error: impl std::fmt::Display) -> Self {
        Self::Body(error.to_string())
    }

    /// Whether this error must fail the request instead of bypassing the cache.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Store(_))
    }
}
