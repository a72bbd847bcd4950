//! Cache key derivation.
//!
//! A [`KeyExtractor`] turns the parts of an inbound request into the
//! [`CacheKey`] looked up in the store. The default [`PathKey`] uses the
//! routing path alone:
//!
//! ```
//! use http::Request;
//! use stash::extractor::{KeyExtractor, PathKey};
//!
//! let (parts, _) = Request::get("/test?page=2").body(()).unwrap().into_parts();
//! assert_eq!(PathKey::default().extract(&parts).as_str(), "cache:/test");
//! ```
//!
//! Query strings and headers are not part of the key. Every route wrapped with
//! the default extractor must produce the same response regardless of them;
//! routes where they matter need their own extractor.

use http::request::Parts;
use smol_str::SmolStr;
use stash_backend::CacheKey;

/// Default namespace prefixed to every derived key.
pub const DEFAULT_KEY_PREFIX: &str = "cache";

/// Derives a cache key from a request. Must be pure and deterministic.
pub trait KeyExtractor {
    fn extract(&self, parts: &Parts) -> CacheKey;
}

/// Key is `{prefix}:{path}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathKey {
    prefix: SmolStr,
}

impl PathKey {
    pub fn new(prefix: impl Into<SmolStr>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Default for PathKey {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

impl KeyExtractor for PathKey {
    fn extract(&self, parts: &Parts) -> CacheKey {
        CacheKey::with_prefix(&self.prefix, parts.uri.path())
    }
}

impl<F> KeyExtractor for F
where
    F: Fn(&Parts) -> CacheKey,
{
    fn extract(&self, parts: &Parts) -> CacheKey {
        self(parts)
    }
}
