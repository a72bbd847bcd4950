//! Cache key type.
//!
//! A [`CacheKey`] is the exact string sent to the store. Keys are built once
//! per request by a key extractor and then cloned into the lookup, the capture
//! and the background write, so cloning only bumps a reference count (or
//! copies inline for short keys).
//!
//! ```
//! use stash_backend::CacheKey;
//!
//! let key = CacheKey::new("cache:/test");
//! assert_eq!(key.as_str(), "cache:/test");
//! assert_eq!(format!("{key}"), "cache:/test");
//! ```

use std::fmt;

use smol_str::SmolStr;

/// String key identifying a cached entry in a store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(SmolStr);

impl CacheKey {
    /// Creates a key from anything string-like.
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(SmolStr::new(key))
    }

    /// Builds a namespaced key of the form `{prefix}:{rest}`.
    ///
    /// An empty prefix yields `rest` unchanged.
    pub fn with_prefix(prefix: &str, rest: &str) -> Self {
        if prefix.is_empty() {
            Self::new(rest)
        } else {
            Self(smol_str::format_smolstr!("{prefix}:{rest}"))
        }
    }

    /// Returns the key as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CacheKey {
    fn from(value: String) -> Self {
        Self(SmolStr::from(value))
    }
}
