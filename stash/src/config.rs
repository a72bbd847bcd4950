use std::time::Duration;

use http::HeaderName;
use serde::{Deserialize, Serialize};

/// Default header reporting the remaining lifetime of the served entry.
pub const DEFAULT_TTL_HEADER: HeaderName = HeaderName::from_static("redis-ttl");

/// Default header reporting `HIT` or `MISS`.
pub const DEFAULT_CACHE_STATUS_HEADER: HeaderName = HeaderName::from_static("x-cache-status");

/// Default TTL applied to every entry written by the layer.
pub const DEFAULT_TTL: Duration = Duration::from_secs(10);

/// Deployment-wide cache settings.
///
/// The TTL is fixed per deployment, not per key. Header names are only
/// configurable from code; the serialized form carries the TTL alone.
///
/// ```
/// use std::time::Duration;
/// use stash::CacheConfig;
///
/// let config = CacheConfig::builder().ttl(Duration::from_secs(30)).build();
/// assert_eq!(config.ttl_secs(), 30);
/// assert_eq!(config.ttl_header().as_str(), "redis-ttl");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of a written entry (e.g. "10s", "1m").
    #[serde(default = "default_ttl", with = "humantime_serde")]
    ttl: Duration,
    #[serde(skip, default = "default_ttl_header")]
    ttl_header: HeaderName,
    #[serde(skip, default = "default_status_header")]
    status_header: HeaderName,
}

fn default_ttl() -> Duration {
    DEFAULT_TTL
}

fn default_ttl_header() -> HeaderName {
    DEFAULT_TTL_HEADER
}

fn default_status_header() -> HeaderName {
    DEFAULT_CACHE_STATUS_HEADER
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            ttl_header: DEFAULT_TTL_HEADER,
            status_header: DEFAULT_CACHE_STATUS_HEADER,
        }
    }
}

impl CacheConfig {
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// TTL in the whole seconds the store is asked for.
    pub fn ttl_secs(&self) -> u64 {
        stash_backend::ttl_seconds(self.ttl)
    }

    pub fn ttl_header(&self) -> &HeaderName {
        &self.ttl_header
    }

    pub fn status_header(&self) -> &HeaderName {
        &self.status_header
    }
}

/// Builder for [`CacheConfig`].
#[derive(Debug, Clone, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    /// Lifetime of every entry written by the layer.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.config.ttl = ttl;
        self
    }

    /// Header carrying the remaining TTL in seconds.
    pub fn ttl_header(mut self, name: HeaderName) -> Self {
        self.config.ttl_header = name;
        self
    }

    /// Header carrying `HIT`/`MISS`.
    pub fn status_header(mut self, name: HeaderName) -> Self {
        self.config.status_header = name;
        self
    }

    pub fn build(self) -> CacheConfig {
        self.config
    }
}
