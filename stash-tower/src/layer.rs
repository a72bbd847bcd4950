use std::sync::Arc;

use stash::{CacheConfig, KeyExtractor, PathKey, WriteBehind};
use stash_backend::Store;
use tower::Layer;

use crate::service::CacheService;

/// Tower [`Layer`] adding cache-aside behaviour to a service.
///
/// Every service produced by one `Cache` shares its store, configuration and
/// background write manager.
pub struct Cache<St, K = PathKey> {
    store: Arc<St>,
    config: Arc<CacheConfig>,
    extractor: K,
    writes: WriteBehind,
}

impl<St> Cache<St, PathKey>
where
    St: Store,
{
    /// Layer with default configuration and path based keys.
    pub fn new(store: St) -> Self {
        Cache {
            store: Arc::new(store),
            config: Arc::new(CacheConfig::default()),
            extractor: PathKey::default(),
            writes: WriteBehind::new(),
        }
    }
}

impl Cache<NotSet, PathKey> {
    pub fn builder() -> CacheBuilder<NotSet, PathKey> {
        CacheBuilder::default()
    }
}

impl<St, K> Cache<St, K> {
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Background write manager used for captured responses.
    ///
    /// Await [`WriteBehind::wait_all`] on shutdown to flush pending writes.
    pub fn write_behind(&self) -> &WriteBehind {
        &self.writes
    }
}

impl<St, K> Clone for Cache<St, K>
where
    K: Clone,
{
    fn clone(&self) -> Self {
        Cache {
            store: self.store.clone(),
            config: self.config.clone(),
            extractor: self.extractor.clone(),
            writes: self.writes.clone(),
        }
    }
}

impl<S, St, K> Layer<S> for Cache<St, K>
where
    K: Clone,
{
    type Service = CacheService<S, St, K>;

    fn layer(&self, upstream: S) -> Self::Service {
        CacheService::new(
            upstream,
            Arc::clone(&self.store),
            Arc::clone(&self.config),
            self.extractor.clone(),
            self.writes.clone(),
        )
    }
}

/// Marker for a builder without a store yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotSet;

pub struct CacheBuilder<St, K> {
    store: St,
    config: CacheConfig,
    extractor: K,
    writes: Option<WriteBehind>,
}

impl Default for CacheBuilder<NotSet, PathKey> {
    fn default() -> Self {
        CacheBuilder {
            store: NotSet,
            config: CacheConfig::default(),
            extractor: PathKey::default(),
            writes: None,
        }
    }
}

impl<St, K> CacheBuilder<St, K> {
    pub fn store<NS: Store>(self, store: NS) -> CacheBuilder<NS, K> {
        CacheBuilder {
            store,
            config: self.config,
            extractor: self.extractor,
            writes: self.writes,
        }
    }

    pub fn config(self, config: CacheConfig) -> Self {
        CacheBuilder { config, ..self }
    }

    pub fn extractor<NK: KeyExtractor>(self, extractor: NK) -> CacheBuilder<St, NK> {
        CacheBuilder {
            store: self.store,
            config: self.config,
            extractor,
            writes: self.writes,
        }
    }

    /// Share a write manager with other layers or with shutdown code.
    pub fn write_behind(self, writes: WriteBehind) -> Self {
        CacheBuilder {
            writes: Some(writes),
            ..self
        }
    }
}

impl<St, K> CacheBuilder<St, K>
where
    St: Store,
    K: KeyExtractor,
{
    pub fn build(self) -> Cache<St, K> {
        Cache {
            store: Arc::new(self.store),
            config: Arc::new(self.config),
            extractor: self.extractor,
            writes: self.writes.unwrap_or_default(),
        }
    }
}
