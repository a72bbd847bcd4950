//! Redis store implementation.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::Client;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use smol_str::SmolStr;
use stash_backend::{CacheKey, Store, StoreError, StoreResult, ttl_seconds};
use tokio::sync::OnceCell;
use tracing::trace;

use crate::error::Error;

/// Default server address.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1/";

/// How long one connection attempt may take.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(1);

/// Reconnection attempts after the first one fails.
pub const DEFAULT_CONNECTION_RETRIES: usize = 1;

/// Connection manager settings that give up quickly on a dead server.
///
/// A store call waits for the connection, so a long retry schedule would
/// stall every request while Redis is down.
pub(crate) fn manager_config(timeout: Duration, retries: usize) -> ConnectionManagerConfig {
    ConnectionManagerConfig::new()
        .set_connection_timeout(Some(timeout))
        .set_response_timeout(Some(timeout))
        .set_number_of_retries(retries)
        .set_max_delay(timeout)
}

/// [`Store`] backed by a Redis server.
///
/// Entries are plain string values written with `SET key value EX seconds`,
/// so they can be inspected with `redis-cli` and expire server side.
///
/// The connection is opened on first use through a [`ConnectionManager`],
/// which reconnects on its own after the server comes back. If the first
/// connection attempt fails, the next operation tries again. Attempts are
/// bounded by [`RedisStoreBuilder::connection_timeout`] and
/// [`RedisStoreBuilder::retries`], so an outage fails store calls fast.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    connection: OnceCell<ConnectionManager>,
    config: ConnectionManagerConfig,
    label: SmolStr,
}

impl RedisStore {
    /// Store for `url`, e.g. `redis://127.0.0.1:6379/0`.
    pub fn new(url: impl Into<String>) -> Result<Self, Error> {
        Self::builder().server(url).build()
    }

    #[must_use]
    pub fn builder() -> RedisStoreBuilder {
        RedisStoreBuilder::default()
    }

    /// Lazily connected connection manager.
    pub async fn connection(&self) -> Result<&ConnectionManager, Error> {
        trace!("Get connection manager");
        let manager = self
            .connection
            .get_or_try_init(|| {
                trace!("Initialize new redis connection manager");
                self.client
                    .get_connection_manager_with_config(self.config.clone())
            })
            .await?;
        Ok(manager)
    }

    async fn manager(&self) -> Result<ConnectionManager, StoreError> {
        Ok(self.connection().await?.clone())
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("label", &self.label)
            .field("connected", &self.connection.initialized())
            .finish()
    }
}

pub struct RedisStoreBuilder {
    connection_info: String,
    label: SmolStr,
    connection_timeout: Duration,
    retries: usize,
}

impl Default for RedisStoreBuilder {
    fn default() -> Self {
        Self {
            connection_info: DEFAULT_REDIS_URL.to_owned(),
            label: SmolStr::new_static("redis"),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            retries: DEFAULT_CONNECTION_RETRIES,
        }
    }
}

impl RedisStoreBuilder {
    /// Connection info (host, port, database, credentials) as a Redis URL.
    pub fn server(mut self, connection_info: impl Into<String>) -> Self {
        self.connection_info = connection_info.into();
        self
    }

    /// Name reported in logs and metrics.
    pub fn label(mut self, label: impl Into<SmolStr>) -> Self {
        self.label = label.into();
        self
    }

    /// Upper bound for one connection attempt and for one command reply.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Reconnection attempts before a store call reports the server as down.
    pub fn retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    /// Fails only on a malformed URL, no connection is made here.
    pub fn build(self) -> Result<RedisStore, Error> {
        Ok(RedisStore {
            client: Client::open(self.connection_info)?,
            connection: OnceCell::new(),
            config: manager_config(self.connection_timeout, self.retries),
            label: self.label,
        })
    }
}

/// Maps a `TTL` reply to the remaining lifetime.
///
/// `-2` means the key is absent, `-1` that it has no expiry. Entries written by
/// this store always carry one, so both are reported as unknown.
pub(crate) fn remaining_from_reply(reply: i64) -> Result<Option<u64>, Error> {
    match reply {
        -2 | -1 => Ok(None),
        secs if secs >= 0 => Ok(Some(secs as u64)),
        other => Err(Error::UnexpectedTtl(other)),
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn exists(&self, key: &CacheKey) -> StoreResult<bool> {
        let mut con = self.manager().await?;
        let found: bool = redis::cmd("EXISTS")
            .arg(key.as_str())
            .query_async(&mut con)
            .await
            .map_err(Error::from)?;
        trace!(%key, found, "EXISTS");
        Ok(found)
    }

    async fn get(&self, key: &CacheKey) -> StoreResult<Bytes> {
        let mut con = self.manager().await?;
        let data: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key.as_str())
            .query_async(&mut con)
            .await
            .map_err(Error::from)?;
        data.map(Bytes::from)
            .ok_or_else(|| StoreError::key_not_found(key))
    }

    async fn set(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> StoreResult<()> {
        let mut con = self.manager().await?;
        let secs = ttl_seconds(ttl);
        let () = redis::cmd("SET")
            .arg(key.as_str())
            .arg(value.as_ref())
            .arg("EX")
            .arg(secs)
            .query_async(&mut con)
            .await
            .map_err(Error::from)?;
        trace!(%key, secs, "SET");
        Ok(())
    }

    async fn ttl(&self, key: &CacheKey) -> StoreResult<Option<u64>> {
        let mut con = self.manager().await?;
        let reply: i64 = redis::cmd("TTL")
            .arg(key.as_str())
            .query_async(&mut con)
            .await
            .map_err(Error::from)?;
        Ok(remaining_from_reply(reply)?)
    }

    fn label(&self) -> &str {
        &self.label
    }
}
