//! Server settings: defaults overridden by environment variables.
//!
//! | Variable | Default | |
//! |----------|---------|---|
//! | `PORT` | `3000` | listen port |
//! | `REDIS_URL` | `redis://127.0.0.1/` | cache store and chat relay |
//! | `CACHE_TTL` | `10s` | lifetime of cached responses |
//! | `PROCESSING_TIME` | `2s` | simulated latency of `/test` |
//! | `CHAT_CHANNEL` | `chat` | pub/sub channel of the chat relay |
//!
//! Durations use humantime syntax (`10s`, `1m 30s`, `500ms`).

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use config::{Config, Environment};
use serde::Deserialize;
use stash::CacheConfig;
use thiserror::Error;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_PROCESSING_TIME: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub cache_ttl: Duration,
    #[serde(default = "default_processing_time", with = "humantime_serde")]
    pub processing_time: Duration,
    #[serde(default = "default_chat_channel")]
    pub chat_channel: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

impl Settings {
    /// Loads settings from the process environment.
    pub fn load() -> Result<Self, LoadError> {
        Self::from_env(Environment::default())
    }

    pub fn from_env(environment: Environment) -> Result<Self, LoadError> {
        let settings: Settings = Config::builder()
            .add_source(environment)
            .build()?
            .try_deserialize()?;
        settings.validate()
    }

    fn validate(self) -> Result<Self, LoadError> {
        if self.cache_ttl < Duration::from_secs(1) {
            return Err(LoadError::invalid(
                "cache_ttl",
                "must be at least one second",
            ));
        }
        if self.chat_channel.is_empty() {
            return Err(LoadError::invalid("chat_channel", "must not be empty"));
        }
        Ok(self)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::builder().ttl(self.cache_ttl).build()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            port: default_port(),
            redis_url: default_redis_url(),
            cache_ttl: default_cache_ttl(),
            processing_time: default_processing_time(),
            chat_channel: default_chat_channel(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_redis_url() -> String {
    stash_redis::DEFAULT_REDIS_URL.to_owned()
}

fn default_cache_ttl() -> Duration {
    stash::DEFAULT_TTL
}

fn default_processing_time() -> Duration {
    DEFAULT_PROCESSING_TIME
}

fn default_chat_channel() -> String {
    stash_redis::DEFAULT_CHANNEL.to_owned()
}
