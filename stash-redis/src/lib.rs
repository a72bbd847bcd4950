//! Redis integration for stash.
//!
//! - [`RedisStore`] implements [`Store`](stash_backend::Store) with plain
//!   `EXISTS` / `GET` / `SET .. EX` / `TTL` commands.
//! - [`Relay`] and [`Fanout`] bridge a Redis pub/sub channel and the clients
//!   connected to this process.

pub mod error;
pub mod relay;
pub mod store;

pub use error::Error;
pub use relay::{
    DEFAULT_CHANNEL, DEFAULT_FANOUT_CAPACITY, DEFAULT_RESUBSCRIBE_DELAY, Fanout,
    MAX_RESUBSCRIBE_DELAY, Relay,
};
pub use store::{
    DEFAULT_CONNECTION_RETRIES, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_REDIS_URL, RedisStore,
    RedisStoreBuilder,
};
