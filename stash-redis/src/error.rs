//! Error types for Redis operations.
//!
//! Store operations surface these as [`StoreError`]: failures to reach the
//! server become [`StoreError::Unavailable`], everything else
//! [`StoreError::Internal`]. The cache layer treats both as a miss.

use redis::RedisError;
use stash_backend::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error from the underlying Redis client.
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    /// The server answered with a value this client doesn't understand.
    #[error("unexpected TTL reply: {0}")]
    UnexpectedTtl(i64),
}

impl Error {
    /// Whether the server could not be reached or the connection was lost.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Error::Redis(error) => {
                error.is_io_error()
                    || error.is_connection_refusal()
                    || error.is_connection_dropped()
                    || error.is_timeout()
            }
            Error::UnexpectedTtl(_) => false,
        }
    }
}

impl From<Error> for StoreError {
    fn from(error: Error) -> Self {
        if error.is_unavailable() {
            StoreError::Unavailable(Box::new(error))
        } else {
            StoreError::Internal(Box::new(error))
        }
    }
}
