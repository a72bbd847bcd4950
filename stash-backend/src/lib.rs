//! Store trait and in-process store for the stash cache-aside layer.
//!
//! If you want to put the cache in front of your own key-value service, you
//! are in the right place: implement [`Store`] and hand it to the layer.
mod error;
mod key;
pub mod memory;
mod store;

pub use error::StoreError;
pub use key::CacheKey;
pub use memory::{MemoryStore, StoreCounters};
pub use store::{Store, StoreResult, ttl_seconds};
