//! Tower middleware for cache-aside HTTP response caching.
//!
//! [`Cache`] wraps a service producing JSON responses. For every request it
//! derives a [`CacheKey`](stash::CacheKey), then:
//!
//! - **HIT**: the key is live in the store. The stored payload is returned
//!   with its remaining lifetime, the wrapped service is not called.
//! - **MISS**: the wrapped service runs. A 2xx body is buffered, written to
//!   the store in the background with the configured TTL and returned as is.
//!
//! A store that errors or can't be reached turns every request into a MISS;
//! the layer never fails a request because of the store.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//! use stash::CacheConfig;
//! use stash_backend::MemoryStore;
//! use stash_tower::Cache;
//! use tower::{ServiceBuilder, service_fn};
//!
//! let cache = Cache::builder()
//!     .store(MemoryStore::new())
//!     .config(CacheConfig::builder().ttl(Duration::from_secs(10)).build())
//!     .build();
//!
//! let service = ServiceBuilder::new()
//!     .layer(cache)
//!     .service(service_fn(|_req| async {
//!         Ok::<_, std::convert::Infallible>(http::Response::new(
//!             http_body_util::Full::new(bytes::Bytes::from_static(b"{}")),
//!         ))
//!     }));
//! ```
//!
//! # Response Headers
//!
//! | Header | Value |
//! |--------|-------|
//! | `x-cache-status` | `HIT` or `MISS` |
//! | `redis-ttl` | Remaining lifetime in seconds on a HIT, the configured TTL on a captured MISS |
//!
//! Both names are configurable through [`CacheConfig`](stash::CacheConfig).
//!
//! # Errors
//!
//! A stored or produced payload that isn't JSON, or a handler body that fails
//! while streaming, is answered with `500` and a JSON `{"error": ...}` body.

/// Response body type.
pub mod body;
/// Miss-path response capture.
pub mod capture;
/// Request future.
pub mod future;
/// Tower layer and builder.
pub mod layer;
/// The Tower service.
pub mod service;
mod state;

pub use body::CacheBody;
pub use capture::Capture;
pub use future::CacheFuture;
pub use layer::{Cache, CacheBuilder, NotSet};
pub use service::CacheService;
pub use stash::{CacheConfig, CacheStatus, DEFAULT_CACHE_STATUS_HEADER, DEFAULT_TTL_HEADER};
