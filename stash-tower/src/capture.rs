//! Response capture for cache misses.
//!
//! A handler delivers its output exactly once, by resolving its response
//! future. [`Capture`] is built per request on the miss path and sits on that
//! single delivery: it buffers a successful body, checks that it is JSON,
//! hands a `set` to the write-behind manager, stamps the TTL header and gives
//! the caller the original bytes. [`Capture::deliver`] takes `self`, so a
//! capture intercepts at most one delivery and is gone afterwards.
//!
//! The store write is issued before the response is returned but is not
//! awaited.

use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderValue, Response};
use http_body::Body as HttpBody;
use http_body_util::BodyExt;
use serde::de::IgnoredAny;
use stash::{CacheConfig, CacheError, WriteBehind};
use stash_backend::{CacheKey, Store};
use tracing::{debug, trace};

use crate::body::CacheBody;

/// Per-request interceptor of the handler's response.
pub struct Capture<St> {
    key: CacheKey,
    store: Arc<St>,
    config: Arc<CacheConfig>,
    writes: WriteBehind,
}

impl<St> Capture<St>
where
    St: Store + 'static,
{
    pub fn new(
        key: CacheKey,
        store: Arc<St>,
        config: Arc<CacheConfig>,
        writes: WriteBehind,
    ) -> Self {
        Self {
            key,
            store,
            config,
            writes,
        }
    }

    /// Intercepts the handler's delivery and returns what the caller receives.
    ///
    /// Non-2xx responses and empty bodies (`204 No Content` and the like) are
    /// passed through without being stored. A body that fails to stream or is
    /// not JSON fails the request.
    pub async fn deliver<B>(self, response: Response<B>) -> Result<Response<CacheBody<B>>, CacheError>
    where
        B: HttpBody,
        B::Error: Display,
    {
        let (mut parts, body) = response.into_parts();

        if !parts.status.is_success() {
            debug!(key = %self.key, status = %parts.status, "response not captured");
            return Ok(Response::from_parts(parts, CacheBody::Passthrough(body)));
        }

        let payload = body.collect().await.map_err(CacheError::body)?.to_bytes();
        if payload.is_empty() {
            debug!(key = %self.key, status = %parts.status, "empty response not captured");
            return Ok(Response::from_parts(parts, CacheBody::complete(payload)));
        }
        validate_json(&payload)?;

        trace!(key = %self.key, bytes = payload.len(), "captured response");
        self.store_in_background(payload.clone());

        parts
            .headers
            .insert(self.config.ttl_header().clone(), HeaderValue::from(self.config.ttl_secs()));

        Ok(Response::from_parts(parts, CacheBody::complete(payload)))
    }

    fn store_in_background(&self, payload: Bytes) {
        let store = self.store.clone();
        let key = self.key.clone();
        let ttl = self.config.ttl();
        self.writes.spawn(self.key.clone(), async move {
            store.set(&key, payload, ttl).await
        });
    }
}

/// Checks that `payload` is a single well-formed JSON document.
pub(crate) fn validate_json(payload: &[u8]) -> Result<(), CacheError> {
    serde_json::from_slice::<IgnoredAny>(payload)
        .map(|_| ())
        .map_err(CacheError::serialization)
}
