use std::fmt::Display;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::{Request, Response};
use http_body::Body as HttpBody;
use stash::{CacheConfig, KeyExtractor, WriteBehind};
use stash_backend::Store;
use tower::Service;

use crate::body::CacheBody;
use crate::future::CacheFuture;

pub struct CacheService<S, St, K> {
    upstream: S,
    store: Arc<St>,
    config: Arc<CacheConfig>,
    extractor: K,
    writes: WriteBehind,
}

impl<S, St, K> CacheService<S, St, K> {
    pub fn new(
        upstream: S,
        store: Arc<St>,
        config: Arc<CacheConfig>,
        extractor: K,
        writes: WriteBehind,
    ) -> Self {
        CacheService {
            upstream,
            store,
            config,
            extractor,
            writes,
        }
    }
}

impl<S, St, K> Clone for CacheService<S, St, K>
where
    S: Clone,
    K: Clone,
{
    fn clone(&self) -> Self {
        Self {
            upstream: self.upstream.clone(),
            store: self.store.clone(),
            config: self.config.clone(),
            extractor: self.extractor.clone(),
            writes: self.writes.clone(),
        }
    }
}

impl<S, St, K, ReqBody, ResBody> Service<Request<ReqBody>> for CacheService<S, St, K>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone,
    St: Store + 'static,
    K: KeyExtractor,
    ResBody: HttpBody + Send + 'static,
    ResBody::Data: Send,
    ResBody::Error: Display + Send,
{
    type Response = Response<CacheBody<ResBody>>;
    type Error = S::Error;
    type Future = CacheFuture<S, St, ReqBody, ResBody>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.upstream.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let (parts, body) = request.into_parts();
        let key = self.extractor.extract(&parts);
        let request = Request::from_parts(parts, body);

        // The ready service goes with the request, a fresh clone stays behind.
        let clone = self.upstream.clone();
        let upstream = std::mem::replace(&mut self.upstream, clone);

        CacheFuture::new(
            upstream,
            self.store.clone(),
            self.config.clone(),
            self.writes.clone(),
            key,
            request,
        )
    }
}
