use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::ready;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Request, Response, StatusCode};
use http_body::Body as HttpBody;
use pin_project::pin_project;
use stash::metrics::{record_status, record_store_error};
use stash::{CacheConfig, CacheError, CacheStatus, WriteBehind};
use stash_backend::{CacheKey, Store};
use tower::Service;
use tracing::{debug, error, trace, warn};

use crate::body::CacheBody;
use crate::capture::{Capture, validate_json};
use crate::state::{State, StateProj};

const POLL_AFTER_READY_ERROR: &str = "CacheFuture can't be polled after finishing";
const REQUEST_TAKEN_ERROR: &str = "Request already taken from state";
const UPSTREAM_TAKEN_ERROR: &str = "Upstream already called for this request";

/// Future driving one request through the cache-aside flow.
///
/// ```text
/// Initial -> Checking --live--> Reading -> ReadingTtl -> Response (HIT)
///               |                  |
///               +-- absent/error --+--> PollUpstream -> Capturing -> Response (MISS)
/// ```
///
/// Store failures on the read path fall through to the wrapped service.
/// Errors of the wrapped service are returned as is.
#[pin_project(project = CacheFutureProj)]
pub struct CacheFuture<S, St, ReqBody, ResBody>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    upstream: Option<S>,
    store: Arc<St>,
    config: Arc<CacheConfig>,
    writes: WriteBehind,
    key: CacheKey,
    #[pin]
    state: State<S::Future, ReqBody, ResBody>,
}

impl<S, St, ReqBody, ResBody> CacheFuture<S, St, ReqBody, ResBody>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    pub fn new(
        upstream: S,
        store: Arc<St>,
        config: Arc<CacheConfig>,
        writes: WriteBehind,
        key: CacheKey,
        request: Request<ReqBody>,
    ) -> Self {
        CacheFuture {
            upstream: Some(upstream),
            store,
            config,
            writes,
            key,
            state: State::Initial {
                request: Some(request),
            },
        }
    }
}

impl<S, St, ReqBody, ResBody> Future for CacheFuture<S, St, ReqBody, ResBody>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    St: Store + 'static,
    ResBody: HttpBody + Send + 'static,
    ResBody::Data: Send,
    ResBody::Error: Display + Send,
{
    type Output = Result<Response<CacheBody<ResBody>>, S::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();

        loop {
            let state = match this.state.as_mut().project() {
                StateProj::Initial { request } => {
                    let request = request.take().expect(REQUEST_TAKEN_ERROR);
                    let store = this.store.clone();
                    let key = this.key.clone();
                    let exists = Box::pin(async move { store.exists(&key).await });
                    State::Checking {
                        exists,
                        request: Some(request),
                    }
                }
                StateProj::Checking { exists, request } => {
                    let found = ready!(exists.poll(cx));
                    let request = request.take().expect(REQUEST_TAKEN_ERROR);
                    match found {
                        Ok(true) => {
                            let store = this.store.clone();
                            let key = this.key.clone();
                            let read = Box::pin(async move { store.get(&key).await });
                            State::Reading {
                                read,
                                request: Some(request),
                            }
                        }
                        Ok(false) => {
                            debug!(key = %this.key, "cache miss");
                            call_upstream(&mut *this.upstream, request)
                        }
                        Err(error) => {
                            warn!(key = %this.key, %error, "cache lookup failed, bypassing store");
                            record_store_error("exists", this.store.label());
                            call_upstream(&mut *this.upstream, request)
                        }
                    }
                }
                StateProj::Reading { read, request } => {
                    let read = ready!(read.poll(cx));
                    let request = request.take().expect(REQUEST_TAKEN_ERROR);
                    match read {
                        Ok(payload) => match validate_json(&payload) {
                            Ok(()) => {
                                let store = this.store.clone();
                                let key = this.key.clone();
                                let ttl = Box::pin(async move { store.ttl(&key).await });
                                State::ReadingTtl {
                                    ttl,
                                    payload: Some(payload),
                                }
                            }
                            Err(error) => {
                                error!(key = %this.key, %error, "stored payload can't be decoded");
                                State::Response {
                                    response: Some(error_response(&error)),
                                }
                            }
                        },
                        Err(error) if error.is_key_not_found() => {
                            debug!(key = %this.key, "entry expired between exists and get");
                            call_upstream(&mut *this.upstream, request)
                        }
                        Err(error) => {
                            warn!(key = %this.key, %error, "cache read failed, bypassing store");
                            record_store_error("get", this.store.label());
                            call_upstream(&mut *this.upstream, request)
                        }
                    }
                }
                StateProj::ReadingTtl { ttl, payload } => {
                    let remaining = match ready!(ttl.poll(cx)) {
                        Ok(remaining) => remaining,
                        Err(error) => {
                            warn!(key = %this.key, %error, "can't read entry ttl, header omitted");
                            record_store_error("ttl", this.store.label());
                            None
                        }
                    };
                    let payload = payload.take().expect(POLL_AFTER_READY_ERROR);
                    debug!(key = %this.key, ttl = ?remaining, "cache hit");
                    record_status(CacheStatus::Hit, this.store.label());
                    State::Response {
                        response: Some(hit_response(payload, remaining, &this.config)),
                    }
                }
                StateProj::PollUpstream { upstream_future } => {
                    let response = match ready!(upstream_future.poll(cx)) {
                        Ok(response) => response,
                        Err(error) => return Poll::Ready(Err(error)),
                    };
                    let capture = Capture::new(
                        this.key.clone(),
                        this.store.clone(),
                        this.config.clone(),
                        this.writes.clone(),
                    );
                    State::Capturing {
                        capture: Box::pin(capture.deliver(response)),
                    }
                }
                StateProj::Capturing { capture } => {
                    let response = match ready!(capture.poll(cx)) {
                        Ok(mut response) => {
                            record_status(CacheStatus::Miss, this.store.label());
                            response.headers_mut().insert(
                                this.config.status_header().clone(),
                                CacheStatus::Miss.header_value(),
                            );
                            response
                        }
                        Err(error) => {
                            error!(key = %this.key, %error, "can't capture response");
                            error_response(&error)
                        }
                    };
                    State::Response {
                        response: Some(response),
                    }
                }
                StateProj::Response { response } => {
                    let response = response.take().expect(POLL_AFTER_READY_ERROR);
                    return Poll::Ready(Ok(response));
                }
            };
            trace!(key = %this.key, state = state.name(), "cache state transition");
            this.state.set(state);
        }
    }
}

fn call_upstream<S, ReqBody, ResBody>(
    upstream: &mut Option<S>,
    request: Request<ReqBody>,
) -> State<S::Future, ReqBody, ResBody>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    let mut upstream = upstream.take().expect(UPSTREAM_TAKEN_ERROR);
    State::PollUpstream {
        upstream_future: upstream.call(request),
    }
}

fn hit_response<B>(
    payload: Bytes,
    remaining: Option<u64>,
    config: &CacheConfig,
) -> Response<CacheBody<B>> {
    let mut response = Response::new(CacheBody::complete(payload));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(remaining) = remaining {
        headers.insert(config.ttl_header().clone(), HeaderValue::from(remaining));
    }
    headers.insert(config.status_header().clone(), CacheStatus::Hit.header_value());
    response
}

fn error_response<B>(error: &CacheError) -> Response<CacheBody<B>> {
    let body = serde_json::json!({ "error": error.to_string() }).to_string();
    let mut response = Response::new(CacheBody::complete(body));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
