use bytes::Bytes;
use futures::future::BoxFuture;
use http::{Request, Response};
use pin_project::pin_project;
use stash::CacheError;
use stash_backend::StoreResult;

use crate::body::CacheBody;

/// Future answering whether a key is live.
pub type ExistsFuture = BoxFuture<'static, StoreResult<bool>>;
/// Future reading a stored payload.
pub type ReadFuture = BoxFuture<'static, StoreResult<Bytes>>;
/// Future reading the remaining lifetime of an entry.
pub type TtlFuture = BoxFuture<'static, StoreResult<Option<u64>>>;
/// Future buffering and storing the handler's response.
pub type CaptureFuture<B> = BoxFuture<'static, Result<Response<CacheBody<B>>, CacheError>>;

#[pin_project(project = StateProj)]
pub enum State<F, ReqBody, ResBody> {
    /// Key derived, store not asked yet.
    Initial { request: Option<Request<ReqBody>> },
    /// Asking the store whether the key is live.
    Checking {
        #[pin]
        exists: ExistsFuture,
        request: Option<Request<ReqBody>>,
    },
    /// Reading the payload of a live key.
    Reading {
        #[pin]
        read: ReadFuture,
        request: Option<Request<ReqBody>>,
    },
    /// Payload decoded, reading its remaining lifetime.
    ReadingTtl {
        #[pin]
        ttl: TtlFuture,
        payload: Option<Bytes>,
    },
    /// Waiting for the wrapped service.
    PollUpstream {
        #[pin]
        upstream_future: F,
    },
    /// Buffering the handler's body and issuing the store write.
    Capturing {
        #[pin]
        capture: CaptureFuture<ResBody>,
    },
    /// Final response ready to be handed out.
    Response {
        response: Option<Response<CacheBody<ResBody>>>,
    },
}

impl<F, ReqBody, ResBody> State<F, ReqBody, ResBody> {
    pub fn name(&self) -> &'static str {
        match self {
            State::Initial { .. } => "initial",
            State::Checking { .. } => "checking",
            State::Reading { .. } => "reading",
            State::ReadingTtl { .. } => "reading_ttl",
            State::PollUpstream { .. } => "poll_upstream",
            State::Capturing { .. } => "capturing",
            State::Response { .. } => "response",
        }
    }
}
