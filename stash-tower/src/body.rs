//! Response body produced by the cache layer.
//!
//! - **Complete**: the body is held in memory. Used for cache hits, for
//!   captured misses (the handler's body had to be buffered to be stored) and
//!   for error responses produced by the layer.
//! - **Passthrough**: the handler's body, streamed untouched. Used for
//!   responses the layer does not capture.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use http_body::{Body as HttpBody, Frame, SizeHint};
use pin_project::pin_project;

#[pin_project(project = CacheBodyProj)]
#[derive(Debug)]
pub enum CacheBody<B> {
    /// Fully buffered body. The `Option` yields the data once, then ends the stream.
    Complete(Option<Bytes>),
    /// Body forwarded as produced by the handler.
    Passthrough(#[pin] B),
}

impl<B> CacheBody<B> {
    pub fn complete(bytes: impl Into<Bytes>) -> Self {
        Self::Complete(Some(bytes.into()))
    }
}

impl<B> HttpBody for CacheBody<B>
where
    B: HttpBody,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            CacheBodyProj::Complete(data) => match data.take() {
                Some(bytes) if !bytes.is_empty() => Poll::Ready(Some(Ok(Frame::data(bytes)))),
                _ => Poll::Ready(None),
            },
            CacheBodyProj::Passthrough(body) => match body.poll_frame(cx) {
                Poll::Ready(Some(Ok(frame))) => {
                    let frame = frame.map_data(|mut data| data.copy_to_bytes(data.remaining()));
                    Poll::Ready(Some(Ok(frame)))
                }
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            CacheBody::Complete(Some(bytes)) => SizeHint::with_exact(bytes.len() as u64),
            CacheBody::Complete(None) => SizeHint::with_exact(0),
            CacheBody::Passthrough(body) => body.size_hint(),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            CacheBody::Complete(Some(bytes)) => bytes.is_empty(),
            CacheBody::Complete(None) => true,
            CacheBody::Passthrough(body) => body.is_end_stream(),
        }
    }
}
