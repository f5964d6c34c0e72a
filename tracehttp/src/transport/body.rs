//! Outbound request body.
//!
//! A [`TransportBody`] is either buffered or streamed. Buffered bodies can be
//! replayed, which is what lets a `307`/`308` redirect resend them; streamed
//! bodies are sent once.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;

use crate::ClientError;

type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

pin_project! {
    #[project = SourceProj]
    enum Source {
        Buffered {
            data: Bytes,
            sent: bool,
        },
        Streamed {
            #[pin]
            chunks: ChunkStream,
        },
    }
}

pin_project! {
    /// Body of an outbound request. Defaults to empty.
    pub struct TransportBody {
        #[pin]
        source: Source,
    }
}

impl TransportBody {
    /// An empty body.
    pub fn empty() -> Self {
        Self::full(Bytes::new())
    }

    /// A buffered body.
    pub fn full<B: Into<Bytes>>(data: B) -> Self {
        Self {
            source: Source::Buffered {
                data: data.into(),
                sent: false,
            },
        }
    }

    /// A body read from `stream` as it is sent. It cannot be replayed.
    pub fn streaming<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, ClientError>> + Send + 'static,
    {
        Self {
            source: Source::Streamed {
                chunks: Box::pin(stream),
            },
        }
    }

    /// Check whether this body is known to carry no bytes.
    pub fn is_empty(&self) -> bool {
        matches!(&self.source, Source::Buffered { data, .. } if data.is_empty())
    }

    /// Length of a buffered body. `None` for streamed bodies.
    pub fn content_length(&self) -> Option<u64> {
        match &self.source {
            Source::Buffered { data, .. } => Some(data.len() as u64),
            Source::Streamed { .. } => None,
        }
    }

    /// A fresh copy of a buffered body, whether or not this one was sent.
    ///
    /// Returns `None` for streamed bodies.
    pub fn try_clone(&self) -> Option<Self> {
        match &self.source {
            Source::Buffered { data, .. } => Some(Self::full(data.clone())),
            Source::Streamed { .. } => None,
        }
    }
}

impl Body for TransportBody {
    type Data = Bytes;
    type Error = ClientError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, ClientError>>> {
        match self.project().source.project() {
            SourceProj::Buffered { data, sent } => {
                if *sent || data.is_empty() {
                    return Poll::Ready(None);
                }
                *sent = true;
                Poll::Ready(Some(Ok(Frame::data(data.clone()))))
            }
            SourceProj::Streamed { chunks } => chunks
                .poll_next(cx)
                .map(|next| next.map(|chunk| chunk.map(Frame::data))),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.source {
            Source::Buffered { data, sent } => *sent || data.is_empty(),
            Source::Streamed { .. } => false,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.source {
            Source::Buffered { data, sent: false } => SizeHint::with_exact(data.len() as u64),
            Source::Buffered { sent: true, .. } => SizeHint::with_exact(0),
            Source::Streamed { .. } => SizeHint::default(),
        }
    }
}

impl Default for TransportBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for TransportBody {
    fn from(data: Bytes) -> Self {
        Self::full(data)
    }
}

impl From<Vec<u8>> for TransportBody {
    fn from(data: Vec<u8>) -> Self {
        Self::full(data)
    }
}

impl From<String> for TransportBody {
    fn from(data: String) -> Self {
        Self::full(data)
    }
}

impl From<&'static str> for TransportBody {
    fn from(data: &'static str) -> Self {
        Self::full(data)
    }
}

impl std::fmt::Debug for TransportBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            Source::Buffered { data, sent } => f
                .debug_struct("TransportBody")
                .field("len", &data.len())
                .field("sent", sent)
                .finish(),
            Source::Streamed { .. } => f.write_str("TransportBody(streamed)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_default_is_empty() {
        let body = TransportBody::default();
        assert!(body.is_empty());
        assert!(body.is_end_stream());
        assert_eq!(body.content_length(), Some(0));
        assert!(body.collect().await.unwrap().to_bytes().is_empty());
    }

    #[tokio::test]
    async fn test_conversions_buffer_the_payload() {
        let body: TransportBody = "hello".into();
        assert_eq!(body.size_hint().exact(), Some(5));
        assert_eq!(body.collect().await.unwrap().to_bytes(), "hello");

        let body: TransportBody = String::from("owned").into();
        assert_eq!(body.collect().await.unwrap().to_bytes(), "owned");

        let body: TransportBody = vec![1u8, 2, 3].into();
        assert_eq!(body.content_length(), Some(3));
    }

    #[tokio::test]
    async fn test_buffered_body_replays_after_send() {
        let mut body = TransportBody::full("payload");
        let copy = body.try_clone().unwrap();

        let first = body.frame().await.unwrap().unwrap();
        assert_eq!(first.into_data().unwrap(), "payload");
        assert!(body.is_end_stream());

        let again = body.try_clone().unwrap();
        assert_eq!(again.collect().await.unwrap().to_bytes(), "payload");
        assert_eq!(copy.collect().await.unwrap().to_bytes(), "payload");
    }

    #[tokio::test]
    async fn test_streamed_body_is_sent_once() {
        let chunks = vec![Ok(Bytes::from("a")), Ok(Bytes::from("b"))];
        let body = TransportBody::streaming(futures::stream::iter(chunks));

        assert!(!body.is_empty());
        assert!(body.try_clone().is_none());
        assert_eq!(body.content_length(), None);
        assert_eq!(body.collect().await.unwrap().to_bytes(), "ab");
    }

    #[tokio::test]
    async fn test_stream_error_surfaces() {
        let chunks = vec![Ok(Bytes::from("a")), Err(ClientError::Body("source failed".into()))];
        let body = TransportBody::streaming(futures::stream::iter(chunks));

        let err = body.collect().await.unwrap_err();
        assert_eq!(err, ClientError::Body("source failed".into()));
    }
}
