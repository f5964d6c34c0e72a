//! Per-call execution context and chain executor.

use std::sync::Arc;

use futures::future::{self, BoxFuture};

use crate::ClientError;
use crate::config::Intercept;
use crate::request::Request;
use crate::response::{Response, ResponseHead};
use crate::transport::TransportBody;

/// Mutable state of one call.
///
/// A context is created fresh by [`Client::execute`](crate::Client::execute),
/// owned by that call alone and dropped when it returns. It carries:
///
/// - the caller's [`Request`] and the [`Response`] being built;
/// - the native outbound request, until the network step sends it;
/// - the native response head, once it has been received;
/// - the interceptor chain and a cursor into it.
///
/// The chain is immutable. The cursor only moves forward, one step per
/// [`next`](Self::next) call.
pub struct CallContext {
    request: Request,
    response: Response,
    http_request: Option<http::Request<TransportBody>>,
    chain: Vec<Arc<dyn Intercept>>,
    cursor: usize,
}

impl CallContext {
    pub(crate) fn new(
        request: Request,
        http_request: http::Request<TransportBody>,
        chain: Vec<Arc<dyn Intercept>>,
    ) -> Self {
        Self {
            request,
            response: Response::default(),
            http_request: Some(http_request),
            chain,
            cursor: 0,
        }
    }

    /// Run the next step of the chain.
    ///
    /// Returns once that step, and everything it yields to, has finished.
    /// Past the end of the chain this is a no-op that returns `Ok(())`.
    pub fn next(&mut self) -> BoxFuture<'_, Result<(), ClientError>> {
        let Some(step) = self.chain.get(self.cursor).cloned() else {
            return Box::pin(future::ready(Ok(())));
        };
        self.cursor += 1;
        Box::pin(async move { step.intercept(self).await })
    }

    /// Number of chain steps entered so far.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Check whether every step of the chain has been entered.
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.chain.len()
    }

    /// The caller's request envelope.
    ///
    /// Its body has already been moved into the native outbound request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Mutable access to the caller's request envelope.
    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    /// The response being built.
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Mutable access to the response being built.
    ///
    /// A short-circuiting interceptor can fill this in instead of letting the
    /// network step run.
    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// The native outbound request, if it has not been sent yet.
    pub fn http_request(&self) -> Option<&http::Request<TransportBody>> {
        self.http_request.as_ref()
    }

    /// Mutable access to the native outbound request, if it has not been sent.
    pub fn http_request_mut(&mut self) -> Option<&mut http::Request<TransportBody>> {
        self.http_request.as_mut()
    }

    /// The native response head, once received.
    pub fn http_response(&self) -> Option<&ResponseHead> {
        self.response.head()
    }

    pub(crate) fn take_http_request(&mut self) -> Option<http::Request<TransportBody>> {
        self.http_request.take()
    }

    /// Finish the call, handing the request envelope back through the response.
    pub(crate) fn into_response(self) -> Response {
        let mut response = self.response;
        response.request = Some(self.request);
        response
    }
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("request", &self.request)
            .field("response", &self.response)
            .field("http_request", &self.http_request)
            .field("chain_len", &self.chain.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}
