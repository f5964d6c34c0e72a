//! Per-call hyper client.
//!
//! Every call gets its own [`CallTransport`], built from that call's resolved
//! [`TransportSettings`]. Nothing is shared with other calls, so per-call
//! proxy and TLS overrides never leak between concurrent calls.

use std::error::Error as StdError;

use http::Uri;
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};

use super::body::TransportBody;
use super::connector::tls_config_for;
use super::traced::TracedConnector;
use crate::ClientError;
use crate::config::TransportSettings;
use crate::trace::PhaseRecorder;

type HyperClient = Client<TracedConnector, TransportBody>;

/// A private hyper client bound to one call's settings.
#[derive(Clone)]
pub(crate) struct CallTransport {
    client: HyperClient,
}

impl std::fmt::Debug for CallTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallTransport").finish_non_exhaustive()
    }
}

impl CallTransport {
    /// Build the transport for a call to `dst`.
    ///
    /// TLS configuration is only loaded for `https` destinations.
    pub(crate) fn new(
        settings: &TransportSettings,
        dst: &Uri,
        recorder: Option<PhaseRecorder>,
    ) -> Result<Self, ClientError> {
        let tls = match dst.scheme_str() {
            Some("https") => Some(tls_config_for(settings)?),
            _ => None,
        };

        let connector = TracedConnector::new(
            settings.proxy.clone(),
            tls,
            settings.connect_timeout,
            recorder,
        );

        // The transport lives for one call; idle connections would only leak.
        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(0)
            .build(connector);

        Ok(Self { client })
    }

    /// Send the request and wait for the response head.
    pub(crate) async fn request(
        &self,
        request: http::Request<TransportBody>,
    ) -> Result<http::Response<Incoming>, ClientError> {
        self.client.request(request).await.map_err(from_hyper)
    }
}

/// Surface the connector's own error when hyper wraps it.
fn from_hyper(err: hyper_util::client::legacy::Error) -> ClientError {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(inner) = cause.downcast_ref::<ClientError>() {
            return inner.clone();
        }
        source = cause.source();
    }

    match err.source() {
        Some(cause) => ClientError::Transport(format!("{err}: {cause}")),
        None => ClientError::Transport(err.to_string()),
    }
}
