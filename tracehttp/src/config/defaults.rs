//! Client-level defaults.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Intercept;
use crate::redirect::DEFAULT_MAX_REDIRECTS;

/// Default timeout for establishing a TCP connection.
pub(crate) const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// The configuration model shared by every call made through a client.
///
/// Built by [`ClientBuilder`](crate::ClientBuilder) and never mutated
/// afterwards. Calls read it through a shared reference and derive their own
/// [`TransportSettings`](crate::config::TransportSettings) from it.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL joined with each request path.
    pub(crate) base_url: String,
    /// Client-level User-Agent, used when the caller sets none.
    pub(crate) user_agent: Option<String>,
    /// Default timeout. `None` means no timeout.
    pub(crate) timeout: Option<Duration>,
    /// Default fixed proxy URL.
    pub(crate) proxy: Option<String>,
    /// Disable proxying (including environment proxies) by default.
    pub(crate) no_proxy: bool,
    /// Skip certificate validation for every call.
    pub(crate) danger_accept_invalid_certs: bool,
    /// Custom TLS configuration (roots, client auth).
    pub(crate) tls_config: Option<Arc<rustls::ClientConfig>>,
    /// Timeout for establishing the TCP connection.
    pub(crate) connect_timeout: Duration,
    /// Redirects followed per call. Zero disables following.
    pub(crate) max_redirects: usize,
    /// Interceptors in execution order.
    pub(crate) interceptors: Arc<[Arc<dyn Intercept>]>,
}

impl ClientConfig {
    pub(crate) fn new(base_url: String) -> Self {
        Self {
            base_url,
            user_agent: None,
            timeout: None,
            proxy: None,
            no_proxy: false,
            danger_accept_invalid_certs: false,
            tls_config: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            interceptors: Arc::from(Vec::new()),
        }
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the client-level User-Agent override.
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// Get the default timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Get the default fixed proxy URL.
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref().filter(|p| !p.is_empty())
    }

    /// Check whether proxying is disabled by default.
    pub fn is_no_proxy(&self) -> bool {
        self.no_proxy
    }

    /// Check whether certificate validation is skipped for every call.
    pub fn accepts_invalid_certs(&self) -> bool {
        self.danger_accept_invalid_certs
    }

    /// Get the number of redirects followed per call.
    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    /// Number of registered interceptors.
    pub fn interceptor_count(&self) -> usize {
        self.interceptors.len()
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("user_agent", &self.user_agent)
            .field("timeout", &self.timeout)
            .field("proxy", &self.proxy)
            .field("no_proxy", &self.no_proxy)
            .field("danger_accept_invalid_certs", &self.danger_accept_invalid_certs)
            .field("tls_config", &self.tls_config.is_some())
            .field("connect_timeout", &self.connect_timeout)
            .field("max_redirects", &self.max_redirects)
            .field("interceptor_count", &self.interceptors.len())
            .finish()
    }
}
