//! HTTP client with ordered interceptors and connection phase tracing.
//!
//! ## Features
//!
//! - Onion-style interceptors that continue the call with an explicit
//!   [`CallContext::next`] and may short-circuit it
//! - Per-call transport overrides (timeout, proxy, certificate validation)
//!   merged with client defaults on every call
//! - Phase timing for DNS, TCP connect, TLS handshake, download and total
//! - Redirect following, up to 10 hops by default
//! - HTTP/1.1 and HTTP/2 (negotiated via ALPN) over hyper
//! - JSON, XML and text response helpers
//!
//! ## Example
//!
//! ```ignore
//! use tracehttp::{Client, Request};
//!
//! let client = Client::builder("https://api.example.com")
//!     .build()?;
//!
//! let response = client
//!     .execute(Request::get("/users").query("page", "2"))
//!     .await?;
//!
//! println!("{:?}: {}", response.status(), response.text());
//! ```
//!
//! ## Interceptors
//!
//! Interceptors run in registration order. Each one receives the
//! [`CallContext`] and continues the chain by awaiting `ctx.next()`; code after
//! that runs once every later interceptor and the network call are done.
//!
//! ```ignore
//! use tracehttp::{Client, HeaderInterceptor, Interceptor};
//!
//! let timing = Interceptor::new(|ctx| {
//!     Box::pin(async move {
//!         let start = std::time::Instant::now();
//!         let result = ctx.next().await;
//!         println!("{} took {:?}", ctx.request().uri(), start.elapsed());
//!         result
//!     })
//! });
//!
//! let client = Client::builder("https://api.example.com")
//!     .with_interceptor(timing)
//!     .with_interceptor(HeaderInterceptor::new("authorization", "Bearer token123")?)
//!     .build()?;
//! ```
//!
//! An interceptor that returns without calling `next` short-circuits the call:
//! no later interceptor runs and nothing is sent. A panic inside the chain is
//! caught and returned as [`ClientError::Interceptor`].
//!
//! ## Phase Tracing
//!
//! Register a [`TraceInterceptor`] to get a [`Trace`] on every response:
//!
//! ```ignore
//! use tracehttp::{Client, TraceInterceptor};
//!
//! let client = Client::builder("https://example.com")
//!     .with_interceptor(TraceInterceptor::new())
//!     .build()?;
//!
//! let response = client.get("/").await?;
//! let trace = response.trace().unwrap();
//! println!(
//!     "dns={:?} connect={:?} tls={:?} download={:?} total={:?}",
//!     trace.dns, trace.connect, trace.tls_handshake, trace.download, trace.total
//! );
//! ```
//!
//! Phases that do not happen are zero: DNS for IP literals, TLS for plain
//! HTTP, and download when the call fails before the response head arrives.
//!
//! ## Per-call Options
//!
//! ```ignore
//! use tracehttp::{CallOptions, Request};
//! use std::time::Duration;
//!
//! let request = Request::get("/report").options(
//!     CallOptions::new()
//!         .timeout(Duration::from_secs(60))
//!         .proxy("http://proxy.internal:3128"),
//! );
//! let response = client.execute(request).await?;
//! ```
//!
//! Settings resolve per call:
//!
//! | Setting | Resolution |
//! |---------|------------|
//! | timeout | call timeout, else client timeout, else none |
//! | certificate validation | skipped if either the call or the client skips it |
//! | proxy | call `no_proxy`, call `proxy`, client `no_proxy`, client `proxy`, then environment |
//!
//! Environment proxies come from `HTTP_PROXY`, `HTTPS_PROXY`, `ALL_PROXY` and
//! `NO_PROXY` (and their lowercase forms). HTTPS through a proxy uses a
//! `CONNECT` tunnel.
//!
//! ## Redirects
//!
//! `301`, `302` and `303` are followed with a bodiless `GET`; `307` and `308`
//! resend the original method and a buffered body. Credentials are dropped
//! when a redirect leaves the original host and its subdomains. Use
//! [`ClientBuilder::max_redirects`] to change the limit, or `0` to receive
//! redirect responses as they are.
//!
//! ## Cancellation
//!
//! ```ignore
//! use tracehttp::{Cancellation, Request};
//! use tokio_util::sync::CancellationToken;
//!
//! let token = CancellationToken::new();
//! let request = Request::get("/stream").cancellation(Cancellation::new(token.clone()));
//!
//! // token.cancel() elsewhere aborts the call with ClientError::Canceled.
//! ```
//!
//! ## TLS
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `tls` (default) | `tls-ring` + `tls-native-roots` |
//! | `tls-ring` | ring crypto provider |
//! | `tls-aws-lc` | AWS LC crypto provider |
//! | `tls-native-roots` | system root certificates |
//! | `tls-webpki-roots` | bundled Mozilla root certificates |
//! | `tracing` | `http.call` spans and debug events |
//!
//! A custom [`TlsClientConfig`] can be passed with
//! [`ClientBuilder::tls_config`].

mod builder;
mod client;
pub mod config;
mod context;
mod error;
mod redirect;
pub mod request;
pub mod response;
pub mod trace;
pub mod transport;

pub use builder::{ClientBuildError, ClientBuilder};
pub use client::{Client, default_user_agent};
pub use context::CallContext;
pub use error::ClientError;

// Re-export from config module
pub use config::{
    CallOptions, ClientConfig, HeaderInterceptor, Intercept, Interceptor, TransportSettings,
};

// Re-export from request module
pub use request::{Cancellation, Request};

// Re-export from response module
pub use response::{RequestHead, Response, ResponseHead};

// Re-export from trace module
pub use trace::{PhaseEvent, PhaseKind, PhaseRecorder, Trace, TraceInterceptor};

// Re-export transport types at the top level for convenience
pub use transport::{TlsClientConfig, TransportBody};

pub use bytes::Bytes;
