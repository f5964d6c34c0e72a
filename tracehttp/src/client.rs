//! HTTP client implementation.
//!
//! This module provides the [`Client`] type and its call driver,
//! [`Client::execute`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use http::header::{CONTENT_TYPE, PROXY_AUTHORIZATION, USER_AGENT};
use http::{HeaderValue, Uri};
use http_body_util::BodyExt;
use serde::Serialize;
#[cfg(feature = "tracing")]
use tracing::{Instrument, info_span};

use crate::ClientError;
use crate::builder::ClientBuilder;
use crate::config::{ClientConfig, Intercept, ProxyRoute, TransportSettings};
use crate::context::CallContext;
use crate::redirect::Redirects;
use crate::request::{Cancellation, Request, join_url, overlay_query};
use crate::response::{RequestHead, Response};
use crate::trace::{PhaseKind, PhaseRecorder};
use crate::transport::{CallTransport, TransportBody};

/// The User-Agent sent when neither the caller nor the client sets one.
///
/// Identifies this library and the platform it runs on, e.g.
/// `tracehttp/0.1.0 linux x86_64`.
pub fn default_user_agent() -> String {
    format!(
        "tracehttp/{} {} {}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// HTTP client.
///
/// Holds the configuration model shared by every call: base URL, defaults
/// for timeout, proxy and certificate validation, and the ordered
/// interceptor list. Cloning is cheap and clones share the configuration.
///
/// Each call resolves its own transport settings and runs on a private
/// connection, so concurrent calls with different [`CallOptions`](crate::CallOptions)
/// never affect each other.
///
/// Use [`ClientBuilder`] or [`Client::builder`] to create an instance.
///
/// # Example
///
/// ```ignore
/// use tracehttp::{Client, Request};
///
/// let client = Client::builder("https://api.example.com")
///     .user_agent("my-app/1.0")
///     .build()?;
///
/// let response = client.execute(Request::get("/v1/status")).await?;
/// println!("{}", response.text());
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
}

impl Client {
    /// Create a new ClientBuilder with the given base URL.
    ///
    /// This is a convenience method equivalent to `ClientBuilder::new(base_url)`.
    pub fn builder<S: Into<String>>(base_url: S) -> ClientBuilder {
        ClientBuilder::new(base_url)
    }

    /// Create a new Client.
    ///
    /// This is called by [`ClientBuilder::build`]. Prefer using the builder API.
    pub(crate) fn new(config: ClientConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Get the configuration model.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Perform a call.
    ///
    /// Runs the client's interceptors in order around a terminal step that
    /// sends the request and reads the whole response body. A panic anywhere
    /// in the chain is caught and returned as [`ClientError::Interceptor`].
    ///
    /// Errors from building the request (bad URL, bad header) are returned
    /// before any interceptor runs or any network I/O happens.
    pub async fn execute(&self, request: Request) -> Result<Response, ClientError> {
        #[cfg(feature = "tracing")]
        let span = info_span!(
            "http.call",
            http.method = %request.method(),
            url.path = %request.uri(),
            otel.kind = "client",
        );

        let call = AssertUnwindSafe(self.run(request)).catch_unwind();
        #[cfg(feature = "tracing")]
        let call = call.instrument(span);

        match call.await {
            Ok(result) => result,
            Err(payload) => {
                let err = ClientError::from_panic(payload);
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %err, "interceptor panicked");
                Err(err)
            }
        }
    }

    async fn run(&self, mut request: Request) -> Result<Response, ClientError> {
        if let Some(err) = request.error.take() {
            return Err(err);
        }

        let cancellation = request
            .cancellation
            .get_or_insert_with(Cancellation::background)
            .clone();

        let url = join_url(&self.config.base_url, &request.uri);
        let uri = overlay_query(&url, &request.query)?;
        let http_request = self.build_http_request(&mut request, uri)?;

        let settings = TransportSettings::resolve(&self.config, &request.options)?;

        let mut chain: Vec<Arc<dyn Intercept>> = self.config.interceptors.to_vec();
        chain.push(Arc::new(NetworkStep {
            settings,
            cancellation,
            max_redirects: self.config.max_redirects,
        }));

        let mut ctx = CallContext::new(request, http_request, chain);
        ctx.next().await?;
        Ok(ctx.into_response())
    }

    /// Build the native request, moving the body out of `request`.
    fn build_http_request(
        &self,
        request: &mut Request,
        uri: Uri,
    ) -> Result<http::Request<TransportBody>, ClientError> {
        let mut headers = request.headers.clone();
        if !headers.contains_key(USER_AGENT) {
            let user_agent = match self.config.user_agent() {
                Some(ua) => HeaderValue::from_str(ua),
                None => HeaderValue::from_str(&default_user_agent()),
            }
            .map_err(|e| ClientError::InvalidRequest(format!("invalid user agent: {e}")))?;
            headers.insert(USER_AGENT, user_agent);
        }

        let mut http_request = http::Request::new(request.take_body());
        *http_request.method_mut() = request.method.clone();
        *http_request.uri_mut() = uri;
        *http_request.headers_mut() = headers;
        Ok(http_request)
    }

    /// Send a GET request.
    pub async fn get(&self, uri: &str) -> Result<Response, ClientError> {
        self.execute(Request::get(uri)).await
    }

    /// Send a POST request with the given content type and body.
    pub async fn post<B: Into<TransportBody>>(
        &self,
        uri: &str,
        content_type: &str,
        body: B,
    ) -> Result<Response, ClientError> {
        let request = Request::post(uri)
            .header(CONTENT_TYPE, content_type)
            .body(body);
        self.execute(request).await
    }

    /// Send a POST request with `value` serialized as JSON.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        uri: &str,
        value: &T,
    ) -> Result<Response, ClientError> {
        let body = serde_json::to_vec(value).map_err(|e| ClientError::Encode(e.to_string()))?;
        self.post(uri, "application/json", body).await
    }

    /// Send a POST request with `value` serialized as a URL-encoded form.
    pub async fn post_form<T: Serialize + ?Sized>(
        &self,
        uri: &str,
        value: &T,
    ) -> Result<Response, ClientError> {
        let body =
            serde_urlencoded::to_string(value).map_err(|e| ClientError::Encode(e.to_string()))?;
        self.post(uri, "application/x-www-form-urlencoded", body)
            .await
    }
}

/// The terminal step of every chain: sends the request on a private
/// transport, follows redirects and reads the whole body.
struct NetworkStep {
    settings: TransportSettings,
    cancellation: Cancellation,
    max_redirects: usize,
}

impl Intercept for NetworkStep {
    fn intercept<'a>(
        &'a self,
        ctx: &'a mut CallContext,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        Box::pin(async move {
            let Some(mut http_request) = ctx.take_http_request() else {
                return Err(ClientError::InvalidRequest(
                    "request has already been sent".into(),
                ));
            };
            let recorder = http_request.extensions().get::<PhaseRecorder>().cloned();
            let mut redirects = Redirects::new(self.max_redirects, &http_request);
            let mut sent = RequestHead::from_request(&http_request);

            let exchange = async {
                let (parts, body) = loop {
                    self.authorize_proxy(&mut http_request);
                    sent = RequestHead::from_request(&http_request);

                    let transport =
                        CallTransport::new(&self.settings, http_request.uri(), recorder.clone())?;
                    let request = clone_for_send(&mut http_request);
                    let response = transport.request(request).await?;

                    if let Some(next) =
                        redirects.next(&http_request, response.status(), response.headers())?
                    {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(
                            status = %response.status(),
                            location = %next.uri,
                            "following redirect"
                        );
                        if let Some(recorder) = &recorder {
                            recorder.record(PhaseKind::Redirect);
                        }
                        redirects.apply(&mut http_request, next);
                        continue;
                    }

                    if let Some(recorder) = &recorder {
                        recorder.record(PhaseKind::FirstByte);
                    }
                    break response.into_parts();
                };

                let body = body
                    .collect()
                    .await
                    .map_err(|e| ClientError::Body(e.to_string()))?
                    .to_bytes();
                Ok::<_, ClientError>((parts, body))
            };

            let exchange = async {
                match self.settings.timeout {
                    Some(timeout) => tokio::time::timeout(timeout, exchange)
                        .await
                        .unwrap_or(Err(ClientError::Timeout)),
                    None => exchange.await,
                }
            };

            let outcome = self.cancellation.guard(exchange).await;
            ctx.response_mut().request_head = Some(sent);
            let (parts, body) = outcome?;

            #[cfg(feature = "tracing")]
            tracing::debug!(status = %parts.status, bytes = body.len(), "response received");

            let response = ctx.response_mut();
            response.head = Some(parts.into());
            response.body = body;
            Ok(())
        })
    }
}

impl NetworkStep {
    /// Plain HTTP goes to the proxy in absolute form and carries the proxy
    /// credentials itself; https credentials travel in the CONNECT request.
    fn authorize_proxy(&self, request: &mut http::Request<TransportBody>) {
        if request.uri().scheme_str() != Some("http") {
            return;
        }
        if let ProxyRoute::Proxy(target) = self.settings.proxy.route(request.uri()) {
            if let Some(auth) = target.auth() {
                request
                    .headers_mut()
                    .entry(PROXY_AUTHORIZATION)
                    .or_insert_with(|| auth.clone());
            }
        }
    }
}

/// Split off the request for one hop, leaving `request` with the same head
/// and an empty body so a redirect can rewrite it.
fn clone_for_send(request: &mut http::Request<TransportBody>) -> http::Request<TransportBody> {
    let mut hop = http::Request::new(std::mem::take(request.body_mut()));
    *hop.method_mut() = request.method().clone();
    *hop.uri_mut() = request.uri().clone();
    *hop.version_mut() = request.version();
    *hop.headers_mut() = request.headers().clone();
    *hop.extensions_mut() = request.extensions().clone();
    hop
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body::Body as _;

    fn client(user_agent: Option<&str>) -> Client {
        let mut builder = Client::builder("http://localhost:8080/api/");
        if let Some(ua) = user_agent {
            builder = builder.user_agent(ua);
        }
        builder.build().unwrap()
    }

    fn native(client: &Client, request: Request) -> http::Request<TransportBody> {
        let mut request = request;
        let uri: Uri = "http://localhost:8080/api/x".parse().unwrap();
        client.build_http_request(&mut request, uri).unwrap()
    }

    #[test]
    fn test_default_user_agent_names_library_and_platform() {
        let ua = default_user_agent();
        assert!(ua.starts_with("tracehttp/"));
        assert!(ua.contains(std::env::consts::OS));
        assert!(ua.ends_with(std::env::consts::ARCH));
    }

    #[test]
    fn test_user_agent_precedence() {
        let req = native(&client(None), Request::get("/x"));
        assert_eq!(req.headers()[USER_AGENT], default_user_agent().as_str());

        let req = native(&client(Some("app/2")), Request::get("/x"));
        assert_eq!(req.headers()[USER_AGENT], "app/2");

        let req = native(
            &client(Some("app/2")),
            Request::get("/x").header(USER_AGENT, "caller/3"),
        );
        assert_eq!(req.headers()[USER_AGENT], "caller/3");
    }

    #[test]
    fn test_multi_value_headers_are_copied() {
        let request = Request::post("/x")
            .header("x-tag", "a")
            .header("x-tag", "b")
            .body("payload");
        let req = native(&client(None), request);

        let tags: Vec<_> = req.headers().get_all("x-tag").iter().collect();
        assert_eq!(tags, ["a", "b"]);
        assert_eq!(req.method(), http::Method::POST);
        assert_eq!(req.body().size_hint().exact(), Some(7));
    }

    #[tokio::test]
    async fn test_invalid_url_fails_before_chain() {
        let client = Client::builder("")
            .with_interceptor(crate::config::Interceptor::new(|_ctx| {
                Box::pin(async { Err::<(), _>(ClientError::Interceptor("ran".into())) })
            }))
            .build()
            .unwrap();

        let err = client.execute(Request::get("not a url")).await.unwrap_err();
        assert!(err.is_request());
    }

    #[tokio::test]
    async fn test_deferred_header_error_is_returned() {
        let err = client(None)
            .execute(Request::get("/x").header("bad header", "v"))
            .await
            .unwrap_err();
        assert!(err.is_request());
    }

    #[tokio::test]
    async fn test_unserializable_json_is_encode_error() {
        use std::collections::HashMap;

        // JSON object keys must be strings.
        let mut value = HashMap::new();
        value.insert(vec![1u8], 1);
        let err = client(None).post_json("/x", &value).await.unwrap_err();
        assert!(matches!(err, ClientError::Encode(_)));
    }
}
