//! Request envelope.
//!
//! [`Request`] is what a caller hands to [`Client::execute`](crate::Client::execute):
//! method, headers, a path joined with the client's base URL, query
//! parameters, body, cancellation handle and per-call transport overrides.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use http::uri::{PathAndQuery, Scheme};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::ClientError;
use crate::config::CallOptions;
use crate::transport::TransportBody;

// ============================================================================
// Cancellation
// ============================================================================

/// Cancellation and deadline handle for one call.
///
/// Cancelling the token, or reaching the deadline, aborts the in-flight
/// network call. No partial body is returned.
///
/// # Example
///
/// ```ignore
/// use tracehttp::{Cancellation, Request};
/// use std::time::Duration;
///
/// let cancel = Cancellation::background().with_timeout(Duration::from_secs(2));
/// let token = cancel.token().clone();
///
/// let request = Request::get("/slow").cancellation(cancel);
/// // token.cancel() from another task aborts the call
/// ```
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Cancellation {
    /// A handle that never fires unless its token is cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// Wrap an existing cancellation token.
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Set an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// The underlying cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Check whether the handle has already fired.
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| d <= Instant::now())
    }

    /// Run `fut` until it completes, the token is cancelled or the deadline
    /// passes, whichever comes first.
    pub(crate) async fn guard<T, F>(&self, fut: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(ClientError::Canceled),
            _ = deadline => Err(ClientError::Timeout),
            result = fut => result,
        }
    }
}

// ============================================================================
// Request
// ============================================================================

/// A call envelope.
///
/// # Example
///
/// ```ignore
/// use tracehttp::{CallOptions, Request};
/// use std::time::Duration;
///
/// let request = Request::get("/search")
///     .header("accept", "application/json")
///     .query("q", "rust")
///     .options(CallOptions::new().timeout(Duration::from_secs(3)));
///
/// let response = client.execute(request).await?;
/// ```
#[derive(Debug, Default)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) headers: HeaderMap,
    pub(crate) uri: String,
    pub(crate) query: BTreeMap<String, String>,
    pub(crate) body: TransportBody,
    pub(crate) cancellation: Option<Cancellation>,
    pub(crate) options: CallOptions,
    /// First construction error, reported when the call is executed.
    pub(crate) error: Option<ClientError>,
}

impl Request {
    /// Create a request with the given method and path.
    ///
    /// The path is joined with the client's base URL. With an empty base URL
    /// it must be an absolute `http://` or `https://` URL.
    pub fn new<S: Into<String>>(method: Method, uri: S) -> Self {
        Self {
            method,
            uri: uri.into(),
            ..Default::default()
        }
    }

    /// Create a `GET` request.
    pub fn get<S: Into<String>>(uri: S) -> Self {
        Self::new(Method::GET, uri)
    }

    /// Create a `POST` request.
    pub fn post<S: Into<String>>(uri: S) -> Self {
        Self::new(Method::POST, uri)
    }

    /// Create a `PUT` request.
    pub fn put<S: Into<String>>(uri: S) -> Self {
        Self::new(Method::PUT, uri)
    }

    /// Create a `DELETE` request.
    pub fn delete<S: Into<String>>(uri: S) -> Self {
        Self::new(Method::DELETE, uri)
    }

    /// Append a header value.
    ///
    /// An invalid name or value is not reported here; the call fails with
    /// [`ClientError::InvalidRequest`] before any network I/O.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        K::Error: std::fmt::Display,
        V: TryInto<HeaderValue>,
        V::Error: std::fmt::Display,
    {
        let name = match name.try_into() {
            Ok(name) => name,
            Err(e) => return self.fail(format!("invalid header name: {e}")),
        };
        let value = match value.try_into() {
            Ok(value) => value,
            Err(e) => return self.fail(format!("invalid header value: {e}")),
        };
        self.headers.append(name, value);
        self
    }

    /// Replace all headers.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set a query parameter, replacing any previous value for the key.
    pub fn query<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Set the request body.
    pub fn body<B: Into<TransportBody>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    /// Attach a cancellation/deadline handle.
    pub fn cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// Set the per-call transport overrides.
    pub fn options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    fn fail(mut self, message: String) -> Self {
        self.error.get_or_insert(ClientError::InvalidRequest(message));
        self
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Mutable access to the request method.
    pub fn method_mut(&mut self) -> &mut Method {
        &mut self.method
    }

    /// The request headers.
    pub fn get_headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the request headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The path (or absolute URL) of this request.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The query parameters, ordered by key.
    pub fn get_query(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    /// Mutable access to the query parameters.
    pub fn query_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.query
    }

    /// The cancellation handle, if one was attached or defaulted.
    pub fn get_cancellation(&self) -> Option<&Cancellation> {
        self.cancellation.as_ref()
    }

    /// The per-call transport overrides.
    pub fn get_options(&self) -> &CallOptions {
        &self.options
    }

    pub(crate) fn take_body(&mut self) -> TransportBody {
        std::mem::take(&mut self.body)
    }
}

// ============================================================================
// URL helpers
// ============================================================================

/// Join a base URL and a path with exactly one `/` between them.
///
/// An empty base URL leaves the path untouched.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    if base.is_empty() {
        return path.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Parse `url` and overlay `query` on the query string it already carries.
///
/// Keys in `query` replace every existing value for that key; other existing
/// pairs are kept. The resulting query string is ordered by key.
pub(crate) fn overlay_query(
    url: &str,
    query: &BTreeMap<String, String>,
) -> Result<Uri, ClientError> {
    let uri: Uri = url
        .parse()
        .map_err(|e| ClientError::InvalidRequest(format!("invalid url {url:?}: {e}")))?;

    let scheme = uri.scheme().cloned();
    if scheme != Some(Scheme::HTTP) && scheme != Some(Scheme::HTTPS) {
        return Err(ClientError::InvalidRequest(format!(
            "url {url:?} must be absolute with an http or https scheme"
        )));
    }
    if uri.host().is_none_or(str::is_empty) {
        return Err(ClientError::InvalidRequest(format!("url {url:?} has no host")));
    }

    if query.is_empty() && uri.query().is_none() {
        return Ok(uri);
    }

    let mut merged: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if let Some(existing) = uri.query() {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(existing)
            .map_err(|e| ClientError::InvalidRequest(format!("invalid query in {url:?}: {e}")))?;
        for (key, value) in pairs {
            merged.entry(key).or_default().push(value);
        }
    }
    for (key, value) in query {
        merged.insert(key.clone(), vec![value.clone()]);
    }

    let flat: Vec<(&str, &str)> = merged
        .iter()
        .flat_map(|(key, values)| values.iter().map(move |v| (key.as_str(), v.as_str())))
        .collect();
    let encoded = serde_urlencoded::to_string(&flat)
        .map_err(|e| ClientError::InvalidRequest(format!("failed to encode query: {e}")))?;

    let path = uri.path().to_string();
    let mut parts = uri.into_parts();
    let path_and_query: PathAndQuery = format!("{path}?{encoded}")
        .parse()
        .map_err(|e| ClientError::InvalidRequest(format!("invalid path and query: {e}")))?;
    parts.path_and_query = Some(path_and_query);

    Uri::from_parts(parts).map_err(ClientError::invalid_request)
}
