//! Response types.
//!
//! This module provides the [`Response`] envelope returned by every call,
//! along with [`RequestHead`] and [`ResponseHead`], copies of the native
//! request as sent and of the native response head as received.

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, Uri, Version};
use serde::de::DeserializeOwned;

use crate::ClientError;
use crate::request::Request;
use crate::trace::Trace;

/// The native outbound request as it was handed to the transport.
#[derive(Clone, Debug)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
}

impl RequestHead {
    pub(crate) fn from_request<B>(request: &http::Request<B>) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            version: request.version(),
            headers: request.headers().clone(),
        }
    }
}

/// The native response head.
#[derive(Clone, Debug)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
}

impl From<http::response::Parts> for ResponseHead {
    fn from(parts: http::response::Parts) -> Self {
        Self {
            status: parts.status,
            version: parts.version,
            headers: parts.headers,
        }
    }
}

/// The result of a call.
///
/// The body is read fully into memory before the call returns. Non-2xx
/// statuses are not errors; check [`status`](Self::status).
///
/// # Example
///
/// ```ignore
/// #[derive(serde::Deserialize)]
/// struct User { name: String }
///
/// let response = client.get("/users/1").await?;
/// if response.status() == Some(http::StatusCode::OK) {
///     let user: User = response.json()?;
///     println!("{}", user.name);
/// }
/// ```
#[derive(Debug, Default)]
pub struct Response {
    pub(crate) body: Bytes,
    pub(crate) request: Option<Request>,
    pub(crate) request_head: Option<RequestHead>,
    pub(crate) head: Option<ResponseHead>,
    pub(crate) trace: Option<Trace>,
}

impl Response {
    /// Create a response carrying only a body.
    ///
    /// Useful for interceptors that answer a call without the network.
    pub fn from_bytes<B: Into<Bytes>>(body: B) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// The raw body.
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Consume the response and return the raw body.
    pub fn into_bytes(self) -> Bytes {
        self.body
    }

    /// Replace the body.
    pub fn set_body<B: Into<Bytes>>(&mut self, body: B) {
        self.body = body.into();
    }

    /// The body as text. Invalid UTF-8 is replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_slice(&self.body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Deserialize the body as XML.
    pub fn xml<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        let text = std::str::from_utf8(&self.body).map_err(|e| ClientError::Decode(e.to_string()))?;
        quick_xml::de::from_str(text).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// HTTP status, if a response was received.
    pub fn status(&self) -> Option<StatusCode> {
        self.head.as_ref().map(|h| h.status)
    }

    /// Response headers, if a response was received.
    pub fn headers(&self) -> Option<&HeaderMap> {
        self.head.as_ref().map(|h| &h.headers)
    }

    /// The request this response answers.
    ///
    /// Its body has been consumed by the call.
    pub fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    /// The native request as sent.
    pub fn request_head(&self) -> Option<&RequestHead> {
        self.request_head.as_ref()
    }

    /// The native response head.
    pub fn head(&self) -> Option<&ResponseHead> {
        self.head.as_ref()
    }

    /// Set the native response head.
    pub fn set_head(&mut self, head: ResponseHead) {
        self.head = Some(head);
    }

    /// Phase durations, when a [`TraceInterceptor`](crate::TraceInterceptor)
    /// ran for this call.
    pub fn trace(&self) -> Option<&Trace> {
        self.trace.as_ref()
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        name: String,
        age: u32,
    }

    #[test]
    fn test_json() {
        let response = Response::from_bytes(r#"{"name":"ada","age":36}"#);
        let user: User = response.json().unwrap();
        assert_eq!(
            user,
            User {
                name: "ada".into(),
                age: 36
            }
        );
    }

    #[test]
    fn test_json_mismatch_is_decode_error() {
        let response = Response::from_bytes(r#"{"name":"ada"}"#);
        let err = response.json::<User>().unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }

    #[test]
    fn test_xml() {
        let response = Response::from_bytes("<user><name>ada</name><age>36</age></user>");
        let user: User = response.xml().unwrap();
        assert_eq!(user.name, "ada");
        assert_eq!(user.age, 36);
    }

    #[test]
    fn test_xml_mismatch_is_decode_error() {
        let response = Response::from_bytes("<user><name>ada</name><age>old</age></user>");
        assert!(response.xml::<User>().unwrap_err().is_codec());
    }

    #[test]
    fn test_text_and_display() {
        let response = Response::from_bytes(vec![b'h', b'i', 0xff]);
        assert_eq!(response.text(), "hi\u{fffd}");
        assert_eq!(response.to_string(), "hi\u{fffd}");
    }

    #[test]
    fn test_head_accessors() {
        let mut response = Response::default();
        assert_eq!(response.status(), None);
        assert!(response.headers().is_none());

        let (parts, ()) = http::Response::builder()
            .status(404)
            .header("x-id", "7")
            .body(())
            .unwrap()
            .into_parts();
        response.set_head(parts.into());

        assert_eq!(response.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(response.headers().unwrap()["x-id"], "7");
    }
}
