//! Client-side error types.
//!
//! This module provides [`ClientError`], the error type returned by every call.

/// Errors that can occur while performing a call.
///
/// Variants carry a descriptive message rather than the underlying error value
/// so that the type stays `Clone` and can be stored by interceptors.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// A request payload could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),

    /// The response body could not be deserialized into the target type.
    #[error("decode error: {0}")]
    Decode(String),

    /// The request could not be constructed (bad URL, method, header or proxy).
    ///
    /// These errors are raised before any network I/O takes place.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Transport-level failure (DNS, connection refused, TLS, proxy tunnel).
    #[error("transport error: {0}")]
    Transport(String),

    /// The effective timeout or the request deadline elapsed.
    #[error("call timed out")]
    Timeout,

    /// The request's cancellation handle fired.
    #[error("call canceled")]
    Canceled,

    /// Reading the response body failed. Partial bytes are discarded.
    #[error("body error: {0}")]
    Body(String),

    /// An interceptor aborted unexpectedly. The panic message is preserved.
    #[error("interceptor fault: {0}")]
    Interceptor(String),
}

impl ClientError {
    /// Create a transport error from any displayable source.
    pub fn transport<E: std::fmt::Display>(err: E) -> Self {
        ClientError::Transport(err.to_string())
    }

    /// Create an invalid request error from any displayable source.
    pub fn invalid_request<E: std::fmt::Display>(err: E) -> Self {
        ClientError::InvalidRequest(err.to_string())
    }

    /// Returns true if the call never reached the network because the request
    /// could not be built.
    pub fn is_request(&self) -> bool {
        matches!(self, ClientError::InvalidRequest(_))
    }

    /// Returns true if the call failed because a timeout or deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout)
    }

    /// Returns true if the call was canceled through its cancellation handle.
    pub fn is_canceled(&self) -> bool {
        matches!(self, ClientError::Canceled)
    }

    /// Returns true for (de)serialization failures.
    pub fn is_codec(&self) -> bool {
        matches!(self, ClientError::Encode(_) | ClientError::Decode(_))
    }

    /// Returns true if an interceptor panicked during the call.
    pub fn is_interceptor_fault(&self) -> bool {
        matches!(self, ClientError::Interceptor(_))
    }

    /// Get the error message, if the variant carries one.
    pub fn message(&self) -> Option<&str> {
        match self {
            ClientError::Encode(msg)
            | ClientError::Decode(msg)
            | ClientError::InvalidRequest(msg)
            | ClientError::Transport(msg)
            | ClientError::Body(msg)
            | ClientError::Interceptor(msg) => Some(msg),
            ClientError::Timeout | ClientError::Canceled => None,
        }
    }

    /// Convert a caught panic payload into an interceptor fault.
    ///
    /// String payloads (from `panic!("...")`) are kept verbatim.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else if let Some(err) = payload.downcast_ref::<ClientError>() {
            err.to_string()
        } else {
            "unknown panic payload".to_string()
        };
        ClientError::Interceptor(message)
    }
}
