//! Interceptors.
//!
//! An interceptor wraps the rest of the call. It receives the [`CallContext`],
//! may inspect or modify the outbound request, and yields to the rest of the
//! chain with [`CallContext::next`]. Whatever runs after `next().await` runs
//! after every later interceptor and the network call have finished.
//!
//! Not calling `next` short-circuits the call: later interceptors and the
//! network call never run, and the call completes with whatever response the
//! interceptor left in the context.
//!
//! # Example
//!
//! ```ignore
//! use tracehttp::{Client, HeaderInterceptor, Interceptor};
//!
//! let auth = HeaderInterceptor::new("authorization", "Bearer token123")?;
//!
//! let logging = Interceptor::new(|ctx| {
//!     Box::pin(async move {
//!         println!("calling {}", ctx.request().uri());
//!         let result = ctx.next().await;
//!         println!("done: {}", result.is_ok());
//!         result
//!     })
//! });
//!
//! let client = Client::builder("http://localhost:3000")
//!     .with_interceptor(auth)
//!     .with_interceptor(logging)
//!     .build()?;
//! ```

use futures::future::BoxFuture;
use http::{HeaderName, HeaderValue};

use crate::ClientError;
use crate::context::CallContext;

// ============================================================================
// Intercept Trait
// ============================================================================

/// A step in a call's interceptor chain.
///
/// Implementations must call `ctx.next().await` to continue the chain, and
/// should return the result of that call unless they want to replace it.
pub trait Intercept: Send + Sync + 'static {
    /// Run this interceptor around the rest of the chain.
    fn intercept<'a>(
        &'a self,
        ctx: &'a mut CallContext,
    ) -> BoxFuture<'a, Result<(), ClientError>>;
}

// ============================================================================
// Header Interceptor
// ============================================================================

/// An interceptor that sets a header on every outbound request.
///
/// The header is set before the chain continues, replacing any value the
/// caller supplied under the same name.
#[derive(Clone, Debug)]
pub struct HeaderInterceptor {
    name: HeaderName,
    value: HeaderValue,
}

impl HeaderInterceptor {
    /// Create a new header interceptor, returning an error if the name or
    /// value is invalid.
    pub fn new(name: &str, value: &str) -> Result<Self, ClientError> {
        let name = name
            .parse()
            .map_err(|_| ClientError::InvalidRequest(format!("invalid header name: {}", name)))?;
        let value = value
            .parse()
            .map_err(|_| ClientError::InvalidRequest(format!("invalid header value: {}", value)))?;
        Ok(Self { name, value })
    }

    /// Create a new header interceptor from pre-parsed values.
    pub fn from_parts(name: HeaderName, value: HeaderValue) -> Self {
        Self { name, value }
    }
}

impl Intercept for HeaderInterceptor {
    fn intercept<'a>(
        &'a self,
        ctx: &'a mut CallContext,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        Box::pin(async move {
            if let Some(req) = ctx.http_request_mut() {
                req.headers_mut().insert(self.name.clone(), self.value.clone());
            }
            ctx.next().await
        })
    }
}

// ============================================================================
// Closure Interceptor
// ============================================================================

/// A wrapper that adapts a closure to the [`Intercept`] trait.
///
/// The closure returns a boxed future borrowing the context:
///
/// ```ignore
/// use tracehttp::Interceptor;
///
/// let deny = Interceptor::new(|ctx| {
///     Box::pin(async move {
///         if ctx.request().uri().starts_with("/admin") {
///             // Short-circuit: no network call happens.
///             return Ok(());
///         }
///         ctx.next().await
///     })
/// });
/// ```
pub struct Interceptor<F> {
    f: F,
}

impl<F> Interceptor<F>
where
    F: for<'a> Fn(&'a mut CallContext) -> BoxFuture<'a, Result<(), ClientError>>
        + Send
        + Sync
        + 'static,
{
    /// Create a new interceptor from a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F: Clone> Clone for Interceptor<F> {
    fn clone(&self) -> Self {
        Self { f: self.f.clone() }
    }
}

impl<F> std::fmt::Debug for Interceptor<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor").finish()
    }
}

impl<F> Intercept for Interceptor<F>
where
    F: for<'a> Fn(&'a mut CallContext) -> BoxFuture<'a, Result<(), ClientError>>
        + Send
        + Sync
        + 'static,
{
    fn intercept<'a>(
        &'a self,
        ctx: &'a mut CallContext,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        (self.f)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_interceptor_rejects_invalid() {
        assert!(HeaderInterceptor::new("x-ok", "value").is_ok());

        let err = HeaderInterceptor::new("invalid\0name", "value").unwrap_err();
        assert!(err.is_request());

        let err = HeaderInterceptor::new("x-ok", "bad\nvalue").unwrap_err();
        assert!(err.is_request());
    }
}
