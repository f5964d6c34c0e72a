//! Configuration modules.
//!
//! - [`ClientConfig`]: client-level defaults shared by every call
//! - [`CallOptions`]: per-call transport overrides
//! - [`TransportSettings`]: the merge of the two for one call
//! - [`Intercept`]: interceptors run around each call

mod defaults;
mod interceptor;
mod options;
mod resolve;

pub use defaults::ClientConfig;
pub use interceptor::{HeaderInterceptor, Intercept, Interceptor};
pub use options::CallOptions;
pub use resolve::{ProxyPolicy, ProxyRoute, ProxyTarget, TransportSettings};
