//! HTTP transport layer.
//!
//! Each call runs on a private hyper-util client whose connector reports
//! connection phases (DNS, TCP connect, TLS handshake) as it goes. It supports:
//!
//! - HTTP/1.1 and HTTP/2 with protocol negotiation via ALPN
//! - TLS with rustls (feature-gated)
//! - fixed and environment-derived HTTP proxies, including `CONNECT` tunnels
//!
//! # Feature Flags
//!
//! TLS support requires enabling the appropriate features:
//!
//! - `tls` (default) - Enables `tls-ring` + `tls-native-roots` for convenience
//! - `tls-ring` / `tls-aws-lc` - Crypto providers
//! - `tls-native-roots` / `tls-webpki-roots` - Root certificates

mod body;
mod connector;
mod hyper;
mod traced;

pub use body::TransportBody;
pub use connector::{
    DangerousAcceptAnyCertVerifier, danger_accept_invalid_certs_config, default_tls_config,
    has_tls_support,
};

pub(crate) use hyper::CallTransport;

// Re-export rustls types that users might need for TLS configuration
pub use rustls::ClientConfig as TlsClientConfig;
