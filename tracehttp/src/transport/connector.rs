//! TLS configuration for outbound connections.
//!
//! # Feature Flags
//!
//! TLS support requires both a crypto provider and root certificates:
//!
//! - **Crypto providers** (choose one):
//!   - `tls-ring` - Use ring crypto (default with `tls` feature)
//!   - `tls-aws-lc` - Use AWS LC crypto
//!
//! - **Root certificates** (choose one):
//!   - `tls-native-roots` - Use system root certificates (default with `tls` feature)
//!   - `tls-webpki-roots` - Use bundled Mozilla root certificates
//!
//! Without a feature-gated provider, a provider installed with
//! `CryptoProvider::install_default()` is used.

use std::sync::{Arc, OnceLock};

use rustls::ClientConfig;

use crate::ClientError;
use crate::config::TransportSettings;

/// ALPN protocols offered on every TLS connection, most preferred first.
const ALPN_PROTOCOLS: [&[u8]; 2] = [b"h2", b"http/1.1"];

/// Check if TLS features are properly configured.
///
/// Returns true if both a crypto provider AND root certificates are available.
#[inline]
pub const fn has_tls_support() -> bool {
    cfg!(any(feature = "tls-ring", feature = "tls-aws-lc"))
        && cfg!(any(
            feature = "tls-native-roots",
            feature = "tls-webpki-roots"
        ))
}

/// Get a config builder from the available crypto provider.
///
/// Priority:
/// 1. Feature-gated provider (tls-ring, then tls-aws-lc)
/// 2. User-installed global default provider
fn provider_builder()
-> Result<rustls::ConfigBuilder<ClientConfig, rustls::WantsVerifier>, ClientError> {
    #[cfg(feature = "tls-ring")]
    let provider = Some(Arc::new(rustls::crypto::ring::default_provider()));

    #[cfg(all(feature = "tls-aws-lc", not(feature = "tls-ring")))]
    let provider = Some(Arc::new(rustls::crypto::aws_lc_rs::default_provider()));

    #[cfg(not(any(feature = "tls-ring", feature = "tls-aws-lc")))]
    let provider = rustls::crypto::CryptoProvider::get_default().cloned();

    let provider = provider.ok_or_else(|| {
        ClientError::Transport(
            "https requires a crypto provider: enable `tls-ring` or `tls-aws-lc`, \
             or install one with `CryptoProvider::install_default()`"
                .to_string(),
        )
    })?;

    ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ClientError::Transport(format!("tls protocol versions: {e}")))
}

/// Build the root certificate store from enabled features.
///
/// Native roots are preferred when both root features are enabled.
#[cfg(any(feature = "tls-native-roots", feature = "tls-webpki-roots"))]
fn build_root_store() -> rustls::RootCertStore {
    let mut roots = rustls::RootCertStore::empty();

    #[cfg(feature = "tls-native-roots")]
    {
        let native_certs = rustls_native_certs::load_native_certs();
        if !native_certs.errors.is_empty() {
            // Some certs may still have loaded.
            #[cfg(feature = "tracing")]
            tracing::debug!("errors loading native certs: {:?}", native_certs.errors);
        }
        roots.add_parsable_certificates(native_certs.certs);
    }

    #[cfg(all(feature = "tls-webpki-roots", not(feature = "tls-native-roots")))]
    {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    roots
}

/// Build the default TLS configuration.
///
/// Uses feature-gated root certificates (native or webpki) and either a
/// feature-gated crypto provider or a user-installed global default.
pub fn default_tls_config() -> Result<ClientConfig, ClientError> {
    let builder = provider_builder()?;

    #[cfg(any(feature = "tls-native-roots", feature = "tls-webpki-roots"))]
    {
        Ok(builder
            .with_root_certificates(build_root_store())
            .with_no_client_auth())
    }

    #[cfg(not(any(feature = "tls-native-roots", feature = "tls-webpki-roots")))]
    {
        let _ = builder;
        Err(ClientError::Transport(
            "https requires root certificates: enable `tls-native-roots` or \
             `tls-webpki-roots`, or pass a custom TLS config"
                .to_string(),
        ))
    }
}

/// Create a TLS config that accepts any certificate.
///
/// # Warning
///
/// This makes connections vulnerable to man-in-the-middle attacks. Only use
/// it for development and testing.
pub fn danger_accept_invalid_certs_config() -> Result<ClientConfig, ClientError> {
    Ok(provider_builder()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(DangerousAcceptAnyCertVerifier))
        .with_no_client_auth())
}

/// Pick the TLS configuration for one call.
///
/// Certificate skipping wins over a custom configuration. The default
/// configuration is built once per process; loading native roots is slow.
pub(crate) fn tls_config_for(
    settings: &TransportSettings,
) -> Result<Arc<ClientConfig>, ClientError> {
    static DEFAULT: OnceLock<Result<Arc<ClientConfig>, ClientError>> = OnceLock::new();

    if settings.danger_accept_invalid_certs {
        return Ok(Arc::new(with_alpn(danger_accept_invalid_certs_config()?)));
    }

    if let Some(custom) = &settings.tls_config {
        if custom.alpn_protocols.is_empty() {
            return Ok(Arc::new(with_alpn(custom.as_ref().clone())));
        }
        return Ok(custom.clone());
    }

    DEFAULT
        .get_or_init(|| default_tls_config().map(|config| Arc::new(with_alpn(config))))
        .clone()
}

fn with_alpn(mut config: ClientConfig) -> ClientConfig {
    config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();
    config
}

// ============================================================================
// Dangerous: Accept Invalid Certificates
// ============================================================================

/// A certificate verifier that accepts any certificate.
///
/// # Warning
///
/// This is extremely dangerous and should only be used for development/testing!
/// It makes the connection vulnerable to man-in-the-middle attacks.
#[derive(Debug)]
pub struct DangerousAcceptAnyCertVerifier;

impl rustls::client::danger::ServerCertVerifier for DangerousAcceptAnyCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CallOptions, ClientConfig as Defaults};

    fn settings(skip: bool) -> TransportSettings {
        let options = if skip {
            CallOptions::new().danger_accept_invalid_certs()
        } else {
            CallOptions::new()
        };
        TransportSettings::resolve(&Defaults::new("https://localhost".into()), &options).unwrap()
    }

    #[cfg(all(
        any(feature = "tls-ring", feature = "tls-aws-lc"),
        any(feature = "tls-native-roots", feature = "tls-webpki-roots")
    ))]
    #[test]
    fn test_default_config_offers_h2_and_http1() {
        assert!(has_tls_support());
        let config = tls_config_for(&settings(false)).unwrap();
        assert_eq!(config.alpn_protocols, vec![b"h2".to_vec(), b"http/1.1".to_vec()]);

        let again = tls_config_for(&settings(false)).unwrap();
        assert!(Arc::ptr_eq(&config, &again));
    }

    #[cfg(any(feature = "tls-ring", feature = "tls-aws-lc"))]
    #[test]
    fn test_skip_overrides_custom_config() {
        let custom = Arc::new(
            provider_builder()
                .unwrap()
                .with_root_certificates(rustls::RootCertStore::empty())
                .with_no_client_auth(),
        );

        let mut skip = settings(true);
        skip.tls_config = Some(custom.clone());
        let config = tls_config_for(&skip).unwrap();
        assert!(!Arc::ptr_eq(&config, &custom));

        let mut strict = settings(false);
        strict.tls_config = Some(custom);
        let config = tls_config_for(&strict).unwrap();
        assert_eq!(config.alpn_protocols.len(), 2);
    }
}
