//! Shared in-process test server.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::http::header::{CONTENT_TYPE, LOCATION};
use axum::response::{IntoResponse, Redirect};
use axum::routing::{any, get};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracehttp::{Client, ClientBuilder};

/// What the echo handler saw.
#[derive(Debug, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub uri: String,
    pub headers: BTreeMap<String, Vec<String>>,
    pub body: String,
}

impl Echo {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub age: u32,
}

pub async fn echo(req: Request) -> Json<Echo> {
    let (parts, body) = req.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();

    let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in &parts.headers {
        headers
            .entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }

    Json(Echo {
        method: parts.method.to_string(),
        uri: parts.uri.to_string(),
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(5)).await;
    "late"
}

async fn user_json() -> Json<User> {
    Json(User {
        name: "ada".into(),
        age: 36,
    })
}

async fn user_xml() -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "application/xml")],
        "<user><name>ada</name><age>36</age></user>",
    )
}

async fn found_echo() -> impl IntoResponse {
    (StatusCode::FOUND, [(LOCATION, "/echo")])
}

pub fn router() -> Router {
    Router::new()
        .route("/echo", any(echo))
        .route("/slow", get(slow))
        .route("/user.json", get(user_json))
        .route("/user.xml", get(user_xml))
        .route("/old", get(|| async { Redirect::temporary("/user.json") }))
        .route("/see-other", any(|| async { Redirect::to("/echo") }))
        .route("/found", any(found_echo))
        .route("/moved", any(|| async { Redirect::permanent("/echo") }))
        .route("/loop", any(|| async { Redirect::to("/loop") }))
}

/// Serve `router` on an ephemeral local port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Start the test server and return a builder pointed at it.
///
/// Environment proxies are disabled so the host's settings cannot interfere.
pub async fn builder() -> (ClientBuilder, SocketAddr) {
    let addr = serve(router()).await;
    (Client::builder(format!("http://{addr}")).no_proxy(), addr)
}

pub async fn client() -> Client {
    builder().await.0.build().unwrap()
}

/// A local address with nothing listening on it.
pub async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A TLS server with a fresh self-signed certificate for `127.0.0.1` and
/// `localhost`. Every connection gets a plain-text `secure` reply.
#[cfg(feature = "tls-ring")]
pub struct TlsServer {
    pub addr: SocketAddr,
    pub cert: rustls::pki_types::CertificateDer<'static>,
}

#[cfg(feature = "tls-ring")]
pub async fn serve_tls() -> TlsServer {
    use std::sync::Arc;

    use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let names = vec!["127.0.0.1".to_string(), "localhost".to_string()];
    let rcgen::CertifiedKey { cert, key_pair } = rcgen::generate_simple_self_signed(names).unwrap();
    let cert = cert.der().clone();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    let config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(vec![cert.clone()], key)
    .unwrap();
    let acceptor = tokio_rustls::TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((sock, _)) = listener.accept().await else {
                return;
            };
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                // Clients that reject the certificate abort the handshake.
                let Ok(mut tls) = acceptor.accept(sock).await else {
                    return;
                };
                let mut head = Vec::new();
                let mut chunk = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match tls.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&chunk[..n]),
                    }
                }
                let reply = "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\n\
                             content-length: 6\r\nconnection: close\r\n\r\nsecure";
                let _ = tls.write_all(reply.as_bytes()).await;
                let _ = tls.shutdown().await;
            });
        }
    });

    TlsServer { addr, cert }
}
