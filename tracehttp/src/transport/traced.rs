//! Phase-observing connector.
//!
//! [`TracedConnector`] establishes connections for one call's private hyper
//! client: name resolution, TCP connect, an optional `CONNECT` tunnel through
//! a proxy, then an optional TLS handshake. Each phase is reported to the
//! call's [`PhaseRecorder`] when one is attached.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use http::{HeaderValue, Uri};
use hyper_util::client::legacy::connect::{Connected, Connection};
use hyper_util::rt::TokioIo;
use pin_project_lite::pin_project;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tower_service::Service;

use crate::ClientError;
use crate::config::{ProxyPolicy, ProxyRoute};
use crate::trace::{PhaseKind, PhaseRecorder};

/// Upper bound for the TLS handshake.
pub(crate) const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for a proxy's `CONNECT` response head.
const MAX_TUNNEL_HEAD: usize = 8 * 1024;

/// Connector for one call.
#[derive(Clone)]
pub(crate) struct TracedConnector {
    proxy: ProxyPolicy,
    tls: Option<Arc<rustls::ClientConfig>>,
    connect_timeout: Duration,
    recorder: Option<PhaseRecorder>,
}

impl TracedConnector {
    pub(crate) fn new(
        proxy: ProxyPolicy,
        tls: Option<Arc<rustls::ClientConfig>>,
        connect_timeout: Duration,
        recorder: Option<PhaseRecorder>,
    ) -> Self {
        Self {
            proxy,
            tls,
            connect_timeout,
            recorder,
        }
    }

    fn record(&self, kind: PhaseKind) {
        if let Some(recorder) = &self.recorder {
            recorder.record(kind);
        }
    }

    async fn connect(self, dst: Uri) -> Result<TracedIo, ClientError> {
        let is_https = match dst.scheme_str() {
            Some("https") => true,
            Some("http") => false,
            other => {
                return Err(ClientError::InvalidRequest(format!(
                    "unsupported scheme: {other:?}"
                )));
            }
        };
        let host = dst
            .host()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ClientError::InvalidRequest(format!("missing host in {dst}")))?;
        let port = dst.port_u16().unwrap_or(if is_https { 443 } else { 80 });

        let route = self.proxy.route(&dst);
        let (peer_host, peer_port) = match &route {
            ProxyRoute::Direct => (host, port),
            ProxyRoute::Proxy(target) => (target.host(), target.port()),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(%dst, ?route, "connecting");

        let addrs = self.resolve(peer_host, peer_port).await?;
        let mut tcp = self.connect_tcp(&addrs).await?;

        if !is_https {
            let proxied = matches!(route, ProxyRoute::Proxy(_));
            return Ok(TracedIo::new(ConnStream::Plain(tcp), proxied, false));
        }

        if let ProxyRoute::Proxy(target) = &route {
            tunnel(&mut tcp, host, port, target.auth()).await?;
        }

        let tls = self.handshake(tcp, host).await?;
        let h2 = tls.get_ref().1.alpn_protocol() == Some(b"h2".as_slice());
        Ok(TracedIo::new(ConnStream::Tls(Box::new(tls)), false, h2))
    }

    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, ClientError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![SocketAddr::new(ip, port)]);
        }

        self.record(PhaseKind::DnsStart);
        let lookup = tokio::net::lookup_host((host, port)).await;
        self.record(PhaseKind::DnsDone);
        let addrs: Vec<SocketAddr> = lookup
            .map_err(|e| ClientError::Transport(format!("dns lookup for {host} failed: {e}")))?
            .collect();

        if addrs.is_empty() {
            return Err(ClientError::Transport(format!(
                "dns lookup for {host} returned no addresses"
            )));
        }
        Ok(addrs)
    }

    async fn connect_tcp(&self, addrs: &[SocketAddr]) -> Result<TcpStream, ClientError> {
        self.record(PhaseKind::ConnectStart);

        let mut last_err = None;
        for addr in addrs {
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    self.record(PhaseKind::ConnectDone);
                    stream
                        .set_nodelay(true)
                        .map_err(|e| ClientError::Transport(format!("set nodelay: {e}")))?;
                    return Ok(stream);
                }
                Ok(Err(e)) => last_err = Some(format!("connect to {addr} failed: {e}")),
                Err(_) => {
                    last_err = Some(format!(
                        "connect to {addr} timed out after {:?}",
                        self.connect_timeout
                    ))
                }
            }
        }

        // The attempt is over either way; the span ends here.
        self.record(PhaseKind::ConnectDone);
        Err(ClientError::Transport(
            last_err.unwrap_or_else(|| "no addresses to connect to".to_string()),
        ))
    }

    async fn handshake(
        &self,
        tcp: TcpStream,
        host: &str,
    ) -> Result<TlsStream<TcpStream>, ClientError> {
        let config = self.tls.clone().ok_or_else(|| {
            ClientError::Transport("https is not configured for this call".into())
        })?;
        let server_name = ServerName::try_from(host.to_string()).map_err(|e| {
            ClientError::InvalidRequest(format!("invalid tls server name {host}: {e}"))
        })?;

        self.record(PhaseKind::TlsStart);
        let outcome = tokio::time::timeout(
            TLS_HANDSHAKE_TIMEOUT,
            TlsConnector::from(config).connect(server_name, tcp),
        )
        .await;
        self.record(PhaseKind::TlsDone);

        let stream = outcome
            .map_err(|_| ClientError::Transport(format!("tls handshake with {host} timed out")))?
            .map_err(|e| {
                ClientError::Transport(format!("tls handshake with {host} failed: {e}"))
            })?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            %host,
            alpn = ?stream.get_ref().1.alpn_protocol().map(String::from_utf8_lossy),
            "tls handshake complete"
        );

        Ok(stream)
    }
}

impl std::fmt::Debug for TracedConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracedConnector")
            .field("proxy", &self.proxy)
            .field("tls", &self.tls.is_some())
            .field("connect_timeout", &self.connect_timeout)
            .field("traced", &self.recorder.is_some())
            .finish()
    }
}

impl Service<Uri> for TracedConnector {
    type Response = TracedIo;
    type Error = ClientError;
    type Future = BoxFuture<'static, Result<TracedIo, ClientError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        Box::pin(self.clone().connect(dst))
    }
}

/// Open a `CONNECT` tunnel to `host:port` through an already connected proxy.
async fn tunnel(
    stream: &mut TcpStream,
    host: &str,
    port: u16,
    auth: Option<&HeaderValue>,
) -> Result<(), ClientError> {
    let authority = if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };

    let mut head = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
    if let Some(auth) = auth {
        let auth = auth
            .to_str()
            .map_err(|e| ClientError::InvalidRequest(format!("invalid proxy credentials: {e}")))?;
        head.push_str("Proxy-Authorization: ");
        head.push_str(auth);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");

    stream
        .write_all(head.as_bytes())
        .await
        .map_err(|e| ClientError::Transport(format!("proxy tunnel write failed: {e}")))?;

    let mut buf = Vec::with_capacity(512);
    let mut chunk = [0u8; 512];
    loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| ClientError::Transport(format!("proxy tunnel read failed: {e}")))?;
        if n == 0 {
            return Err(ClientError::Transport(
                "proxy closed the connection during CONNECT".into(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);

        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
        if buf.len() > MAX_TUNNEL_HEAD {
            return Err(ClientError::Transport("proxy CONNECT response too large".into()));
        }
    }

    let status_line = buf
        .split(|b| *b == b'\r')
        .next()
        .map(String::from_utf8_lossy)
        .unwrap_or_default();
    if tunnel_established(&status_line) {
        return Ok(());
    }

    Err(ClientError::Transport(format!(
        "proxy refused CONNECT to {authority}: {status_line}"
    )))
}

/// Any `2xx` reply to `CONNECT` opens the tunnel.
fn tunnel_established(status_line: &str) -> bool {
    let mut parts = status_line.split(' ');
    let version = parts.next().unwrap_or_default();
    let status = parts.next().unwrap_or_default();
    matches!(version, "HTTP/1.1" | "HTTP/1.0")
        && status.len() == 3
        && status.starts_with('2')
        && status.bytes().all(|b| b.is_ascii_digit())
}

/// A plain or TLS TCP stream.
pub(crate) enum ConnStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for ConnStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ConnStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            ConnStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ConnStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            ConnStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            ConnStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ConnStream::Plain(s) => Pin::new(s).poll_flush(cx),
            ConnStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ConnStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            ConnStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

pin_project! {
    /// A connection handed to hyper.
    pub(crate) struct TracedIo {
        #[pin]
        inner: TokioIo<ConnStream>,
        proxied: bool,
        h2: bool,
    }
}

impl std::fmt::Debug for TracedIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let transport = match self.inner.inner() {
            ConnStream::Plain(_) => "plain",
            ConnStream::Tls(_) => "tls",
        };
        f.debug_struct("TracedIo")
            .field("transport", &transport)
            .field("proxied", &self.proxied)
            .field("h2", &self.h2)
            .finish()
    }
}

impl TracedIo {
    fn new(stream: ConnStream, proxied: bool, h2: bool) -> Self {
        Self {
            inner: TokioIo::new(stream),
            proxied,
            h2,
        }
    }
}

impl Connection for TracedIo {
    fn connected(&self) -> Connected {
        let connected = Connected::new().proxy(self.proxied);
        if self.h2 {
            connected.negotiated_h2()
        } else {
            connected
        }
    }
}

impl hyper::rt::Read for TracedIo {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: hyper::rt::ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        hyper::rt::Read::poll_read(self.project().inner, cx, buf)
    }
}

impl hyper::rt::Write for TracedIo {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        hyper::rt::Write::poll_write(self.project().inner, cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        hyper::rt::Write::poll_flush(self.project().inner, cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        hyper::rt::Write::poll_shutdown(self.project().inner, cx)
    }
}
