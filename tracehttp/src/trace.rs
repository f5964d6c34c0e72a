//! Connection phase tracing.
//!
//! The [`TraceInterceptor`] attaches a [`PhaseRecorder`] to the outbound
//! request before continuing the chain. The per-call connector appends a
//! [`PhaseEvent`] as each connection phase starts and finishes, and the
//! network step marks the arrival of the response head. Once the rest of the
//! chain returns, the interceptor folds the events into a [`Trace`] and stores
//! it on the response.
//!
//! Phases that never happen stay at zero: there is no DNS phase for a literal
//! IP, no TLS phase for plain HTTP, and no download phase when the call fails
//! before the response head arrives.
//!
//! When redirects are followed, `dns`, `connect` and `tls_handshake` describe
//! the connection of the final hop, while `total` covers every hop.
//!
//! ```ignore
//! use tracehttp::{Client, Request, TraceInterceptor};
//!
//! let client = Client::builder("https://example.com")
//!     .with_interceptor(TraceInterceptor::new())
//!     .build()?;
//!
//! let response = client.execute(Request::get("/")).await?;
//! if let Some(trace) = response.trace() {
//!     println!("dns={:?} tls={:?} total={:?}", trace.dns, trace.tls_handshake, trace.total);
//! }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;

use crate::ClientError;
use crate::config::Intercept;
use crate::context::CallContext;

/// Per-phase durations of one call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Trace {
    /// Name resolution. Zero when the host is an IP literal.
    pub dns: Duration,
    /// TLS handshake. Zero for plain HTTP.
    pub tls_handshake: Duration,
    /// TCP connect.
    pub connect: Duration,
    /// From the response head to the end of the body read.
    pub download: Duration,
    /// From entering the trace interceptor to leaving it.
    pub total: Duration,
}

/// A connection lifecycle event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    DnsStart,
    DnsDone,
    ConnectStart,
    ConnectDone,
    TlsStart,
    TlsDone,
    /// The response head was received.
    FirstByte,
    /// A redirect is being followed; later events belong to the next hop.
    Redirect,
}

/// One recorded lifecycle event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseEvent {
    pub kind: PhaseKind,
    pub at: Instant,
}

#[derive(Debug)]
struct Phases {
    started: Instant,
    events: Vec<PhaseEvent>,
}

/// Shared event log for one call.
///
/// Cloning yields a handle to the same log.
#[derive(Clone, Debug)]
pub struct PhaseRecorder {
    inner: Arc<Mutex<Phases>>,
}

impl PhaseRecorder {
    /// Start a new log; `total` is measured from now.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(started: Instant) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Phases {
                started,
                events: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Phases> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `kind` as happening now.
    pub fn record(&self, kind: PhaseKind) {
        self.record_at(kind, Instant::now());
    }

    fn record_at(&self, kind: PhaseKind, at: Instant) {
        self.lock().events.push(PhaseEvent { kind, at });
    }

    /// Snapshot of the events recorded so far, in order.
    pub fn events(&self) -> Vec<PhaseEvent> {
        self.lock().events.clone()
    }

    /// Check whether the response head has been received.
    pub fn has_first_byte(&self) -> bool {
        self.lock()
            .events
            .iter()
            .any(|e| e.kind == PhaseKind::FirstByte)
    }

    /// Fold the events into durations, finishing the call now.
    pub fn trace(&self) -> Trace {
        self.trace_at(Instant::now())
    }

    fn trace_at(&self, end: Instant) -> Trace {
        let phases = self.lock();
        let hop_start = phases
            .events
            .iter()
            .rposition(|e| e.kind == PhaseKind::Redirect)
            .map_or(0, |i| i + 1);
        let hop = &phases.events[hop_start..];

        let first = |kind: PhaseKind| hop.iter().find(|e| e.kind == kind).map(|e| e.at);
        let last = |kind: PhaseKind| hop.iter().rev().find(|e| e.kind == kind).map(|e| e.at);

        // A phase counts only if both of its events were seen.
        let span = |start: PhaseKind, done: PhaseKind| match (first(start), last(done)) {
            (Some(start), Some(done)) => done.saturating_duration_since(start),
            _ => Duration::ZERO,
        };

        Trace {
            dns: span(PhaseKind::DnsStart, PhaseKind::DnsDone),
            tls_handshake: span(PhaseKind::TlsStart, PhaseKind::TlsDone),
            connect: span(PhaseKind::ConnectStart, PhaseKind::ConnectDone),
            download: first(PhaseKind::FirstByte)
                .map(|at| end.saturating_duration_since(at))
                .unwrap_or_default(),
            total: end.saturating_duration_since(phases.started),
        }
    }
}

impl Default for PhaseRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Interceptor that records a [`Trace`] for every call.
///
/// Register it first to have `total` cover the other interceptors too.
#[derive(Clone, Copy, Debug, Default)]
pub struct TraceInterceptor;

impl TraceInterceptor {
    pub fn new() -> Self {
        Self
    }
}

impl Intercept for TraceInterceptor {
    fn intercept<'a>(
        &'a self,
        ctx: &'a mut CallContext,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        Box::pin(async move {
            let recorder = PhaseRecorder::new();
            if let Some(req) = ctx.http_request_mut() {
                req.extensions_mut().insert(recorder.clone());
            }

            let result = ctx.next().await;

            let trace = recorder.trace();
            #[cfg(feature = "tracing")]
            tracing::debug!(?trace, "call phases");
            ctx.response_mut().trace = Some(trace);

            result
        })
    }
}
