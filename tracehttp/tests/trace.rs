mod common;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracehttp::{Client, Interceptor, Request, Trace, TraceInterceptor};

fn assert_bounded(trace: &Trace) {
    for phase in [trace.dns, trace.tls_handshake, trace.connect, trace.download] {
        assert!(phase <= trace.total, "{trace:?}");
    }
}

#[tokio::test]
async fn successful_call_has_bounded_phases() {
    let (builder, _) = common::builder().await;
    let client = builder.with_interceptor(TraceInterceptor::new()).build().unwrap();

    let started = Instant::now();
    let response = client.get("/user.json").await.unwrap();
    let wall = started.elapsed();

    let trace = response.trace().copied().unwrap();
    assert_bounded(&trace);
    assert!(trace.total <= wall, "{trace:?} vs {wall:?}");
    assert!(trace.total > Duration::ZERO);
}

#[tokio::test]
async fn ip_literal_plain_http_has_no_dns_or_tls() {
    let (builder, _) = common::builder().await;
    let client = builder.with_interceptor(TraceInterceptor::new()).build().unwrap();

    let response = client.get("/echo").await.unwrap();

    let trace = response.trace().unwrap();
    assert_eq!(trace.dns, Duration::ZERO);
    assert_eq!(trace.tls_handshake, Duration::ZERO);
}

#[tokio::test]
async fn hostname_call_is_bounded() {
    let (_, addr) = common::builder().await;
    let client = Client::builder(format!("http://localhost:{}", addr.port()))
        .no_proxy()
        .with_interceptor(TraceInterceptor::new())
        .build()
        .unwrap();

    let response = client.get("/echo").await.unwrap();

    assert_bounded(response.trace().unwrap());
}

#[tokio::test]
async fn total_covers_inner_interceptors() {
    let delay = Interceptor::new(|ctx| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            ctx.next().await
        })
    });

    let (builder, _) = common::builder().await;
    let client = builder
        .with_interceptor(TraceInterceptor::new())
        .with_interceptor(delay)
        .build()
        .unwrap();

    let response = client.get("/echo").await.unwrap();

    assert!(response.trace().unwrap().total >= Duration::from_millis(50));
}

#[tokio::test]
async fn failed_call_has_zero_download() {
    let captured: Arc<Mutex<Option<Trace>>> = Arc::default();
    let observer = {
        let captured = captured.clone();
        Interceptor::new(move |ctx| {
            let captured = captured.clone();
            Box::pin(async move {
                let result = ctx.next().await;
                *captured.lock().unwrap() = ctx.response().trace().copied();
                result
            })
        })
    };

    let dead = common::dead_addr().await;
    let client = Client::builder(format!("http://{dead}"))
        .no_proxy()
        .with_interceptor(observer)
        .with_interceptor(TraceInterceptor::new())
        .build()
        .unwrap();

    assert!(client.execute(Request::get("/")).await.is_err());

    let trace = captured.lock().unwrap().expect("trace recorded on failure");
    assert_eq!(trace.download, Duration::ZERO);
    assert_bounded(&trace);
}

#[tokio::test]
async fn no_trace_without_interceptor() {
    let client = common::client().await;

    let response = client.get("/echo").await.unwrap();

    assert!(response.trace().is_none());
}
