mod common;

use http::StatusCode;
use tracehttp::{Client, ClientError, Request, TraceInterceptor};

use common::{Echo, User};

#[tokio::test]
async fn temporary_redirect_is_followed() {
    let client = common::client().await;

    let response = client.get("/old").await.unwrap();

    assert_eq!(response.status(), Some(StatusCode::OK));
    let user: User = response.json().unwrap();
    assert_eq!(user, User { name: "ada".into(), age: 36 });
    assert_eq!(response.request_head().unwrap().uri.path(), "/user.json");
}

#[tokio::test]
async fn see_other_turns_post_into_bodiless_get() {
    let client = common::client().await;

    let request = Request::post("/see-other")
        .header("content-type", "text/plain")
        .header("x-trace-id", "abc")
        .body("payload");
    let echo: Echo = client.execute(request).await.unwrap().json().unwrap();

    assert_eq!(echo.method, "GET");
    assert_eq!(echo.uri, "/echo");
    assert_eq!(echo.body, "");
    assert_eq!(echo.header("content-type"), None);
    assert_eq!(echo.header("x-trace-id"), Some("abc"));
    assert!(echo.header("referer").unwrap().ends_with("/see-other"));
}

#[tokio::test]
async fn found_turns_post_into_get() {
    let client = common::client().await;

    let echo: Echo = client
        .post("/found", "text/plain", "payload")
        .await
        .unwrap()
        .json()
        .unwrap();

    assert_eq!(echo.method, "GET");
    assert_eq!(echo.body, "");
}

#[tokio::test]
async fn permanent_redirect_resends_method_and_body() {
    let client = common::client().await;

    let echo: Echo = client
        .execute(Request::put("/moved").body("payload"))
        .await
        .unwrap()
        .json()
        .unwrap();

    assert_eq!(echo.method, "PUT");
    assert_eq!(echo.uri, "/echo");
    assert_eq!(echo.body, "payload");
}

#[tokio::test]
async fn redirect_loop_stops_at_limit() {
    let (builder, _) = common::builder().await;
    let client = builder.max_redirects(3).build().unwrap();

    let err = client.get("/loop").await.unwrap_err();

    assert_eq!(err, ClientError::Transport("stopped after 3 redirects".into()));
}

#[tokio::test]
async fn default_limit_is_ten() {
    let client = common::client().await;

    let err = client.get("/loop").await.unwrap_err();

    assert_eq!(err, ClientError::Transport("stopped after 10 redirects".into()));
}

#[tokio::test]
async fn zero_limit_returns_redirect_response() {
    let (builder, _) = common::builder().await;
    let client = builder.max_redirects(0).build().unwrap();

    let response = client.get("/old").await.unwrap();

    assert_eq!(response.status(), Some(StatusCode::TEMPORARY_REDIRECT));
    let location = &response.headers().unwrap()["location"];
    assert_eq!(location, "/user.json");
}

#[tokio::test]
async fn cross_host_redirect_drops_credentials() {
    let target = common::serve(common::router()).await;
    let origin = common::serve(axum::Router::new().route(
        "/away",
        axum::routing::get(move || async move {
            // `localhost` is a different host from the `127.0.0.1` origin.
            let to = format!("http://localhost:{}/echo", target.port());
            axum::response::Redirect::temporary(&to)
        }),
    ))
    .await;

    let client = Client::builder(format!("http://{origin}"))
        .no_proxy()
        .build()
        .unwrap();
    let request = Request::get("/away")
        .header("authorization", "Bearer secret")
        .header("x-keep", "1");
    let echo: Echo = client.execute(request).await.unwrap().json().unwrap();

    assert_eq!(echo.header("authorization"), None);
    assert_eq!(echo.header("x-keep"), Some("1"));
    assert_eq!(echo.header("host"), Some(format!("localhost:{}", target.port()).as_str()));
}

#[tokio::test]
async fn trace_spans_every_hop() {
    let (builder, _) = common::builder().await;
    let client = builder.with_interceptor(TraceInterceptor::new()).build().unwrap();

    let response = client.get("/old").await.unwrap();

    let trace = response.trace().unwrap();
    for phase in [trace.dns, trace.tls_handshake, trace.connect, trace.download] {
        assert!(phase <= trace.total, "{trace:?}");
    }
    assert_eq!(response.status(), Some(StatusCode::OK));
}
