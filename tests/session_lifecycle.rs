//! Session close, redial, eviction, access control and shutdown over real sockets.

use std::sync::atomic::Ordering;
use std::time::Duration;

use reqwest::StatusCode;

mod common;
use common::{client, destination_header, start_echo, start_reset_once, start_server};

#[tokio::test]
async fn close_signal_removes_session_and_next_request_redials() {
    let mut echo = start_echo().await;
    let server = start_server(|_| {}).await;
    let client = client();
    let destination = destination_header(echo.addr);

    let res = client
        .get(format!("{}/", server.base))
        .header("X-Requested-With", &destination)
        .header("X-For", "closing")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(server.sessions.contains("closing"));

    let res = client
        .post(format!("{}/", server.base))
        .header("X-Requested-With", &destination)
        .header("X-For", "closing")
        .header("X-Connection-Close", "true")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(!server.sessions.contains("closing"));

    tokio::time::timeout(Duration::from_secs(2), echo.closed.recv())
        .await
        .expect("destination connection was not closed");

    let res = client
        .post(format!("{}/", server.base))
        .header("X-Requested-With", &destination)
        .header("X-For", "closing")
        .body("again")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(echo.accepted.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn close_header_must_be_exactly_true() {
    let echo = start_echo().await;
    let server = start_server(|_| {}).await;

    let res = client()
        .get(format!("{}/", server.base))
        .header("X-Requested-With", destination_header(echo.addr))
        .header("X-For", "not-closing")
        .header("X-Connection-Close", "yes")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(server.sessions.contains("not-closing"));
}

#[tokio::test]
async fn session_id_falls_back_to_cf_ray() {
    let echo = start_echo().await;
    let server = start_server(|_| {}).await;

    let res = client()
        .get(format!("{}/", server.base))
        .header("X-Requested-With", destination_header(echo.addr))
        .header("Cf-Ray", "ray-123")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(server.sessions.contains("ray-123"));
}

#[tokio::test]
async fn unreachable_destination_is_server_error() {
    let closed = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let server = start_server(|_| {}).await;

    let res = client()
        .get(format!("{}/", server.base))
        .header("X-Requested-With", destination_header(closed))
        .header("X-For", "nowhere")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!server.sessions.contains("nowhere"));
}

#[tokio::test]
async fn direct_requests_need_front_proxy_header() {
    let echo = start_echo().await;
    let server = start_server(|config| config.access.allow_direct = false).await;
    let client = client();
    let destination = destination_header(echo.addr);

    let res = client
        .get(format!("{}/", server.base))
        .header("X-Requested-With", &destination)
        .header("X-For", "direct")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(echo.accepted.load(Ordering::SeqCst), 0);

    let res = client
        .get(format!("{}/", server.base))
        .header("X-Requested-With", &destination)
        .header("Cf-Connecting-Ip", "203.0.113.7")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(server.sessions.contains("203.0.113.7"));
}

#[tokio::test]
async fn responses_carry_static_headers() {
    let server = start_server(|_| {}).await;

    // Rejected requests look the same as successful ones.
    let res = client()
        .get(format!("{}/index.php", server.base))
        .header("X-For", "headers")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let headers = res.headers();
    assert_eq!(headers["server"], "Apache/2.4.41 (Ubuntu)");
    assert_eq!(headers["x-powered-by"], "PHP/7.4.33");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "SAMEORIGIN");
    assert_eq!(headers["content-type"], "application/octet-stream");
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn idle_sessions_are_reaped_and_their_connections_closed() {
    let mut echo = start_echo().await;
    let server = start_server(|config| {
        config.sessions.idle_timeout_secs = 1;
        config.sessions.sweep_interval_secs = 1;
    })
    .await;

    let res = client()
        .get(format!("{}/", server.base))
        .header("X-Requested-With", destination_header(echo.addr))
        .header("X-For", "idle")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(server.sessions.contains("idle"));

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert!(!server.sessions.contains("idle"));

    tokio::time::timeout(Duration::from_secs(2), echo.closed.recv())
        .await
        .expect("evicted session left its destination connection open");
    assert_eq!(echo.accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn broken_connection_fails_once_then_redials() {
    let (addr, accepted) = start_reset_once().await;
    let server = start_server(|_| {}).await;
    let client = client();
    let destination = destination_header(addr);

    // The destination resets the first connection; the poll reading it fails.
    let res = client
        .get(format!("{}/", server.base))
        .header("X-Requested-With", &destination)
        .header("X-For", "flaky")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(server.sessions.contains("flaky"));

    let res = client
        .get(format!("{}/", server.base))
        .header("X-Requested-With", &destination)
        .header("X-For", "flaky")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
    assert_eq!(server.sessions.len(), 1);
}

#[tokio::test]
async fn shutdown_closes_every_session() {
    let mut echo = start_echo().await;
    let server = start_server(|_| {}).await;
    let client = client();
    let destination = destination_header(echo.addr);

    for id in ["one", "two"] {
        let res = client
            .get(format!("{}/", server.base))
            .header("X-Requested-With", &destination)
            .header("X-For", id)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
    assert_eq!(server.sessions.len(), 2);
    drop(client);

    server.shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("server did not stop");
    assert!(result.unwrap().is_ok());
    assert!(server.sessions.is_empty());

    for _ in 0..2 {
        tokio::time::timeout(Duration::from_secs(2), echo.closed.recv())
            .await
            .expect("destination connection was not closed");
    }
}
