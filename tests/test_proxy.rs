//! End-to-end tests over real sockets on ephemeral ports.
//!
//! Each test spins up the accept loop with its own rule set and a bare
//! tokio TcpListener standing in for the upstream backend.

use courier::config::{Config, RuleConfig};
use courier::server::{ServerContext, listener};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;

/// Start the proxy with the given rules on an ephemeral port.
async fn start_proxy(rules: Vec<RuleConfig>) -> SocketAddr {
    let cfg = Config {
        listen_addr: String::new(),
        rules,
    };
    let ctx = Arc::new(ServerContext::from_config(&cfg).unwrap());

    let sock = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = sock.local_addr().unwrap();
    tokio::spawn(listener::serve(sock, ctx));
    addr
}

fn events_rule(target: &str, change_origin: bool) -> RuleConfig {
    RuleConfig {
        path_prefix: "/events".to_string(),
        target: target.to_string(),
        change_origin,
        secure: true,
    }
}

async fn send_get(addr: SocketAddr, path: &str) -> TcpStream {
    let mut client = TcpStream::connect(addr).await.unwrap();
    let req = format!(
        "GET {} HTTP/1.1\r\nHost: localhost:9999\r\nConnection: close\r\n\r\n",
        path
    );
    client.write_all(req.as_bytes()).await.unwrap();
    client
}

async fn read_to_end(client: &mut TcpStream) -> String {
    let mut out = Vec::new();
    client.read_to_end(&mut out).await.unwrap();
    String::from_utf8_lossy(&out).into_owned()
}

#[tokio::test]
async fn test_forwards_matching_request_and_rewrites_host() {
    let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend_addr = backend.local_addr().unwrap();
    let (head_tx, head_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut sock, _) = backend.accept().await.unwrap();

        let mut buf = vec![0u8; 4096];
        let n = sock.read(&mut buf).await.unwrap();
        head_tx.send(String::from_utf8_lossy(&buf[..n]).into_owned()).unwrap();

        sock.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
            .await
            .unwrap();
    });

    let proxy = start_proxy(vec![events_rule(
        &format!("http://{}", backend_addr),
        true,
    )])
    .await;

    let mut client = send_get(proxy, "/events").await;
    let response = read_to_end(&mut client).await;

    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.ends_with("ok"));

    let seen_by_backend = head_rx.await.unwrap();
    assert!(seen_by_backend.starts_with("GET /events HTTP/1.1\r\n"));
    assert!(seen_by_backend.contains(&format!("Host: {}\r\n", backend_addr)));
    assert!(!seen_by_backend.contains("localhost:9999"));
}

#[tokio::test]
async fn test_unmatched_path_gets_default_response() {
    let proxy = start_proxy(vec![events_rule("http://127.0.0.1:9", false)]).await;

    let mut client = send_get(proxy, "/index.html").await;
    let response = read_to_end(&mut client).await;

    assert!(response.starts_with("HTTP/1.1 404 Not Found"));
}

#[tokio::test]
async fn test_unreachable_upstream_yields_gateway_error() {
    // Port 9 (discard) is almost certainly closed; connect is refused fast.
    let proxy = start_proxy(vec![events_rule("http://127.0.0.1:9", false)]).await;

    let mut client = send_get(proxy, "/events").await;
    let response = timeout(Duration::from_secs(10), read_to_end(&mut client))
        .await
        .expect("gateway error not delivered in time");

    assert!(response.starts_with("HTTP/1.1 502 Bad Gateway"));

    // The failure is local to that request: the server keeps serving.
    let mut client = send_get(proxy, "/other").await;
    let response = read_to_end(&mut client).await;
    assert!(response.starts_with("HTTP/1.1 404 Not Found"));
}

#[tokio::test]
async fn test_malformed_request_gets_400() {
    let proxy = start_proxy(vec![events_rule("http://127.0.0.1:9", false)]).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client
        .write_all(b"YEET /events HTTP/1.1\r\n\r\n")
        .await
        .unwrap();

    let response = read_to_end(&mut client).await;
    assert!(response.starts_with("HTTP/1.1 400 Bad Request"));
}

#[tokio::test]
async fn test_bogus_content_length_gets_400() {
    let proxy = start_proxy(vec![events_rule("http://127.0.0.1:9", false)]).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client
        .write_all(b"POST /events HTTP/1.1\r\nHost: localhost\r\nContent-Length: nope\r\n\r\n")
        .await
        .unwrap();

    let response = read_to_end(&mut client).await;
    assert!(response.starts_with("HTTP/1.1 400 Bad Request"));
}

#[tokio::test]
async fn test_streamed_response_arrives_incrementally() {
    let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend_addr = backend.local_addr().unwrap();
    let (release_tx, release_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let (mut sock, _) = backend.accept().await.unwrap();

        let mut buf = vec![0u8; 4096];
        sock.read(&mut buf).await.unwrap();

        // No Content-Length: the stream stays open until we close it.
        sock.write_all(
            b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\n\r\ndata: one\n\n",
        )
        .await
        .unwrap();
        sock.flush().await.unwrap();

        // Hold the second event until the test has seen the first.
        release_rx.await.unwrap();
        sock.write_all(b"data: two\n\n").await.unwrap();
    });

    let proxy = start_proxy(vec![events_rule(
        &format!("http://{}", backend_addr),
        false,
    )])
    .await;

    let mut client = send_get(proxy, "/events").await;

    // First chunk must arrive while the backend is still holding the
    // second one back, i.e. without any full-response buffering.
    let mut seen = String::new();
    let mut buf = [0u8; 1024];
    while !seen.contains("data: one\n\n") {
        let n = timeout(Duration::from_secs(5), client.read(&mut buf))
            .await
            .expect("first event not delivered in time")
            .unwrap();
        assert!(n > 0, "stream closed before first event");
        seen.push_str(&String::from_utf8_lossy(&buf[..n]));
    }
    assert!(!seen.contains("data: two"));

    release_tx.send(()).unwrap();

    let rest = read_to_end(&mut client).await;
    assert!((seen + &rest).contains("data: two\n\n"));
}

#[tokio::test]
async fn test_client_disconnect_tears_down_upstream() {
    let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend_addr = backend.local_addr().unwrap();
    let (eof_tx, eof_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let (mut sock, _) = backend.accept().await.unwrap();

        let mut buf = vec![0u8; 4096];
        sock.read(&mut buf).await.unwrap();

        // Open-ended stream, then wait for the proxy to hang up on us.
        sock.write_all(b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\n\r\ndata: hi\n\n")
            .await
            .unwrap();

        loop {
            match sock.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        eof_tx.send(()).unwrap();
    });

    let proxy = start_proxy(vec![events_rule(
        &format!("http://{}", backend_addr),
        false,
    )])
    .await;

    let mut client = send_get(proxy, "/events").await;
    let mut buf = [0u8; 1024];
    let n = client.read(&mut buf).await.unwrap();
    assert!(n > 0);

    // Walk away mid-stream.
    drop(client);

    timeout(Duration::from_secs(5), eof_rx)
        .await
        .expect("upstream connection not closed after client disconnect")
        .unwrap();
}
