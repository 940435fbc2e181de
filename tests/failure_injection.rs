//! Failure injection tests for the reverse proxy.

use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

mod common;

#[tokio::test]
async fn test_malformed_request_closed_without_response() {
    let backend = common::start_mock_backend("unused").await;
    let proxy = common::start_proxy(&common::proxy_config(&[(backend.addr, None)]));
    let addr = proxy.local_addr();

    let response = common::send_request(addr, b"NOT-HTTP\r\n\r\n").await;
    assert!(response.is_empty());

    let response = common::send_request(addr, b"GET / HTTP/1.1\r\nBadHeader\r\n\r\n").await;
    assert!(response.is_empty());

    let response =
        common::send_request(addr, b"POST / HTTP/1.1\r\nContent-Length: abc\r\n\r\n").await;
    assert!(response.is_empty());

    assert_eq!(backend.hits(), 0);

    // The worker keeps serving after malformed input.
    let response = common::send_request(addr, b"GET / HTTP/1.1\r\n\r\n").await;
    assert_eq!(response, common::http_response(200, "unused"));
    common::stop_proxy(proxy).await;
}

#[tokio::test]
async fn test_oversized_request_closed() {
    let backend = common::start_mock_backend("unused").await;
    let mut config = common::proxy_config(&[(backend.addr, None)]);
    config.connection.buffer_size = 1024;
    let proxy = common::start_proxy(&config);

    let mut stream = TcpStream::connect(proxy.local_addr()).await.unwrap();
    let header = format!("GET / HTTP/1.1\r\nX-Filler: {}\r\n", "a".repeat(2048));
    // The proxy may reset the socket mid-write once its buffer is full.
    let _ = stream.write_all(header.as_bytes()).await;
    let mut response = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("proxy did not close the connection");

    assert!(response.is_empty());
    assert_eq!(backend.hits(), 0);
    common::stop_proxy(proxy).await;
}

#[tokio::test]
async fn test_unroutable_path_closed() {
    let backend = common::start_mock_backend("api").await;
    let proxy = common::start_proxy(&common::proxy_config(&[(backend.addr, Some("/api"))]));

    let response = common::send_request(proxy.local_addr(), b"GET /home HTTP/1.1\r\n\r\n").await;
    assert!(response.is_empty());
    assert_eq!(backend.hits(), 0);
    common::stop_proxy(proxy).await;
}

#[tokio::test]
async fn test_refused_backend_closes_client() {
    let proxy = common::start_proxy(&common::proxy_config(&[(common::refused_addr(), None)]));

    let response = common::send_request(proxy.local_addr(), b"GET / HTTP/1.1\r\n\r\n").await;
    assert!(response.is_empty());
    assert_eq!(common::stop_proxy(proxy).await, 0);
}

#[tokio::test]
async fn test_stalled_backend_times_out() {
    let backend = common::start_silent_backend().await;
    let mut config = common::proxy_config(&[(backend, None)]);
    config.connection.timeout_secs = 1;
    let proxy = common::start_proxy(&config);

    let start = Instant::now();
    let response = common::send_request(proxy.local_addr(), b"GET / HTTP/1.1\r\n\r\n").await;
    let elapsed = start.elapsed();

    assert!(response.is_empty());
    assert!(elapsed >= Duration::from_millis(900), "closed after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "closed after {elapsed:?}");
    common::stop_proxy(proxy).await;
}

#[tokio::test]
async fn test_idle_client_times_out() {
    let backend = common::start_mock_backend("unused").await;
    let mut config = common::proxy_config(&[(backend.addr, None)]);
    config.connection.timeout_secs = 1;
    let proxy = common::start_proxy(&config);

    let mut stream = TcpStream::connect(proxy.local_addr()).await.unwrap();
    stream.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();
    let mut response = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("idle connection was never closed");

    assert!(response.is_empty());
    assert_eq!(backend.hits(), 0);
    common::stop_proxy(proxy).await;
}

#[tokio::test]
async fn test_shutdown_closes_open_connections() {
    let backend = common::start_mock_backend("unused").await;
    let proxy = common::start_proxy(&common::proxy_config(&[(backend.addr, None)]));

    let mut stream = TcpStream::connect(proxy.local_addr()).await.unwrap();
    stream.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let failed = tokio::time::timeout(Duration::from_secs(5), common::stop_proxy(proxy))
        .await
        .expect("workers did not stop");
    assert_eq!(failed, 0);

    let mut response = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("connection left open after shutdown");
    assert!(response.is_empty());
}

#[tokio::test]
async fn test_client_disconnect_mid_request() {
    let backend = common::start_mock_backend("still here").await;
    let proxy = common::start_proxy(&common::proxy_config(&[(backend.addr, None)]));
    let addr = proxy.local_addr();

    for _ in 0..10 {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET /partial HT").await.unwrap();
        drop(stream);
    }

    let response = common::send_request(addr, b"GET / HTTP/1.1\r\n\r\n").await;
    assert_eq!(response, common::http_response(200, "still here"));
    assert_eq!(backend.hits(), 1);
    common::stop_proxy(proxy).await;
}
