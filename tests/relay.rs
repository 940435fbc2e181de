//! End-to-end relay tests over plaintext TCP.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

mod common;

#[tokio::test]
async fn test_request_forwarded_verbatim() {
    let backend = common::start_mock_backend("Hello from backend").await;
    let proxy = common::start_proxy(&common::proxy_config(&[(backend.addr, None)]));

    let request = b"POST /api/users HTTP/1.1\r\nHost: example.com\r\nX-Custom:  spaced\r\nContent-Length: 13\r\n\r\n{\"name\":\"x\"}\n";
    let response = common::send_request(proxy.local_addr(), request).await;

    assert_eq!(response, common::http_response(200, "Hello from backend"));
    assert_eq!(backend.requests(), vec![request.to_vec()]);

    assert_eq!(common::stop_proxy(proxy).await, 0);
}

#[tokio::test]
async fn test_routes_by_path_prefix() {
    let auth = common::start_mock_backend("auth").await;
    let default = common::start_mock_backend("default").await;
    let proxy = common::start_proxy(&common::proxy_config(&[
        (auth.addr, Some("/api/auth")),
        (default.addr, None),
    ]));
    let addr = proxy.local_addr();

    let response = common::send_request(addr, b"GET /api/auth/login HTTP/1.1\r\n\r\n").await;
    assert_eq!(response, common::http_response(200, "auth"));

    let response = common::send_request(addr, b"GET /home HTTP/1.1\r\n\r\n").await;
    assert_eq!(response, common::http_response(200, "default"));

    // Prefix match is byte-wise, not segment-wise.
    let response = common::send_request(addr, b"GET /api/authz HTTP/1.1\r\n\r\n").await;
    assert_eq!(response, common::http_response(200, "auth"));

    assert_eq!(auth.hits(), 2);
    assert_eq!(default.hits(), 1);
    common::stop_proxy(proxy).await;
}

#[tokio::test]
async fn test_request_in_fragments() {
    let backend = common::start_mock_backend("ok").await;
    let proxy = common::start_proxy(&common::proxy_config(&[(backend.addr, None)]));

    let request = b"GET /slow HTTP/1.1\r\nHost: localhost\r\nAccept: */*\r\n\r\n";
    let mut stream = TcpStream::connect(proxy.local_addr()).await.unwrap();
    for piece in request.chunks(5) {
        stream.write_all(piece).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();

    assert_eq!(response, common::http_response(200, "ok"));
    assert_eq!(backend.requests(), vec![request.to_vec()]);
    common::stop_proxy(proxy).await;
}

#[tokio::test]
async fn test_large_response_relayed_completely() {
    let body = "x".repeat(2 * 1024 * 1024);
    let backend = common::start_mock_backend(&body).await;
    let mut config = common::proxy_config(&[(backend.addr, None)]);
    config.connection.relay_chunk_size = 4096;
    let proxy = common::start_proxy(&config);

    let mut stream = TcpStream::connect(proxy.local_addr()).await.unwrap();
    stream.write_all(b"GET /big HTTP/1.1\r\n\r\n").await.unwrap();

    // Read slowly at first so the proxy has to hold bytes back.
    let mut response = Vec::new();
    let mut buf = [0u8; 1024];
    for _ in 0..32 {
        let n = stream.read(&mut buf).await.unwrap();
        response.extend_from_slice(&buf[..n]);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    stream.read_to_end(&mut response).await.unwrap();

    assert_eq!(response, common::http_response(200, &body));
    common::stop_proxy(proxy).await;
}

#[tokio::test]
async fn test_cache_serves_repeat_get() {
    let backend = common::start_mock_backend("cached body").await;
    let mut config = common::proxy_config(&[(backend.addr, None)]);
    config.workers.count = 1;
    config.cache.enabled = true;
    let proxy = common::start_proxy(&config);
    let addr = proxy.local_addr();

    let first = common::send_request(addr, b"GET /status HTTP/1.1\r\n\r\n").await;
    let second = common::send_request(addr, b"GET /status HTTP/1.1\r\n\r\n").await;

    assert_eq!(first, common::http_response(200, "cached body"));
    assert_eq!(second, first);
    assert_eq!(backend.hits(), 1);

    // A different path is a miss.
    common::send_request(addr, b"GET /other HTTP/1.1\r\n\r\n").await;
    assert_eq!(backend.hits(), 2);
    common::stop_proxy(proxy).await;
}

#[tokio::test]
async fn test_cache_expires_after_ttl() {
    let backend = common::start_mock_backend("fresh").await;
    let mut config = common::proxy_config(&[(backend.addr, None)]);
    config.workers.count = 1;
    config.cache.enabled = true;
    config.cache.default_ttl_secs = 1;
    let proxy = common::start_proxy(&config);
    let addr = proxy.local_addr();

    common::send_request(addr, b"GET /status HTTP/1.1\r\n\r\n").await;
    common::send_request(addr, b"GET /status HTTP/1.1\r\n\r\n").await;
    assert_eq!(backend.hits(), 1);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    common::send_request(addr, b"GET /status HTTP/1.1\r\n\r\n").await;
    assert_eq!(backend.hits(), 2);
    common::stop_proxy(proxy).await;
}

#[tokio::test]
async fn test_only_bodyless_get_ok_responses_are_cached() {
    let failing = common::start_backend(common::http_response(503, "busy")).await;
    let ok = common::start_mock_backend("created").await;
    let mut config = common::proxy_config(&[(failing.addr, Some("/flaky")), (ok.addr, None)]);
    config.workers.count = 1;
    config.cache.enabled = true;
    let proxy = common::start_proxy(&config);
    let addr = proxy.local_addr();

    for _ in 0..2 {
        let response = common::send_request(addr, b"GET /flaky HTTP/1.1\r\n\r\n").await;
        assert_eq!(response, common::http_response(503, "busy"));
    }
    assert_eq!(failing.hits(), 2);

    for _ in 0..2 {
        common::send_request(addr, b"POST /items HTTP/1.1\r\nContent-Length: 2\r\n\r\nhi").await;
    }
    assert_eq!(ok.hits(), 2);
    common::stop_proxy(proxy).await;
}

#[tokio::test]
async fn test_oversized_response_not_cached() {
    let body = "y".repeat(4096);
    let backend = common::start_mock_backend(&body).await;
    let mut config = common::proxy_config(&[(backend.addr, None)]);
    config.workers.count = 1;
    config.cache.enabled = true;
    config.cache.max_object_bytes = 1024;
    let proxy = common::start_proxy(&config);
    let addr = proxy.local_addr();

    for _ in 0..2 {
        let response = common::send_request(addr, b"GET /big HTTP/1.1\r\n\r\n").await;
        assert_eq!(response, common::http_response(200, &body));
    }
    assert_eq!(backend.hits(), 2);
    common::stop_proxy(proxy).await;
}
