//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use tls_reverse_proxy::config::{BackendConfig, ProxyConfig};
use tls_reverse_proxy::Supervisor;

/// A running mock backend and what it has seen.
#[derive(Clone)]
pub struct MockBackend {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MockBackend {
    /// Connections accepted so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Raw request bytes received, one entry per connection.
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.requests.lock().unwrap().clone()
    }
}

/// Build a complete HTTP/1.1 response.
pub fn http_response(status: u16, body: &str) -> Vec<u8> {
    let status_text = match status {
        200 => "200 OK",
        404 => "404 Not Found",
        500 => "500 Internal Server Error",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    };
    format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_text,
        body.len(),
        body
    )
    .into_bytes()
}

/// Start a mock backend that returns `200 OK` with `body`.
pub async fn start_mock_backend(body: &str) -> MockBackend {
    start_backend(http_response(200, body)).await
}

/// Start a mock backend that records each request and answers with
/// `response`, then closes.
pub async fn start_backend(response: Vec<u8>) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = MockBackend {
        addr: listener.local_addr().unwrap(),
        hits: Arc::new(AtomicUsize::new(0)),
        requests: Arc::new(Mutex::new(Vec::new())),
    };
    let response = Arc::new(response);

    let state = backend.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    state.hits.fetch_add(1, Ordering::SeqCst);
                    let state = state.clone();
                    let response = Arc::clone(&response);
                    tokio::spawn(async move {
                        let request = read_request(&mut socket).await;
                        state.requests.lock().unwrap().push(request);
                        let _ = socket.write_all(&response).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    backend
}

/// Start a backend that accepts connections and never answers.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// An address with nothing listening on it.
pub fn refused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

async fn read_request(socket: &mut TcpStream) -> Vec<u8> {
    let mut received = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        if let Some(end) = header_end(&received) {
            if received.len() >= end + content_length(&received[..end]) {
                break;
            }
        }
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => received.extend_from_slice(&buf[..n]),
        }
    }
    received
}

fn header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

fn content_length(head: &[u8]) -> usize {
    String::from_utf8_lossy(head)
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse().ok())
                .flatten()
        })
        .unwrap_or(0)
}

/// Plaintext proxy config on an ephemeral local port.
pub fn proxy_config(backends: &[(SocketAddr, Option<&str>)]) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.workers.count = 2;
    for (i, (addr, prefix)) in backends.iter().enumerate() {
        config.backends.push(BackendConfig {
            name: format!("backend-{i}"),
            ip: addr.ip().to_string(),
            port: addr.port(),
            path_prefix: prefix.map(str::to_string),
        });
    }
    config
}

pub fn start_proxy(config: &ProxyConfig) -> Supervisor {
    Supervisor::start(config).unwrap()
}

/// Trigger shutdown and wait for the workers. Returns the failed count.
pub async fn stop_proxy(supervisor: Supervisor) -> usize {
    supervisor.shutdown();
    tokio::task::spawn_blocking(move || supervisor.join()).await.unwrap()
}

/// Send raw bytes and collect everything the proxy returns before closing.
pub async fn send_request(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut response = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut response))
        .await
        .expect("proxy did not close the connection");
    response
}
