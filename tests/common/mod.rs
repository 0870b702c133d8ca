//! Shared utilities for integration testing.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use blackwall::config::EngineConfig;
use blackwall::request::RequestContext;

/// Fixed base timestamp so time-dependent behavior is deterministic.
pub const T0: u64 = 1_700_000_000_000;

/// Engine config with limits generous enough that only the behavior under
/// test can trip them.
#[allow(dead_code)]
pub fn engine_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.rate_limit.burst_limit = 1_000;
    config.rate_limit.per_minute = 10_000;
    config.rate_limit.per_hour = 100_000;
    config
}

#[allow(dead_code)]
pub fn request(client: &str, path: &str, now_ms: u64) -> RequestContext {
    RequestContext::new(client.parse::<IpAddr>().unwrap(), "POST", path, now_ms)
}

/// The classic login injection from the example suite.
#[allow(dead_code)]
pub fn sqli_login(client: &str, now_ms: u64) -> RequestContext {
    request(client, "/login", now_ms)
        .with_body(br#"{"username": "admin' OR '1'='1", "password": "test"}"#.to_vec())
}

/// A payload that only trips a medium-severity signature, so the decision
/// is ambiguous under the default policy.
#[allow(dead_code)]
pub fn ambiguous_request(client: &str, now_ms: u64) -> RequestContext {
    request(client, "/users", now_ms)
        .with_body(br#"{"name": "x", "bio": "<iframe src=a>"}"#.to_vec())
}

#[allow(dead_code)]
pub fn benign_request(client: &str, now_ms: u64) -> RequestContext {
    request(client, "/login", now_ms)
        .with_body(br#"{"username": "admin", "password": "password123"}"#.to_vec())
}

/// Start a mock analysis service that answers every POST with `body` after
/// `delay`. Returns the bound address.
#[allow(dead_code)]
pub async fn start_mock_analyst(body: String, delay: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let body = body.clone();
                    tokio::spawn(async move {
                        read_request(&mut socket).await;
                        tokio::time::sleep(delay).await;
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

#[allow(dead_code)]
pub fn verdict_body(malicious: bool) -> String {
    format!(r#"{{"malicious": {}, "rationale": "mock analysis"}}"#, malicious)
}

/// Drain one HTTP request: headers, then as much body as Content-Length
/// declares. Keeps the client happy before we answer.
#[allow(dead_code)]
async fn read_request(socket: &mut tokio::net::TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = find_header_end(&buf) {
                    break pos;
                }
                if buf.len() > 64 * 1024 {
                    return;
                }
            }
        }
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]);
    let content_length = headers
        .lines()
        .find_map(|l| l.to_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body_read = buf.len() - (header_end + 4);
    while body_read < content_length {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => body_read += n,
        }
    }
}

#[allow(dead_code)]
fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
