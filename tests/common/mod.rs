//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use provider_resilience::config::{parse_config, AppConfig};
use provider_resilience::credentials::{Credentials, StaticCredentialSource};
use provider_resilience::lifecycle::{self, Runtime};
use provider_resilience::transport::ReqwestTransport;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// What the mock backend saw.
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
}

/// What the mock backend answers.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl MockResponse {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: body.to_string(),
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        401 => "Unauthorized",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

async fn read_request(socket: &mut TcpStream) -> Option<MockRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    // Drain any body so the client never sees a reset.
    let body_len: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut received = buf.len() - (head_end + 4);
    while received < body_len {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        received += n;
    }

    Some(MockRequest { method, path, headers })
}

/// Start a programmable mock backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(MockRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockResponse> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let Some(request) = read_request(&mut socket).await else {
                            return;
                        };
                        let response = f(request).await;
                        let mut head = format!(
                            "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
                            response.status,
                            status_text(response.status),
                            response.body.len()
                        );
                        for (name, value) in &response.headers {
                            head.push_str(&format!("{}: {}\r\n", name, value));
                        }
                        head.push_str("\r\n");
                        let _ = socket.write_all(head.as_bytes()).await;
                        let _ = socket.write_all(response.body.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a backend that always answers with `response`, counting hits.
pub async fn start_mock_backend(response: MockResponse) -> (SocketAddr, Arc<AtomicU32>) {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let addr = start_programmable_backend(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        let response = response.clone();
        async move { response }
    })
    .await;
    (addr, hits)
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// One `[[providers]]` block; `extra` holds additional keys such as
/// `resilience = { max_retries = 0 }`.
pub fn provider_block(id: &str, category: &str, addr: SocketAddr, priority: u32, extra: &str) -> String {
    format!(
        r#"
[[providers]]
id = "{id}"
category = "{category}"
base_url = "http://{addr}"
priority = {priority}
search_path = "/search"
results_pointer = "/results"
{extra}
"#
    )
}

/// Parse a full config with short delays, no jitter and no health loop.
pub fn test_config(providers: &[String]) -> AppConfig {
    let content = format!(
        r#"
[resilience]
max_retries = 2
base_delay_ms = 20
jitter_ms = 0
timeout_ms = 2000
failure_threshold = 3
reset_timeout_ms = 60000

[health_check]
enabled = false

{}
"#,
        providers.join("\n")
    );
    parse_config(&content).expect("test config must be valid")
}

/// API key credentials for every id in `ids`.
pub fn api_keys(ids: &[&str]) -> Arc<StaticCredentialSource> {
    let source = ids.iter().fold(StaticCredentialSource::new(), |source, id| {
        source.with(*id, Credentials::new().with("api_key", format!("{}-secret", id)))
    });
    Arc::new(source)
}

/// Start a runtime over the real HTTP transport.
pub async fn start_runtime(config: AppConfig, credentials: Arc<StaticCredentialSource>) -> Runtime {
    let client = reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("client must build");
    let transport = Arc::new(ReqwestTransport::with_client(client));
    lifecycle::start_with(config, transport, credentials).await
}

/// Valid flight search parameters.
pub fn flight_params() -> provider_resilience::providers::SearchParams {
    match serde_json::json!({
        "origin": "LIS",
        "destination": "JFK",
        "departure_date": "2026-06-01"
    }) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    }
}
