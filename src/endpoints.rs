//! Endpoint server for metrics, health checks and the relay operations
//!
//! A small HTTP/1.1 responder on a plain tokio listener: `GET /health`,
//! `GET /metrics` unless disabled, and, when a relayer is attached,
//! `POST /relay` and `POST /quote` with JSON bodies. One request per
//! connection; a request that is not fully read within the read timeout is
//! answered with 408, and at most `max_connections` are served at once.

use crate::api::{handle_quote, handle_relay, ApiResponse, QuoteRequest, RelayRequest};
use crate::metrics::metrics;
use crate::relay::Relayer;
use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

/// Request bodies above this size are refused
const MAX_BODY_BYTES: usize = 64 * 1024;
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Listener behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointOptions {
    pub expose_metrics: bool,
    /// Deadline for receiving the whole request, headers and body
    pub read_timeout: Duration,
    pub max_connections: usize,
}

impl Default for EndpointOptions {
    fn default() -> Self {
        Self {
            expose_metrics: true,
            read_timeout: Duration::from_secs(10),
            max_connections: 256,
        }
    }
}

/// Start the endpoint server
pub async fn endpoint_server(
    port: u16,
    relayer: Option<Arc<Relayer>>,
    options: EndpointOptions,
) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Endpoint server listening on {}", addr);
    serve(listener, relayer, options).await
}

/// Accept connections on an already bound listener
pub async fn serve(
    listener: TcpListener,
    relayer: Option<Arc<Relayer>>,
    options: EndpointOptions,
) -> Result<()> {
    let limiter = Arc::new(Semaphore::new(options.max_connections.max(1)));
    loop {
        // Stop accepting while every slot is busy
        let permit = Arc::clone(&limiter).acquire_owned().await?;
        match listener.accept().await {
            Ok((socket, peer)) => {
                let relayer = relayer.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(socket, relayer, options).await {
                        tracing::debug!(peer = %peer, error = %e, "Connection error");
                    }
                    drop(permit);
                });
            }
            Err(e) => {
                tracing::error!("Failed to accept connection: {}", e);
            }
        }
    }
}

struct Request {
    method: String,
    path: String,
    body: Vec<u8>,
}

async fn handle_connection(
    mut socket: TcpStream,
    relayer: Option<Arc<Relayer>>,
    options: EndpointOptions,
) -> Result<()> {
    let read = tokio::time::timeout(options.read_timeout, read_request(&mut socket)).await;
    let response = match read {
        Ok(request) => match request? {
            Some(request) => route(request, relayer.as_deref(), options.expose_metrics).await,
            None => (400, "text/plain", "Bad Request".to_string()),
        },
        Err(_) => {
            tracing::debug!(
                timeout_ms = options.read_timeout.as_millis() as u64,
                "Request read timed out"
            );
            (408, "text/plain", "Request Timeout".to_string())
        }
    };
    let (status, content_type, body) = response;
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        reason(status),
        content_type,
        body.len()
    );
    socket.write_all(head.as_bytes()).await?;
    socket.write_all(body.as_bytes()).await?;
    socket.shutdown().await?;
    Ok(())
}

async fn route(
    request: Request,
    relayer: Option<&Relayer>,
    expose_metrics: bool,
) -> (u16, &'static str, String) {
    match (request.method.as_str(), request.path.as_str(), relayer) {
        ("GET", "/health", _) => (200, "application/json", json!({"status": "ok"}).to_string()),
        ("GET", "/metrics", _) if expose_metrics => match metrics().encode_text() {
            Ok(text) => (200, "text/plain; version=0.0.4", text),
            Err(e) => (500, "text/plain", e.to_string()),
        },
        ("POST", "/relay", Some(relayer)) => match serde_json::from_slice::<RelayRequest>(&request.body) {
            Ok(body) => json_response(handle_relay(relayer, body).await),
            Err(e) => bad_json(e),
        },
        ("POST", "/quote", Some(relayer)) => match serde_json::from_slice::<QuoteRequest>(&request.body) {
            Ok(body) => json_response(handle_quote(relayer, body).await),
            Err(e) => bad_json(e),
        },
        _ => (404, "text/plain", "Not Found".to_string()),
    }
}

fn json_response(response: ApiResponse) -> (u16, &'static str, String) {
    (response.status, "application/json", response.body.to_string())
}

fn bad_json(err: serde_json::Error) -> (u16, &'static str, String) {
    (
        400,
        "application/json",
        json!({"error": err.to_string(), "code": "InvalidRequest"}).to_string(),
    )
}

/// Read the request line, headers and a `Content-Length` body
async fn read_request(socket: &mut TcpStream) -> Result<Option<Request>> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_HEADER_BYTES {
            return Ok(None);
        }
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let (Some(method), Some(path)) = (request_line.next(), request_line.next()) else {
        return Ok(None);
    };

    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > MAX_BODY_BYTES {
        return Ok(None);
    }

    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(Some(Request {
        method: method.to_string(),
        path: path.to_string(),
        body,
    }))
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        408 => "Request Timeout",
        409 => "Conflict",
        502 => "Bad Gateway",
        _ => "Internal Server Error",
    }
}
