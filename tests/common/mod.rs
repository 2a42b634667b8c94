//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

use dev_proxy::config::schema::{LoggerConfig, ProxyOptions};
use dev_proxy::observability::{CapturingLogger, ProxyLogger};
use dev_proxy::plugin::LoggerFactory;
use dev_proxy::{HttpServer, ProxyPlugin, RouteTable, Shutdown};

/// Handshake headers seen by the WebSocket backend, lowercased names.
pub type SeenHeaders = Arc<Mutex<Vec<(String, String)>>>;

/// `Content-Length` of a raw request head, zero when absent.
fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Start a backend that answers every request with the request it received.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut head = Vec::new();
                        let mut buf = [0u8; 1024];
                        let head_end = loop {
                            if let Some(at) = head.windows(4).position(|w| w == b"\r\n\r\n") {
                                break at + 4;
                            }
                            match socket.read(&mut buf).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => head.extend_from_slice(&buf[..n]),
                            }
                        };
                        let expected = head_end + content_length(&String::from_utf8_lossy(&head[..head_end]));
                        while head.len() < expected {
                            match socket.read(&mut buf).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => head.extend_from_slice(&buf[..n]),
                            }
                        }
                        let body = String::from_utf8_lossy(&head).to_string();
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
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

/// Start a WebSocket backend that echoes text and binary frames.
pub async fn start_ws_echo_backend() -> (SocketAddr, SeenHeaders) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen: SeenHeaders = Arc::new(Mutex::new(Vec::new()));
    let recorded = seen.clone();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let recorded = recorded.clone();
            tokio::spawn(async move {
                let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                    let mut seen = recorded.lock().unwrap();
                    for (name, value) in request.headers() {
                        seen.push((
                            name.as_str().to_string(),
                            value.to_str().unwrap_or_default().to_string(),
                        ));
                    }
                    Ok(response)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(socket, callback).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    match message {
                        Message::Text(_) | Message::Binary(_) => {
                            if ws.send(message).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
            });
        }
    });

    (addr, seen)
}

/// An address with nothing listening on it.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Plugin whose logger records every event.
pub fn capturing_plugin(options: ProxyOptions) -> (ProxyPlugin, Arc<CapturingLogger>) {
    plugin_with_logger(options, CapturingLogger::new())
}

/// Plugin logging into `logger`.
pub fn plugin_with_logger(
    options: ProxyOptions,
    logger: Arc<CapturingLogger>,
) -> (ProxyPlugin, Arc<CapturingLogger>) {
    let shared = logger.clone();
    let factory: LoggerFactory =
        Arc::new(move |_: &LoggerConfig| shared.clone() as Arc<dyn ProxyLogger>);
    (ProxyPlugin::with_logger_factory(options, factory), logger)
}

/// Serve `routes` on an ephemeral port.
pub async fn start_proxy(routes: RouteTable) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = HttpServer::new(routes).run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Poll `check` until it holds or two seconds pass.
#[allow(dead_code)]
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..40 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}
