//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Forward the client's upgrade headers, then run the upgrade hook
//! - Connect to the backend before answering the client
//! - Complete the client upgrade, mirroring the negotiated subprotocol
//! - Bidirectional frame forwarding
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Proxy ←──── WebSocket frames ────→ Backend
//! ```
//!
//! # Design Decisions
//! - Backend handshake failures answer the client with 502/504, no upgrade
//! - Frame-level forwarding (no message buffering)
//! - Close frames propagated in both directions
//! - Ping/pong answered by each side, never forwarded

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{self, WebSocket, WebSocketUpgrade};
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::ProxyError;
use crate::http::request::{apply_route_headers, upgrade_forward_headers};
use crate::observability::FrameDirection;
use crate::proxy::{Instrumenter, RequestInfo};

type BackendStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Tunnel a WebSocket upgrade request through `route`.
pub(crate) async fn tunnel(
    route: Arc<Instrumenter>,
    mut parts: Parts,
    peer_addr: Option<SocketAddr>,
) -> Response {
    let request = RequestInfo::from_parts(&parts);
    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    let ws_url = route.route().websocket_url(&request.url);
    let mut handshake_headers = upgrade_forward_headers(&request.headers);
    if !route.route().change_origin {
        if let Some(host) = request.headers.get(header::HOST) {
            handshake_headers.insert(header::HOST, host.clone());
        }
    }
    apply_route_headers(&mut handshake_headers, route.route());
    if let Some(protocols) = requested_protocols(&request, route.as_ref()) {
        handshake_headers.insert(header::SEC_WEBSOCKET_PROTOCOL, protocols);
    }
    route
        .on_upgrade(&request, peer_addr, &mut handshake_headers)
        .await;

    let (backend, protocol) = match connect_backend(&ws_url, handshake_headers, route.as_ref()).await {
        Ok(connected) => connected,
        Err(e) => {
            route.on_error(&request, &e);
            return e.into_response();
        }
    };

    let upgrade = match protocol {
        Some(protocol) => upgrade.protocols([protocol]),
        None => upgrade,
    };

    let failed_route = route.clone();
    let failed_request = request.clone();
    upgrade
        .on_failed_upgrade(move |e: axum::Error| failed_route.on_error(&failed_request, &e))
        .on_upgrade(move |socket| async move {
            relay(socket, backend, &route, &ws_url).await;
            route.on_close(&request);
        })
}

/// Subprotocols offered to the backend: whatever the client asked for, or
/// the route's configured list.
fn requested_protocols(request: &RequestInfo, route: &Instrumenter) -> Option<HeaderValue> {
    if let Some(offered) = request.headers.get(header::SEC_WEBSOCKET_PROTOCOL) {
        return Some(offered.clone());
    }
    match &route.route().ws.protocols {
        Some(protocols) if !protocols.is_empty() => HeaderValue::from_str(&protocols.join(", ")).ok(),
        _ => None,
    }
}

async fn connect_backend(
    ws_url: &str,
    handshake_headers: HeaderMap,
    route: &Instrumenter,
) -> Result<(BackendStream, Option<String>), ProxyError> {
    let mut backend_request = ws_url.into_client_request()?;
    let headers = backend_request.headers_mut();
    for name in handshake_headers.keys() {
        headers.remove(name);
    }
    for (name, value) in &handshake_headers {
        headers.append(name.clone(), value.clone());
    }

    let timeout = route.route().timeout;
    let (stream, response) = tokio::time::timeout(timeout, connect_async(backend_request))
        .await
        .map_err(|_| ProxyError::Timeout(timeout))??;

    let protocol = response
        .headers()
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    tracing::debug!(url = %ws_url, protocol = ?protocol, "Backend WebSocket connected");
    Ok((stream, protocol))
}

async fn relay(client: WebSocket, backend: BackendStream, route: &Instrumenter, ws_url: &str) {
    let (mut client_tx, mut client_rx) = client.split();
    let (mut backend_tx, mut backend_rx) = backend.split();

    let client_to_backend = async {
        while let Some(Ok(message)) = client_rx.next().await {
            if let ws::Message::Text(text) = &message {
                route.log_frame(FrameDirection::ClientToBackend, ws_url, text.as_str());
            }
            let closing = matches!(message, ws::Message::Close(_));
            if let Some(message) = to_backend(message) {
                if backend_tx.send(message).await.is_err() {
                    break;
                }
            }
            if closing {
                break;
            }
        }
    };

    let backend_to_client = async {
        while let Some(Ok(message)) = backend_rx.next().await {
            if let Message::Text(text) = &message {
                route.log_frame(FrameDirection::BackendToClient, ws_url, text.as_str());
            }
            let closing = matches!(message, Message::Close(_));
            if let Some(message) = to_client(message) {
                if client_tx.send(message).await.is_err() {
                    break;
                }
            }
            if closing {
                break;
            }
        }
    };

    tokio::select! {
        _ = client_to_backend => {}
        _ = backend_to_client => {}
    }
}

fn to_backend(message: ws::Message) -> Option<Message> {
    match message {
        ws::Message::Text(text) => Some(Message::text(text.as_str().to_owned())),
        ws::Message::Binary(data) => Some(Message::binary(data.to_vec())),
        ws::Message::Close(frame) => Some(Message::Close(frame.map(|frame| CloseFrame {
            code: CloseCode::from(frame.code),
            reason: frame.reason.as_str().to_owned().into(),
        }))),
        ws::Message::Ping(_) | ws::Message::Pong(_) => None,
    }
}

fn to_client(message: Message) -> Option<ws::Message> {
    match message {
        Message::Text(text) => Some(ws::Message::Text(text.as_str().to_owned().into())),
        Message::Binary(data) => Some(ws::Message::Binary(data.to_vec().into())),
        Message::Close(frame) => Some(ws::Message::Close(frame.map(|frame| ws::CloseFrame {
            code: frame.code.into(),
            reason: frame.reason.as_str().to_owned().into(),
        }))),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
    }
}
