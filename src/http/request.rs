//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4)
//! - Strip hop-by-hop headers before forwarding
//! - Carry the client's headers over to a WebSocket backend handshake
//! - Apply the route's `Host` policy and extra headers
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing and correlation
//! - Original request preserved for the lifecycle hooks; modified copy forwarded

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::routing::RouteDescriptor;

/// Header carrying the per-request id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Headers that describe a single connection and never cross the proxy.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

/// Assigns a fresh UUID v4 to every request that does not carry one.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeCorrelationId;

impl MakeRequestId for MakeCorrelationId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Remove connection-scoped headers in place.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove(header::UPGRADE);
}

/// Headers the WebSocket client library generates for every handshake.
const HANDSHAKE_OWNED: [HeaderName; 4] = [
    header::HOST,
    header::SEC_WEBSOCKET_KEY,
    header::SEC_WEBSOCKET_VERSION,
    header::SEC_WEBSOCKET_EXTENSIONS,
];

/// The client's upgrade headers that should reach the backend handshake:
/// cookies, credentials, origin, the request id and anything custom.
pub fn upgrade_forward_headers(client: &HeaderMap) -> HeaderMap {
    let mut headers = client.clone();
    strip_hop_by_hop(&mut headers);
    for name in &HANDSHAKE_OWNED {
        headers.remove(name);
    }
    headers
}

/// Apply `Host` rewriting and the route's extra headers to an outgoing
/// request. Invalid header names or values are skipped.
pub fn apply_route_headers(headers: &mut HeaderMap, route: &RouteDescriptor) {
    if route.change_origin {
        if let Some(value) = route
            .target_authority()
            .and_then(|authority| HeaderValue::from_str(&authority).ok())
        {
            headers.insert(header::HOST, value);
        }
    }

    for (name, value) in &route.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!(route = %route.route_path, header = %name, "Skipping invalid route header"),
        }
    }
}
