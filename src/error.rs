//! Transport-level errors reported through the error hook.

use std::time::Duration;

use axum::http::{uri::InvalidUri, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failure of a single proxied request or WebSocket handshake.
///
/// Terminal for that request only; the server and other routes are unaffected.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("upstream did not respond within {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("invalid backend url {url}: {source}")]
    InvalidBackendUrl {
        url: String,
        #[source]
        source: InvalidUri,
    },

    #[error("websocket handshake failed: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("failed to read body: {0}")]
    Body(#[from] axum::Error),
}

impl ProxyError {
    /// Status code returned to the client for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
