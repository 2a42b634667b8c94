//! Request lifecycle instrumentation.
//!
//! # Data Flow
//! ```text
//! transport event (request / response / upgrade / error)
//!     → Instrumenter (one per route)
//!         → correlation.rs (start time per request)
//!         → filter.rs (gate logging and middleware)
//!         → middleware.rs (best-effort chain)
//!     → ProxyLogger
//! ```
//!
//! # Design Decisions
//! - Hooks never fail the proxied request
//! - Filters gate observation only; forwarding always happens
//! - Middleware and filters are injected at construction, never mutated

pub mod correlation;
pub mod filter;
pub mod instrumenter;
pub mod middleware;

use axum::http::{header, request::Parts, HeaderMap, HeaderValue, Method};

use crate::http::request::X_REQUEST_ID;

pub use correlation::{CorrelationKey, CorrelationMap};
pub use filter::Filters;
pub use instrumenter::{Instrumenter, LifecycleHooks};
pub use middleware::{
    ChainReport, MiddlewareContext, MiddlewareError, ProxyMiddleware, StageOutcome,
    WsMiddleware, WsUpgradeContext,
};

/// The incoming request as seen by the lifecycle hooks.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    /// Original path and query, before any rewrite.
    pub url: String,
    pub headers: HeaderMap,
}

impl RequestInfo {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
        }
    }

    pub fn from_parts(parts: &Parts) -> Self {
        let url = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());
        Self {
            method: parts.method.clone(),
            url,
            headers: parts.headers.clone(),
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.insert(name, HeaderValue::from_static(value));
        self
    }

    /// Per-request id assigned by the server, if any.
    pub fn request_id(&self) -> Option<&str> {
        self.headers.get(X_REQUEST_ID).and_then(|v| v.to_str().ok())
    }

    /// True for `Upgrade: websocket` requests.
    pub fn is_websocket_upgrade(&self) -> bool {
        self.headers
            .get(header::UPGRADE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn request_info_keeps_query_and_headers() {
        let (parts, ()) = Request::builder()
            .method(Method::POST)
            .uri("http://dev.local/api/v1/users?page=2")
            .header("upgrade", "WebSocket")
            .header(X_REQUEST_ID, "abc")
            .body(())
            .unwrap()
            .into_parts();

        let info = RequestInfo::from_parts(&parts);
        assert_eq!(info.method, Method::POST);
        assert_eq!(info.url, "/api/v1/users?page=2");
        assert_eq!(info.request_id(), Some("abc"));
        assert!(info.is_websocket_upgrade());
    }

    #[test]
    fn plain_request_is_not_an_upgrade() {
        let info = RequestInfo::new(Method::GET, "/x").with_header("upgrade", "h2c");
        assert!(!info.is_websocket_upgrade());
        assert_eq!(info.request_id(), None);
    }
}
