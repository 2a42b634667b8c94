//! Per-route lifecycle hooks.
//!
//! # Responsibilities
//! - Record request start times and compute response durations
//! - Apply request / response / WebSocket filters
//! - Run the HTTP and WebSocket middleware chains
//! - Emit one log line per observed event
//!
//! # Lifecycle
//! ```text
//! on_request ──(start recorded)──→ STARTED ──on_response / on_error──→ RESOLVED
//! ```
//! A late second `on_response`/`on_error` for the same key finds nothing to
//! clear and reports no duration.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{request::Parts, HeaderMap, StatusCode};

use crate::config::schema::{CorrelationStrategy, WebSocketConfig};
use crate::observability::logging::{prettify_json, truncate};
use crate::observability::{BodyCapture, FrameDirection, MessageKind, ProxyLogger};
use crate::proxy::correlation::{CorrelationKey, CorrelationMap};
use crate::proxy::filter::Filters;
use crate::proxy::middleware::{
    run_chain, run_ws_chain, ChainReport, MiddlewareContext, ProxyMiddleware, WsMiddleware,
    WsUpgradeContext,
};
use crate::proxy::RequestInfo;
use crate::routing::RouteDescriptor;

/// Collaborators shared by every route of one configuration pass.
#[derive(Clone)]
pub struct LifecycleHooks {
    pub logger: Arc<dyn ProxyLogger>,
    pub middleware: Arc<Vec<Arc<dyn ProxyMiddleware>>>,
    pub ws_middleware: Arc<Vec<Arc<dyn WsMiddleware>>>,
    pub filters: Filters,
    pub correlation: CorrelationStrategy,
}

impl LifecycleHooks {
    /// Hooks with no middleware, no filters and method+url correlation.
    pub fn new(logger: Arc<dyn ProxyLogger>) -> Self {
        Self {
            logger,
            middleware: Arc::new(Vec::new()),
            ws_middleware: Arc::new(Vec::new()),
            filters: Filters::default(),
            correlation: CorrelationStrategy::default(),
        }
    }
}

impl fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("middleware", &self.middleware.len())
            .field("ws_middleware", &self.ws_middleware.len())
            .field("filters", &self.filters)
            .field("correlation", &self.correlation)
            .finish()
    }
}

/// Lifecycle hooks of one proxied route.
#[derive(Debug)]
pub struct Instrumenter {
    route: RouteDescriptor,
    hooks: LifecycleHooks,
    inflight: CorrelationMap,
}

impl Instrumenter {
    pub fn new(route: RouteDescriptor, hooks: LifecycleHooks) -> Self {
        Self {
            route,
            hooks,
            inflight: CorrelationMap::new(),
        }
    }

    pub fn route(&self) -> &RouteDescriptor {
        &self.route
    }

    /// Number of requests started but not yet resolved.
    pub fn inflight(&self) -> usize {
        self.inflight.len()
    }

    fn key(&self, request: &RequestInfo) -> CorrelationKey {
        CorrelationKey::for_request(self.hooks.correlation, request)
    }

    /// A request is about to be forwarded.
    ///
    /// Returns the middleware report, or `None` when the request filter
    /// rejected the request. Forwarding happens either way.
    pub async fn on_request(
        &self,
        proxy_request: &mut Parts,
        request: &RequestInfo,
    ) -> Option<ChainReport> {
        let url = self.route.backend_url(&request.url);
        let method = request.method.as_str();
        self.inflight.start(self.key(request));

        if !self.hooks.filters.allows_request(&request.url, method) {
            return None;
        }

        let mut ctx = MiddlewareContext {
            proxy_request,
            request,
            route: &self.route,
        };
        let report = run_chain(&self.hooks.middleware, &mut ctx, self.hooks.logger.as_ref()).await;

        self.hooks.logger.log_request(method, &url);
        self.hooks
            .logger
            .log_headers(MessageKind::Request, &url, &ctx.proxy_request.headers);
        Some(report)
    }

    /// The backend answered. Returns the measured duration, if the start of
    /// this request was recorded.
    pub fn on_response(
        &self,
        request: &RequestInfo,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> Option<Duration> {
        let url = self.route.backend_url(&request.url);
        let method = request.method.as_str();
        let duration = self.inflight.finish(&self.key(request));

        if self
            .hooks
            .filters
            .allows_response(&request.url, method, status.as_u16())
        {
            self.hooks
                .logger
                .log_response(method, &url, status.as_u16(), duration);
            self.hooks.logger.log_headers(MessageKind::Response, &url, headers);
        }
        duration
    }

    /// Bodies the logger wants buffered for this route's exchanges.
    pub fn body_capture(&self) -> BodyCapture {
        self.hooks.logger.body_capture()
    }

    /// Hand a buffered body to the logger.
    pub fn log_body(&self, kind: MessageKind, request: &RequestInfo, body: &[u8]) {
        let url = self.route.backend_url(&request.url);
        self.hooks.logger.log_body(kind, &url, body);
    }

    /// A WebSocket upgrade is about to be forwarded.
    ///
    /// Does nothing on routes with WebSocket proxying disabled. Returns `None`
    /// when disabled or rejected by the WebSocket filter.
    pub async fn on_upgrade(
        &self,
        request: &RequestInfo,
        peer_addr: Option<SocketAddr>,
        handshake_headers: &mut HeaderMap,
    ) -> Option<ChainReport> {
        if !self.route.ws.enabled {
            return None;
        }
        let url = self.route.websocket_url(&request.url);
        if !self.hooks.filters.allows_websocket(&request.url) {
            return None;
        }

        if self.route.ws.log_connections {
            self.hooks.logger.ws_connection(&format!("WebSocket upgrade: {url}"));
        }

        let mut ctx = WsUpgradeContext {
            request,
            peer_addr,
            handshake_headers,
            route: &self.route,
        };
        Some(run_ws_chain(&self.hooks.ws_middleware, &mut ctx, self.hooks.logger.as_ref()).await)
    }

    /// A tunnelled WebSocket connection ended.
    pub fn on_close(&self, request: &RequestInfo) {
        if self.route.ws.enabled && self.route.ws.log_connections {
            let url = self.route.websocket_url(&request.url);
            self.hooks.logger.ws_connection(&format!("WebSocket closed: {url}"));
        }
    }

    /// Forwarding failed. Never propagates.
    pub fn on_error(&self, request: &RequestInfo, error: &dyn std::error::Error) {
        let method = request.method.as_str();
        self.inflight.clear(&self.key(request));

        if request.is_websocket_upgrade() && self.route.ws.log_connections {
            let url = self.route.websocket_url(&request.url);
            self.hooks
                .logger
                .error(&format!("WebSocket connection failed: {method} {url} - {error}"));
        } else {
            let url = self.route.backend_url(&request.url);
            self.hooks.logger.log_error(method, &url, error);
        }
    }

    /// Log one proxied text frame when message logging is on.
    pub fn log_frame(&self, direction: FrameDirection, ws_url: &str, text: &str) {
        if !self.route.ws.log_messages {
            return;
        }
        let rendered = render_frame(text, &self.route.ws);
        self.hooks.logger.ws_message(direction, ws_url, &rendered);
    }
}

fn render_frame(text: &str, ws: &WebSocketConfig) -> String {
    let pretty = if ws.prettify_messages {
        prettify_json(text)
    } else {
        None
    };
    truncate(pretty.as_deref().unwrap_or(text), ws.max_message_length)
}
