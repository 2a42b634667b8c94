//! Route compilation.
//!
//! # Responsibilities
//! - Derive each entry's route path and rewrite prefix
//! - Resolve the WebSocket settings for the route
//! - Apply transport passthrough options last
//!
//! # Precedence
//! ```text
//! path:    entry.path → key default table → "/" + key
//! rewrite: entry.rewrite → rewrite_rules[path] → path
//! ws:      built-in defaults ← global web_socket ← entry.ws ← passthrough.ws
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use url::Url;

use crate::config::schema::{
    CustomProxyConfig, RouteEntry, WebSocketConfig, WebSocketOverrides,
};
use crate::routing::rewrite::{join_url, websocket_origin, RewriteRule};

/// Paths for the historical `v1`/`v2`/`v3` route keys.
const DEFAULT_KEY_PATHS: [(&str, &str); 3] = [("v1", "/api/v1"), ("v2", "/api"), ("v3", "/api/v3")];

/// Everything needed to proxy one route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDescriptor {
    /// Route key the descriptor was compiled from.
    pub key: String,
    /// Externally visible path prefix.
    pub route_path: String,
    /// Backend origin.
    pub target: String,
    pub rewrite: RewriteRule,
    pub ws: WebSocketConfig,
    pub timeout: Duration,
    /// Rewrite `Host` to the target authority.
    pub change_origin: bool,
    /// Headers added to every forwarded request and WebSocket handshake.
    pub headers: BTreeMap<String, String>,
}

impl RouteDescriptor {
    /// Full backend URL for an incoming path-and-query.
    pub fn backend_url(&self, original_url: &str) -> String {
        join_url(&self.target, self.rewrite.apply(original_url))
    }

    /// Full backend WebSocket URL for an incoming path-and-query.
    pub fn websocket_url(&self, original_url: &str) -> String {
        join_url(&websocket_origin(&self.target), self.rewrite.apply(original_url))
    }

    /// `host[:port]` of the target, used when `change_origin` is set.
    pub fn target_authority(&self) -> Option<String> {
        let url = Url::parse(&self.target).ok()?;
        let host = url.host_str()?;
        Some(match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }
}

/// Global inputs shared by every route of a compilation pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions<'a> {
    pub rewrite_rules: Option<&'a BTreeMap<String, String>>,
    pub web_socket: Option<&'a WebSocketOverrides>,
    pub passthrough: Option<&'a CustomProxyConfig>,
}

/// Route path for `key`, honoring an explicit non-empty path.
pub fn derive_route_path(key: &str, explicit: Option<&str>) -> String {
    if let Some(path) = explicit.filter(|p| !p.is_empty()) {
        return path.to_string();
    }
    if let Some((_, path)) = DEFAULT_KEY_PATHS.iter().find(|(k, _)| *k == key) {
        return path.to_string();
    }
    if key.starts_with('/') {
        key.to_string()
    } else {
        format!("/{key}")
    }
}

/// Compile normalized entries into descriptors keyed by route path.
///
/// Entries without a target or path are dropped. On a path collision the
/// later entry wins.
pub fn compile(entries: Vec<RouteEntry>, options: &CompileOptions<'_>) -> BTreeMap<String, RouteDescriptor> {
    let mut routes = BTreeMap::new();

    for entry in entries {
        if entry.target.is_empty() {
            tracing::debug!(key = %entry.key, "Skipping route without target");
            continue;
        }

        let route_path = derive_route_path(&entry.key, entry.path.as_deref());
        if route_path.is_empty() {
            tracing::debug!(key = %entry.key, "Skipping route without path");
            continue;
        }

        let rewrite = entry
            .rewrite
            .clone()
            .filter(|r| !r.is_empty())
            .or_else(|| options.rewrite_rules.and_then(|rules| rules.get(&route_path).cloned()))
            .unwrap_or_else(|| route_path.clone());

        let mut ws = WebSocketConfig::default();
        if let Some(global) = options.web_socket {
            ws = global.overlay(ws);
        }
        if let Some(route_ws) = &entry.ws {
            ws = route_ws.overlay(ws);
        }

        let mut timeout_ms = ws.timeout;
        let mut change_origin = true;
        let mut headers = BTreeMap::new();
        if let Some(passthrough) = options.passthrough {
            if let Some(enabled) = passthrough.ws {
                ws.enabled = enabled;
            }
            timeout_ms = passthrough.timeout.unwrap_or(timeout_ms);
            change_origin = passthrough.change_origin.unwrap_or(change_origin);
            headers.extend(passthrough.headers.clone());
        }
        if ws.enabled {
            headers.extend(ws.headers.clone());
        }

        let descriptor = RouteDescriptor {
            key: entry.key,
            route_path: route_path.clone(),
            target: entry.target,
            rewrite: RewriteRule::strip_prefix(rewrite),
            ws,
            timeout: Duration::from_millis(timeout_ms),
            change_origin,
            headers,
        };
        if let Some(previous) = routes.insert(route_path, descriptor) {
            tracing::debug!(key = %previous.key, path = %previous.route_path, "Route path overridden");
        }
    }

    routes
}
