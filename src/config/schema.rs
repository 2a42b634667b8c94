//! Configuration schema definitions.
//!
//! `ProxyOptions` mirrors what a caller (or an external config file) hands to
//! the plugin. Every field is optional so that two option sets can be merged
//! field by field; the resolved forms (`LoggerConfig`, `WebSocketConfig`) are
//! produced by overlaying the optional overrides on built-in defaults.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::proxy::filter::{RequestFilter, ResponseFilter, WebSocketFilter};
use crate::proxy::middleware::{ProxyMiddleware, WsMiddleware};

/// Environment used when none is configured, and the fallback when the
/// active environment has no target map.
pub const LOCAL_ENV: &str = "local";

/// Environment key → route key → target.
pub type TargetMap = BTreeMap<String, EnvTargets>;

/// Route key → target, for one environment.
pub type EnvTargets = BTreeMap<String, Target>;

/// A route target as written in configuration: either a bare backend URL or
/// a structured entry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Target {
    Simple(String),
    Detailed(RouteEntry),
}

impl Target {
    /// Normalize into a `RouteEntry` owned by `key`.
    pub fn into_entry(self, key: &str) -> RouteEntry {
        let mut entry = match self {
            Target::Simple(target) => RouteEntry {
                target,
                ..RouteEntry::default()
            },
            Target::Detailed(entry) => entry,
        };
        entry.key = key.to_string();
        entry
    }
}

impl From<&str> for Target {
    fn from(url: &str) -> Self {
        Target::Simple(url.to_string())
    }
}

impl From<RouteEntry> for Target {
    fn from(entry: RouteEntry) -> Self {
        Target::Detailed(entry)
    }
}

/// One logical proxy route.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteEntry {
    /// Key of this entry in the environment's target map.
    #[serde(skip)]
    pub key: String,

    /// Backend origin URL. Entries with an empty target are skipped.
    pub target: String,

    /// Externally visible path prefix.
    pub path: Option<String>,

    /// Prefix stripped from the request path before forwarding.
    pub rewrite: Option<String>,

    /// Per-route WebSocket overrides.
    pub ws: Option<WebSocketOverrides>,
}

impl RouteEntry {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_rewrite(mut self, rewrite: impl Into<String>) -> Self {
        self.rewrite = Some(rewrite.into());
        self
    }

    pub fn with_ws(mut self, ws: WebSocketOverrides) -> Self {
        self.ws = Some(ws);
        self
    }
}

/// Resolved WebSocket settings for one route.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WebSocketConfig {
    pub enabled: bool,
    /// Handshake and request timeout in milliseconds.
    pub timeout: u64,
    pub log_connections: bool,
    pub log_messages: bool,
    pub max_message_length: usize,
    pub prettify_messages: bool,
    /// Extra headers sent to the backend on every request of the route.
    pub headers: BTreeMap<String, String>,
    /// Subprotocols offered to the backend when the client offers none.
    pub protocols: Option<Vec<String>>,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: 30_000,
            log_connections: true,
            log_messages: false,
            max_message_length: 1000,
            prettify_messages: true,
            headers: BTreeMap::new(),
            protocols: None,
        }
    }
}

/// Partial WebSocket settings; `None` keeps the underlying value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WebSocketOverrides {
    pub enabled: Option<bool>,
    pub timeout: Option<u64>,
    #[serde(alias = "logConnections")]
    pub log_connections: Option<bool>,
    #[serde(alias = "logMessages")]
    pub log_messages: Option<bool>,
    #[serde(alias = "maxMessageLength")]
    pub max_message_length: Option<usize>,
    #[serde(alias = "prettifyMessages")]
    pub prettify_messages: Option<bool>,
    pub headers: Option<BTreeMap<String, String>>,
    pub protocols: Option<Vec<String>>,
}

impl WebSocketOverrides {
    pub fn disabled() -> Self {
        Self {
            enabled: Some(false),
            ..Self::default()
        }
    }

    /// Apply these overrides on top of `base`.
    pub fn overlay(&self, base: WebSocketConfig) -> WebSocketConfig {
        WebSocketConfig {
            enabled: self.enabled.unwrap_or(base.enabled),
            timeout: self.timeout.unwrap_or(base.timeout),
            log_connections: self.log_connections.unwrap_or(base.log_connections),
            log_messages: self.log_messages.unwrap_or(base.log_messages),
            max_message_length: self.max_message_length.unwrap_or(base.max_message_length),
            prettify_messages: self.prettify_messages.unwrap_or(base.prettify_messages),
            headers: self.headers.clone().unwrap_or(base.headers),
            protocols: self.protocols.clone().or(base.protocols),
        }
    }
}

/// Minimum severity emitted by the proxy logger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

/// Resolved logger settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggerConfig {
    pub level: LogLevel,
    pub colorful: bool,
    pub timestamp: bool,
    pub prefix: String,
    pub show_method: bool,
    pub show_status: bool,
    pub show_error: bool,
    pub show_query_params: bool,
    pub show_request_headers: bool,
    pub show_request_body: bool,
    pub show_response_headers: bool,
    pub show_response_body: bool,
    /// Characters of a logged body kept before truncation.
    pub max_body_length: usize,
    /// Pretty-print JSON bodies.
    pub prettify_json: bool,
    pub show_ws_connections: bool,
    pub show_ws_messages: bool,
    pub max_ws_message_length: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            colorful: true,
            timestamp: true,
            prefix: "[Proxy]".to_string(),
            show_method: true,
            show_status: true,
            show_error: true,
            show_query_params: false,
            show_request_headers: false,
            show_request_body: false,
            show_response_headers: false,
            show_response_body: false,
            max_body_length: 1000,
            prettify_json: true,
            show_ws_connections: true,
            show_ws_messages: false,
            max_ws_message_length: 1000,
        }
    }
}

/// Partial logger settings; `None` keeps the default.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggerOverrides {
    pub level: Option<LogLevel>,
    pub colorful: Option<bool>,
    pub timestamp: Option<bool>,
    pub prefix: Option<String>,
    #[serde(alias = "showMethod")]
    pub show_method: Option<bool>,
    #[serde(alias = "showStatus")]
    pub show_status: Option<bool>,
    #[serde(alias = "showError")]
    pub show_error: Option<bool>,
    #[serde(alias = "showQueryParams")]
    pub show_query_params: Option<bool>,
    #[serde(alias = "showRequestHeaders")]
    pub show_request_headers: Option<bool>,
    #[serde(alias = "showRequestBody")]
    pub show_request_body: Option<bool>,
    #[serde(alias = "showResponseHeaders")]
    pub show_response_headers: Option<bool>,
    #[serde(alias = "showResponseBody")]
    pub show_response_body: Option<bool>,
    #[serde(alias = "maxBodyLength")]
    pub max_body_length: Option<usize>,
    #[serde(alias = "prettifyJson")]
    pub prettify_json: Option<bool>,
    #[serde(alias = "showWsConnections")]
    pub show_ws_connections: Option<bool>,
    #[serde(alias = "showWsMessages")]
    pub show_ws_messages: Option<bool>,
    #[serde(alias = "maxWsMessageLength")]
    pub max_ws_message_length: Option<usize>,
}

impl LoggerOverrides {
    pub fn overlay(&self, base: LoggerConfig) -> LoggerConfig {
        LoggerConfig {
            level: self.level.unwrap_or(base.level),
            colorful: self.colorful.unwrap_or(base.colorful),
            timestamp: self.timestamp.unwrap_or(base.timestamp),
            prefix: self.prefix.clone().unwrap_or(base.prefix),
            show_method: self.show_method.unwrap_or(base.show_method),
            show_status: self.show_status.unwrap_or(base.show_status),
            show_error: self.show_error.unwrap_or(base.show_error),
            show_query_params: self.show_query_params.unwrap_or(base.show_query_params),
            show_request_headers: self.show_request_headers.unwrap_or(base.show_request_headers),
            show_request_body: self.show_request_body.unwrap_or(base.show_request_body),
            show_response_headers: self.show_response_headers.unwrap_or(base.show_response_headers),
            show_response_body: self.show_response_body.unwrap_or(base.show_response_body),
            max_body_length: self.max_body_length.unwrap_or(base.max_body_length),
            prettify_json: self.prettify_json.unwrap_or(base.prettify_json),
            show_ws_connections: self.show_ws_connections.unwrap_or(base.show_ws_connections),
            show_ws_messages: self.show_ws_messages.unwrap_or(base.show_ws_messages),
            max_ws_message_length: self.max_ws_message_length.unwrap_or(base.max_ws_message_length),
        }
    }
}

/// How a response or error is paired with the request that started it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStrategy {
    /// `METHOD:url`. Concurrent identical requests share a key, so one of
    /// them can report a wrong duration.
    #[default]
    MethodUrl,
    /// The per-request `x-request-id` token; falls back to `MethodUrl` when
    /// the request carries no id. The server only generates an id when the
    /// client sent none, so clients that reuse one id still share a key.
    RequestId,
}

/// Transport options applied after everything else.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CustomProxyConfig {
    /// Rewrite the `Host` header to the target's authority (default true).
    #[serde(alias = "changeOrigin")]
    pub change_origin: Option<bool>,
    /// Per-request timeout in milliseconds.
    pub timeout: Option<u64>,
    /// Force WebSocket proxying on or off for every route.
    pub ws: Option<bool>,
    /// Headers added to every forwarded request.
    pub headers: BTreeMap<String, String>,
}

/// Options accepted by the plugin, either from the caller or from an
/// external config file.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProxyOptions {
    pub env: Option<String>,
    pub targets: Option<TargetMap>,
    /// Route path → rewrite prefix, consulted when an entry has no rewrite.
    #[serde(alias = "rewriteRules")]
    pub rewrite_rules: Option<BTreeMap<String, String>>,
    /// Global WebSocket overrides.
    #[serde(alias = "webSocket")]
    pub web_socket: Option<WebSocketOverrides>,
    pub logger: Option<LoggerOverrides>,
    pub enabled: Option<bool>,
    /// Only apply to the dev server (`serve`), never to `preview`.
    #[serde(alias = "devOnly")]
    pub dev_only: Option<bool>,
    pub correlation: Option<CorrelationStrategy>,
    #[serde(alias = "customProxyConfig")]
    pub custom_proxy_config: Option<CustomProxyConfig>,

    #[serde(skip)]
    pub middleware: Option<Vec<Arc<dyn ProxyMiddleware>>>,
    #[serde(skip)]
    pub ws_middleware: Option<Vec<Arc<dyn WsMiddleware>>>,
    #[serde(skip)]
    pub request_filter: Option<RequestFilter>,
    #[serde(skip)]
    pub response_filter: Option<ResponseFilter>,
    #[serde(skip)]
    pub websocket_filter: Option<WebSocketFilter>,
}

impl ProxyOptions {
    /// Shallow merge: every field set in `external` replaces the current one.
    pub fn merge(self, external: ProxyOptions) -> ProxyOptions {
        ProxyOptions {
            env: external.env.or(self.env),
            targets: external.targets.or(self.targets),
            rewrite_rules: external.rewrite_rules.or(self.rewrite_rules),
            web_socket: external.web_socket.or(self.web_socket),
            logger: external.logger.or(self.logger),
            enabled: external.enabled.or(self.enabled),
            dev_only: external.dev_only.or(self.dev_only),
            correlation: external.correlation.or(self.correlation),
            custom_proxy_config: external.custom_proxy_config.or(self.custom_proxy_config),
            middleware: external.middleware.or(self.middleware),
            ws_middleware: external.ws_middleware.or(self.ws_middleware),
            request_filter: external.request_filter.or(self.request_filter),
            response_filter: external.response_filter.or(self.response_filter),
            websocket_filter: external.websocket_filter.or(self.websocket_filter),
        }
    }

    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }

    pub fn with_targets(mut self, targets: TargetMap) -> Self {
        self.targets = Some(targets);
        self
    }

    pub fn with_middleware(mut self, middleware: Arc<dyn ProxyMiddleware>) -> Self {
        self.middleware.get_or_insert_with(Vec::new).push(middleware);
        self
    }

    pub fn with_ws_middleware(mut self, middleware: Arc<dyn WsMiddleware>) -> Self {
        self.ws_middleware.get_or_insert_with(Vec::new).push(middleware);
        self
    }

    pub fn with_request_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        self.request_filter = Some(Arc::new(filter));
        self
    }

    pub fn with_response_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str, &str, u16) -> bool + Send + Sync + 'static,
    {
        self.response_filter = Some(Arc::new(filter));
        self
    }

    pub fn with_websocket_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.websocket_filter = Some(Arc::new(filter));
        self
    }
}

impl fmt::Debug for ProxyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyOptions")
            .field("env", &self.env)
            .field("targets", &self.targets)
            .field("rewrite_rules", &self.rewrite_rules)
            .field("web_socket", &self.web_socket)
            .field("logger", &self.logger)
            .field("enabled", &self.enabled)
            .field("dev_only", &self.dev_only)
            .field("correlation", &self.correlation)
            .field("custom_proxy_config", &self.custom_proxy_config)
            .field("middleware", &self.middleware.as_ref().map(Vec::len))
            .field("ws_middleware", &self.ws_middleware.as_ref().map(Vec::len))
            .field("request_filter", &self.request_filter.is_some())
            .field("response_filter", &self.response_filter.is_some())
            .field("websocket_filter", &self.websocket_filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_string_and_table_targets_deserialize() {
        let options: ProxyOptions = toml::from_str(
            r#"
            env = "dev"

            [targets.dev]
            v1 = "http://backend:9000"

            [targets.dev.chat]
            target = "http://chat:7000"
            path = "/chat"
            ws = { enabled = false }
            "#,
        )
        .unwrap();

        let dev = &options.targets.as_ref().unwrap()["dev"];
        assert_eq!(dev["v1"], Target::Simple("http://backend:9000".into()));
        match &dev["chat"] {
            Target::Detailed(entry) => {
                assert_eq!(entry.target, "http://chat:7000");
                assert_eq!(entry.path.as_deref(), Some("/chat"));
                assert_eq!(entry.ws, Some(WebSocketOverrides::disabled()));
            }
            other => panic!("expected detailed target, got {other:?}"),
        }
    }

    #[test]
    fn table_without_target_is_kept_with_empty_target() {
        let options: ProxyOptions = toml::from_str(
            r#"
            [targets.local.broken]
            path = "/broken"
            "#,
        )
        .unwrap();
        let entry = options.targets.unwrap()["local"]["broken"].clone().into_entry("broken");
        assert_eq!(entry.key, "broken");
        assert!(entry.target.is_empty());
    }

    #[test]
    fn merge_replaces_only_present_fields() {
        let current = ProxyOptions::default()
            .with_env("staging")
            .with_request_filter(|_, _| true);
        let external = ProxyOptions {
            enabled: Some(false),
            logger: Some(LoggerOverrides {
                level: Some(LogLevel::Debug),
                ..Default::default()
            }),
            ..Default::default()
        };

        let merged = current.merge(external);
        assert_eq!(merged.env.as_deref(), Some("staging"));
        assert_eq!(merged.enabled, Some(false));
        assert!(merged.request_filter.is_some());
        assert_eq!(merged.logger.unwrap().level, Some(LogLevel::Debug));
    }

    #[test]
    fn ws_overrides_layer_over_defaults() {
        let global = WebSocketOverrides {
            timeout: Some(5_000),
            log_messages: Some(true),
            ..Default::default()
        };
        let route = WebSocketOverrides {
            log_messages: Some(false),
            headers: Some(BTreeMap::from([("x-ws".to_string(), "1".to_string())])),
            ..Default::default()
        };

        let resolved = route.overlay(global.overlay(WebSocketConfig::default()));
        assert!(resolved.enabled);
        assert_eq!(resolved.timeout, 5_000);
        assert!(!resolved.log_messages);
        assert_eq!(resolved.max_message_length, 1000);
        assert_eq!(resolved.headers.get("x-ws").map(String::as_str), Some("1"));
    }

    #[test]
    fn camel_case_keys_are_accepted() {
        let options: ProxyOptions = serde_json::from_str(
            r#"{
                "env": "dev",
                "devOnly": false,
                "rewriteRules": { "/api/v1": "/api" },
                "webSocket": { "logMessages": true, "maxMessageLength": 64 },
                "customProxyConfig": { "changeOrigin": false, "timeout": 500 },
                "logger": { "showRequestHeaders": true, "maxWsMessageLength": 20 }
            }"#,
        )
        .unwrap();

        assert_eq!(options.dev_only, Some(false));
        assert_eq!(options.rewrite_rules.unwrap()["/api/v1"], "/api");
        let ws = options.web_socket.unwrap();
        assert_eq!(ws.log_messages, Some(true));
        assert_eq!(ws.max_message_length, Some(64));
        let passthrough = options.custom_proxy_config.unwrap();
        assert_eq!(passthrough.change_origin, Some(false));
        assert_eq!(passthrough.timeout, Some(500));
        let logger = options.logger.unwrap();
        assert_eq!(logger.show_request_headers, Some(true));
        assert_eq!(logger.max_ws_message_length, Some(20));
    }

    #[test]
    fn log_levels_order_by_verbosity() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Info < LogLevel::Debug);
        let cfg = LoggerOverrides {
            prefix: Some("[dev]".into()),
            ..Default::default()
        }
        .overlay(LoggerConfig::default());
        assert_eq!(cfg.prefix, "[dev]");
        assert_eq!(cfg.level, LogLevel::Info);
    }
}
