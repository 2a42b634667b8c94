//! Structured logging for proxied traffic.
//!
//! The instrumenter and the plugin controller log exclusively through the
//! `ProxyLogger` contract. `TracingLogger` is the production implementation;
//! it turns each call into a `tracing` event with structured fields and a
//! human-readable message.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::HeaderMap;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::schema::{LogLevel, LoggerConfig};

/// Direction of a proxied WebSocket frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDirection {
    ClientToBackend,
    BackendToClient,
}

impl fmt::Display for FrameDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameDirection::ClientToBackend => write!(f, "client → backend"),
            FrameDirection::BackendToClient => write!(f, "backend → client"),
        }
    }
}

/// Which side of an HTTP exchange a header or body dump belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Response,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Request => write!(f, "request"),
            MessageKind::Response => write!(f, "response"),
        }
    }
}

/// Bodies a logger wants buffered and handed to `log_body`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BodyCapture {
    pub request: bool,
    pub response: bool,
}

/// Logging contract consumed by the proxy core.
pub trait ProxyLogger: Send + Sync {
    fn log_request(&self, method: &str, url: &str);

    fn log_response(&self, method: &str, url: &str, status: u16, duration: Option<Duration>);

    fn log_error(&self, method: &str, url: &str, error: &dyn std::error::Error);

    fn info(&self, message: &str);

    fn debug(&self, message: &str);

    fn error(&self, message: &str);

    /// A proxied WebSocket frame, already rendered for display.
    fn ws_message(&self, direction: FrameDirection, url: &str, message: &str) {
        self.info(&format!("WebSocket {direction} {url}: {message}"));
    }

    /// A WebSocket connection opened, closed or failed to open.
    fn ws_connection(&self, message: &str) {
        self.info(message);
    }

    /// Headers of a forwarded request or of the backend's response.
    fn log_headers(&self, _kind: MessageKind, _url: &str, _headers: &HeaderMap) {}

    fn body_capture(&self) -> BodyCapture {
        BodyCapture::default()
    }

    /// A buffered body, only called for the sides `body_capture` asked for.
    fn log_body(&self, _kind: MessageKind, _url: &str, _body: &[u8]) {}
}

/// Cut `text` to `max_chars` characters, noting the original length.
pub fn truncate(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}… ({total} chars)")
}

/// Pretty-printed form of a JSON object or array; `None` for anything else.
pub fn prettify_json(text: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .filter(|value| value.is_object() || value.is_array())
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
}

/// Build the default logger for a resolved logger configuration.
pub fn create_logger(config: &LoggerConfig) -> Arc<dyn ProxyLogger> {
    Arc::new(TracingLogger::new(config.clone()))
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over the configured level when set. Calling this twice is
/// harmless; the first subscriber stays installed.
pub fn init_tracing(config: &LoggerConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "dev_proxy={level},tower_http=warn",
            level = config.level.as_str()
        ))
    });
    let fmt_layer = tracing_subscriber::fmt::layer().with_ansi(config.colorful);
    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.timestamp {
        registry.with(fmt_layer).try_init()
    } else {
        registry.with(fmt_layer.without_time()).try_init()
    };
    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// `ProxyLogger` backed by `tracing`.
#[derive(Debug, Clone)]
pub struct TracingLogger {
    config: LoggerConfig,
}

impl TracingLogger {
    pub fn new(config: LoggerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    fn enabled(&self, level: LogLevel) -> bool {
        level <= self.config.level
    }

    fn display_url<'a>(&self, url: &'a str) -> &'a str {
        if self.config.show_query_params {
            return url;
        }
        url.split_once('?').map_or(url, |(path, _)| path)
    }

    fn describe(&self, method: &str, url: &str) -> String {
        if self.config.show_method {
            format!("{method} {url}")
        } else {
            url.to_string()
        }
    }

    fn shows_headers(&self, kind: MessageKind) -> bool {
        match kind {
            MessageKind::Request => self.config.show_request_headers,
            MessageKind::Response => self.config.show_response_headers,
        }
    }

    fn render_headers(&self, headers: &HeaderMap) -> String {
        headers
            .iter()
            .map(|(name, value)| format!("  {}: {}", name, value.to_str().unwrap_or("<binary>")))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn render_body(&self, body: &[u8]) -> String {
        if body.is_empty() {
            return "(empty)".to_string();
        }
        let text = String::from_utf8_lossy(body);
        let pretty = if self.config.prettify_json {
            prettify_json(&text)
        } else {
            None
        };
        truncate(pretty.as_deref().unwrap_or(&text), self.config.max_body_length)
    }

    /// Display form of a frame, or `None` when frames are not shown.
    fn render_frame(&self, message: &str) -> Option<String> {
        self.config
            .show_ws_messages
            .then(|| truncate(message, self.config.max_ws_message_length))
    }
}

impl ProxyLogger for TracingLogger {
    fn log_request(&self, method: &str, url: &str) {
        if !self.enabled(LogLevel::Info) {
            return;
        }
        let url = self.display_url(url);
        tracing::info!(method, url, "{} → {}", self.config.prefix, self.describe(method, url));
    }

    fn log_response(&self, method: &str, url: &str, status: u16, duration: Option<Duration>) {
        if !self.enabled(LogLevel::Info) {
            return;
        }
        let url = self.display_url(url);
        let mut line = format!("{} ← {}", self.config.prefix, self.describe(method, url));
        if self.config.show_status {
            line.push_str(&format!(" {status}"));
        }
        if let Some(duration) = duration {
            line.push_str(&format!(" ({}ms)", duration.as_millis()));
        }

        let duration_ms = duration.map(|d| d.as_millis() as u64);
        if status >= 400 {
            tracing::warn!(method, url, status, duration_ms = ?duration_ms, "{line}");
        } else {
            tracing::info!(method, url, status, duration_ms = ?duration_ms, "{line}");
        }
    }

    fn log_error(&self, method: &str, url: &str, error: &dyn std::error::Error) {
        let url = self.display_url(url);
        let target = self.describe(method, url);
        if self.config.show_error {
            tracing::error!(method, url, error = %error, "{} ✗ {}: {}", self.config.prefix, target, error);
        } else {
            tracing::error!(method, url, "{} ✗ {}", self.config.prefix, target);
        }
    }

    fn info(&self, message: &str) {
        if self.enabled(LogLevel::Info) {
            tracing::info!("{} {}", self.config.prefix, message);
        }
    }

    fn debug(&self, message: &str) {
        if self.enabled(LogLevel::Debug) {
            tracing::debug!("{} {}", self.config.prefix, message);
        }
    }

    fn error(&self, message: &str) {
        tracing::error!("{} {}", self.config.prefix, message);
    }

    fn ws_message(&self, direction: FrameDirection, url: &str, message: &str) {
        if !self.enabled(LogLevel::Info) {
            return;
        }
        if let Some(frame) = self.render_frame(message) {
            tracing::info!(url, direction = %direction, "{} WebSocket {direction} {url}: {frame}", self.config.prefix);
        }
    }

    fn ws_connection(&self, message: &str) {
        if self.config.show_ws_connections {
            self.info(message);
        }
    }

    fn log_headers(&self, kind: MessageKind, url: &str, headers: &HeaderMap) {
        if !self.shows_headers(kind) || !self.enabled(LogLevel::Info) {
            return;
        }
        let url = self.display_url(url);
        tracing::info!(
            url,
            kind = %kind,
            "{} {kind} headers {url}\n{}",
            self.config.prefix,
            self.render_headers(headers)
        );
    }

    fn body_capture(&self) -> BodyCapture {
        BodyCapture {
            request: self.config.show_request_body,
            response: self.config.show_response_body,
        }
    }

    fn log_body(&self, kind: MessageKind, url: &str, body: &[u8]) {
        if !self.enabled(LogLevel::Info) {
            return;
        }
        let url = self.display_url(url);
        tracing::info!(
            url,
            kind = %kind,
            bytes = body.len(),
            "{} {kind} body {url}\n{}",
            self.config.prefix,
            self.render_body(body)
        );
    }
}

/// One call recorded by `CapturingLogger`.
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    Request {
        method: String,
        url: String,
    },
    Response {
        method: String,
        url: String,
        status: u16,
        duration: Option<Duration>,
    },
    ProxyError {
        method: String,
        url: String,
        message: String,
    },
    Info(String),
    Debug(String),
    Error(String),
    WsMessage {
        direction: FrameDirection,
        url: String,
        message: String,
    },
    /// Header names, in order.
    Headers {
        kind: MessageKind,
        url: String,
        names: Vec<String>,
    },
    Body {
        kind: MessageKind,
        url: String,
        body: String,
    },
}

/// Logger that keeps every call in memory.
///
/// Header and body dumps are only recorded by a `verbose` logger.
#[derive(Debug, Default)]
pub struct CapturingLogger {
    records: Mutex<Vec<LogRecord>>,
    verbose: bool,
}

impl CapturingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Also record headers and both bodies of every exchange.
    pub fn verbose() -> Arc<Self> {
        Arc::new(Self {
            verbose: true,
            ..Self::default()
        })
    }

    /// Snapshot of the records so far, oldest first.
    pub fn records(&self) -> Vec<LogRecord> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn push(&self, record: LogRecord) {
        self.lock().push(record);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ProxyLogger for CapturingLogger {
    fn log_request(&self, method: &str, url: &str) {
        self.push(LogRecord::Request {
            method: method.to_string(),
            url: url.to_string(),
        });
    }

    fn log_response(&self, method: &str, url: &str, status: u16, duration: Option<Duration>) {
        self.push(LogRecord::Response {
            method: method.to_string(),
            url: url.to_string(),
            status,
            duration,
        });
    }

    fn log_error(&self, method: &str, url: &str, error: &dyn std::error::Error) {
        self.push(LogRecord::ProxyError {
            method: method.to_string(),
            url: url.to_string(),
            message: error.to_string(),
        });
    }

    fn info(&self, message: &str) {
        self.push(LogRecord::Info(message.to_string()));
    }

    fn debug(&self, message: &str) {
        self.push(LogRecord::Debug(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.push(LogRecord::Error(message.to_string()));
    }

    fn ws_message(&self, direction: FrameDirection, url: &str, message: &str) {
        self.push(LogRecord::WsMessage {
            direction,
            url: url.to_string(),
            message: message.to_string(),
        });
    }

    fn log_headers(&self, kind: MessageKind, url: &str, headers: &HeaderMap) {
        if self.verbose {
            self.push(LogRecord::Headers {
                kind,
                url: url.to_string(),
                names: headers.keys().map(|name| name.as_str().to_string()).collect(),
            });
        }
    }

    fn body_capture(&self) -> BodyCapture {
        BodyCapture {
            request: self.verbose,
            response: self.verbose,
        }
    }

    fn log_body(&self, kind: MessageKind, url: &str, body: &[u8]) {
        self.push(LogRecord::Body {
            kind,
            url: url.to_string(),
            body: String::from_utf8_lossy(body).into_owned(),
        });
    }
}
