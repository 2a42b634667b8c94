//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! caller ProxyOptions ──┐
//!                       ├─→ ProxyOptions::merge (external wins, once)
//! proxy.config.{toml,json}
//!     → loader.rs (discover, parse)
//!                       └─→ PluginState + LoggerConfig + hooks
//! ```
//!
//! # Design Decisions
//! - Every option is optional so option sets merge field by field
//! - Resolved configs are overrides overlaid on built-in defaults
//! - A missing or broken external file is never fatal

pub mod loader;
pub mod schema;

pub use loader::{ConfigError, ExternalConfigSource, FileConfigSource, NoExternalConfig};
pub use schema::{
    CorrelationStrategy, CustomProxyConfig, LogLevel, LoggerConfig, LoggerOverrides, ProxyOptions,
    RouteEntry, Target, TargetMap, WebSocketConfig, WebSocketOverrides, LOCAL_ENV,
};
