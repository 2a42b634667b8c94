//! Dev-server reverse proxy routing.
//!
//! Turns an environment-scoped map of route keys to backend targets into
//! proxy routes, and instruments every proxied request, response and
//! WebSocket upgrade with timing, filters, middleware and structured logs.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod plugin;
pub mod proxy;
pub mod routing;

pub use config::schema::ProxyOptions;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use plugin::{Command, DevServerConfig, ProxyPlugin};
pub use routing::RouteTable;
