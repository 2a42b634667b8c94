//! The slice of host dev-server configuration the plugin touches.

use crate::routing::RouteTable;

/// Host command the configuration pass runs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Development server.
    Serve,
    /// Local preview of a production build.
    Preview,
    /// Production build; no server, no proxy.
    Build,
}

/// Dev-server settings the plugin contributes to.
#[derive(Debug, Clone, Default)]
pub struct DevServerConfig {
    /// Proxy routes keyed by route path.
    pub proxy: RouteTable,
}
