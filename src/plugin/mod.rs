//! Plugin state and host integration.
//!
//! # Data Flow
//! ```text
//! ProxyOptions ──→ ProxyPlugin ──(configure, once per host config pass)──┐
//!                    │  switch_environment / patch_targets / enable       │
//!                    ▼                                                    ▼
//!               PluginState ──→ generate_routes ──→ RouteTable ──→ DevServerConfig::proxy
//! ```
//!
//! # Design Decisions
//! - State mutations never fail; bad input degrades to "no effect"
//! - An external merge rebuilds state, logger and hooks wholesale
//! - Routes already configured on the host take precedence

pub mod controller;
pub mod host;
pub mod state;

pub use controller::{LoggerFactory, ProxyPlugin, PLUGIN_NAME};
pub use host::{Command, DevServerConfig};
pub use state::PluginState;
