//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Configuration pass (per plugin state):
//!     TargetMap + env
//!     → resolver.rs (active environment, normalized entries)
//!     → compiler.rs (route path, rewrite, ws config, passthrough)
//!     → router.rs (RouteTable of per-route instrumenters)
//!
//! Incoming request:
//!     path → RouteTable::match_path (longest prefix) → Instrumenter
//! ```
//!
//! # Design Decisions
//! - Compilation never fails; incomplete entries are dropped
//! - Tables are immutable once built and swapped whole
//! - Prefix matching is plain string prefix, no regex

pub mod compiler;
pub mod resolver;
pub mod rewrite;
pub mod router;

pub use compiler::{compile, derive_route_path, CompileOptions, RouteDescriptor};
pub use resolver::resolve;
pub use rewrite::RewriteRule;
pub use router::RouteTable;
