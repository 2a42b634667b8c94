//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Instrumenter / plugin controller
//!     → ProxyLogger (log_request / log_response / log_error / info / debug / error,
//!       ws_message / ws_connection, log_headers / log_body)
//!     → TracingLogger (level gate, prefix, field toggles, header and body dumps)
//!     → tracing events → tracing-subscriber fmt layer
//! ```
//!
//! # Design Decisions
//! - The core only talks to the `ProxyLogger` trait, never to `tracing` directly
//! - Structured fields (method, url, status, duration_ms) on every event
//! - `CapturingLogger` records calls for assertions and embedding

pub mod logging;

pub use logging::{
    create_logger, init_tracing, BodyCapture, CapturingLogger, FrameDirection, LogRecord,
    MessageKind, ProxyLogger, TracingLogger,
};
