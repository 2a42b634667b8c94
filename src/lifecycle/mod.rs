//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Ctrl+C / caller trigger → Shutdown broadcast → HTTP server stops accepting
//!     → in-flight requests drain → exit
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
