//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, route match)
//!     → request.rs (strip hop-by-hop headers, apply route headers)
//!     → Instrumenter hooks (start, middleware, log)
//!     → backend (hyper client) or websocket.rs (tunnel)
//!     → Send to client
//! ```

pub mod request;
pub mod server;
pub mod websocket;

pub use request::{MakeCorrelationId, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
