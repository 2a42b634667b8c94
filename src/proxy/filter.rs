//! Caller-supplied predicates that gate logging and middleware.
//!
//! Filters must not panic: a panicking filter unwinds through the hook that
//! called it.

use std::fmt;
use std::sync::Arc;

/// `(original_url, method) -> keep`.
pub type RequestFilter = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// `(original_url, method, status) -> keep`.
pub type ResponseFilter = Arc<dyn Fn(&str, &str, u16) -> bool + Send + Sync>;

/// `(original_url) -> keep`.
pub type WebSocketFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// The three optional filters of a plugin instance.
#[derive(Clone, Default)]
pub struct Filters {
    pub request: Option<RequestFilter>,
    pub response: Option<ResponseFilter>,
    pub websocket: Option<WebSocketFilter>,
}

impl Filters {
    pub fn allows_request(&self, url: &str, method: &str) -> bool {
        self.request.as_ref().map_or(true, |f| f(url, method))
    }

    pub fn allows_response(&self, url: &str, method: &str, status: u16) -> bool {
        self.response.as_ref().map_or(true, |f| f(url, method, status))
    }

    pub fn allows_websocket(&self, url: &str) -> bool {
        self.websocket.as_ref().map_or(true, |f| f(url))
    }
}

impl fmt::Debug for Filters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filters")
            .field("request", &self.request.is_some())
            .field("response", &self.response.is_some())
            .field("websocket", &self.websocket.is_some())
            .finish()
    }
}
