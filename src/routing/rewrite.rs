//! Path rewriting and backend URL construction.

/// Strips a literal prefix from request paths before forwarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRule {
    prefix: String,
}

impl RewriteRule {
    pub fn strip_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Rewrite `path`; paths not starting with the prefix pass through.
    pub fn apply<'a>(&self, path: &'a str) -> &'a str {
        path.strip_prefix(self.prefix.as_str()).unwrap_or(path)
    }
}

/// Append a rewritten path to a backend origin.
///
/// Exactly one `/` separates the two when the path is a segment; query-only
/// and empty paths are appended verbatim.
pub fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() || path.starts_with('?') || path.starts_with('#') {
        return format!("{base}{path}");
    }
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

/// WebSocket origin for an HTTP target (`http` → `ws`, `https` → `wss`).
pub fn websocket_origin(target: &str) -> String {
    match target.strip_prefix("http") {
        Some(rest) => format!("ws{rest}"),
        None => target.to_string(),
    }
}
