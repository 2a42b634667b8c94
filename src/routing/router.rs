//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store one instrumenter per route path
//! - Look up the route for a request path
//! - Merge generated routes with routes the host already defines
//!
//! # Design Decisions
//! - Immutable after construction; shared via `Arc`
//! - Longest matching prefix wins, so `/api/v1` beats `/api`
//! - Explicit no-match rather than a silent default

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::proxy::Instrumenter;

/// Route path → instrumented route.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: BTreeMap<String, Arc<Instrumenter>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the route at the instrumenter's route path.
    pub fn insert(&mut self, route: Arc<Instrumenter>) -> Option<Arc<Instrumenter>> {
        let path = route.route().route_path.clone();
        self.routes.insert(path, route)
    }

    pub fn get(&self, route_path: &str) -> Option<&Arc<Instrumenter>> {
        self.routes.get(route_path)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Instrumenter>)> {
        self.routes.iter().map(|(path, route)| (path.as_str(), route))
    }

    /// Overlay `other` on top of this table; on a shared path `other` wins.
    pub fn merged_with(mut self, other: &RouteTable) -> RouteTable {
        for (path, route) in &other.routes {
            self.routes.insert(path.clone(), route.clone());
        }
        self
    }

    /// Route whose path is the longest prefix of `path`.
    pub fn match_path(&self, path: &str) -> Option<&Arc<Instrumenter>> {
        self.routes
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, route)| route)
    }
}
