//! Pairing request-start events with their response or error.

use std::fmt;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::schema::CorrelationStrategy;
use crate::proxy::RequestInfo;

/// Key under which a request's start time is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationKey(String);

impl CorrelationKey {
    /// `METHOD:url`, shared by concurrent identical requests.
    pub fn method_url(method: &str, url: &str) -> Self {
        Self(format!("{method}:{url}"))
    }

    pub fn for_request(strategy: CorrelationStrategy, request: &RequestInfo) -> Self {
        match (strategy, request.request_id()) {
            (CorrelationStrategy::RequestId, Some(id)) => Self(format!("id:{id}")),
            _ => Self::method_url(request.method.as_str(), &request.url),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Start times of in-flight requests for one route.
#[derive(Debug, Default)]
pub struct CorrelationMap {
    starts: DashMap<CorrelationKey, Instant>,
}

impl CorrelationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a start; a second start under the same key replaces the first.
    pub fn start_at(&self, key: CorrelationKey, at: Instant) {
        self.starts.insert(key, at);
    }

    pub fn start(&self, key: CorrelationKey) {
        self.start_at(key, Instant::now());
    }

    /// Remove `key` and return the time since its start, if one was recorded.
    pub fn finish_at(&self, key: &CorrelationKey, at: Instant) -> Option<Duration> {
        self.starts
            .remove(key)
            .map(|(_, started)| at.saturating_duration_since(started))
    }

    pub fn finish(&self, key: &CorrelationKey) -> Option<Duration> {
        self.finish_at(key, Instant::now())
    }

    /// Drop `key` without measuring. Absent keys are ignored.
    pub fn clear(&self, key: &CorrelationKey) {
        self.starts.remove(key);
    }

    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    #[test]
    fn duration_is_finish_minus_start() {
        let map = CorrelationMap::new();
        let key = CorrelationKey::method_url("GET", "/api/v1/users");
        let t0 = Instant::now();

        map.start_at(key.clone(), t0);
        assert_eq!(
            map.finish_at(&key, t0 + Duration::from_millis(42)),
            Some(Duration::from_millis(42))
        );
        assert!(map.is_empty());
        assert_eq!(map.finish(&key), None);
    }

    #[test]
    fn identical_concurrent_requests_collide() {
        // Two in-flight `GET /report` requests share one key: the second start
        // overwrites the first, so the first response is timed from the wrong
        // start and the second response gets no duration at all.
        let map = CorrelationMap::new();
        let key = CorrelationKey::method_url("GET", "/report");
        let t0 = Instant::now();

        map.start_at(key.clone(), t0);
        map.start_at(key.clone(), t0 + Duration::from_millis(100));
        assert_eq!(map.len(), 1);

        let first = map.finish_at(&key, t0 + Duration::from_millis(150));
        assert_eq!(first, Some(Duration::from_millis(50)));
        let second = map.finish_at(&key, t0 + Duration::from_millis(300));
        assert_eq!(second, None);
    }

    #[test]
    fn clearing_absent_key_is_a_no_op() {
        let map = CorrelationMap::new();
        map.clear(&CorrelationKey::method_url("GET", "/missing"));
        assert!(map.is_empty());
    }

    #[test]
    fn request_id_strategy_separates_identical_requests() {
        let a = RequestInfo::new(Method::GET, "/report").with_header("x-request-id", "a");
        let b = RequestInfo::new(Method::GET, "/report").with_header("x-request-id", "b");

        let by_url = CorrelationStrategy::MethodUrl;
        assert_eq!(
            CorrelationKey::for_request(by_url, &a),
            CorrelationKey::for_request(by_url, &b)
        );
        assert_eq!(CorrelationKey::for_request(by_url, &a).as_str(), "GET:/report");

        let by_id = CorrelationStrategy::RequestId;
        assert_ne!(
            CorrelationKey::for_request(by_id, &a),
            CorrelationKey::for_request(by_id, &b)
        );

        let anonymous = RequestInfo::new(Method::GET, "/report");
        assert_eq!(
            CorrelationKey::for_request(by_id, &anonymous).to_string(),
            "GET:/report"
        );
    }
}
