//! Best-effort middleware chains.
//!
//! Each stage is awaited in registration order. A stage that returns an error
//! or panics is logged and recorded in the `ChainReport`; the next stage runs
//! regardless, and the proxied request is never affected.

use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{request::Parts, HeaderMap};
use futures_util::FutureExt;
use thiserror::Error;

use crate::observability::ProxyLogger;
use crate::proxy::RequestInfo;
use crate::routing::RouteDescriptor;

/// Error returned by a middleware stage.
#[derive(Debug, Error)]
pub enum MiddlewareError {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl MiddlewareError {
    pub fn msg(message: impl Into<String>) -> Self {
        MiddlewareError::Message(message.into())
    }
}

/// What HTTP middleware gets to see and change.
pub struct MiddlewareContext<'a> {
    /// Outgoing request to the backend; headers and URI may be changed.
    pub proxy_request: &'a mut Parts,
    /// Incoming request as received.
    pub request: &'a RequestInfo,
    pub route: &'a RouteDescriptor,
}

/// Middleware run for every proxied HTTP request that passes the request filter.
#[async_trait]
pub trait ProxyMiddleware: Send + Sync {
    async fn handle(&self, ctx: &mut MiddlewareContext<'_>) -> Result<(), MiddlewareError>;
}

/// What WebSocket middleware gets to see and change.
///
/// No handle to the upgraded connection is provided: the hook runs before
/// the backend handshake, when no connection exists yet.
pub struct WsUpgradeContext<'a> {
    pub request: &'a RequestInfo,
    pub peer_addr: Option<SocketAddr>,
    /// Headers sent with the backend handshake.
    pub handshake_headers: &'a mut HeaderMap,
    pub route: &'a RouteDescriptor,
}

/// Middleware run for every WebSocket upgrade that passes the WebSocket filter.
#[async_trait]
pub trait WsMiddleware: Send + Sync {
    async fn handle(&self, ctx: &mut WsUpgradeContext<'_>) -> Result<(), MiddlewareError>;
}

struct FnMiddleware<F>(F);

#[async_trait]
impl<F> ProxyMiddleware for FnMiddleware<F>
where
    F: Fn(&mut MiddlewareContext<'_>) -> Result<(), MiddlewareError> + Send + Sync,
{
    async fn handle(&self, ctx: &mut MiddlewareContext<'_>) -> Result<(), MiddlewareError> {
        (self.0)(ctx)
    }
}

struct FnWsMiddleware<F>(F);

#[async_trait]
impl<F> WsMiddleware for FnWsMiddleware<F>
where
    F: Fn(&mut WsUpgradeContext<'_>) -> Result<(), MiddlewareError> + Send + Sync,
{
    async fn handle(&self, ctx: &mut WsUpgradeContext<'_>) -> Result<(), MiddlewareError> {
        (self.0)(ctx)
    }
}

/// Wrap a synchronous closure as HTTP middleware.
pub fn from_fn<F>(f: F) -> Arc<dyn ProxyMiddleware>
where
    F: Fn(&mut MiddlewareContext<'_>) -> Result<(), MiddlewareError> + Send + Sync + 'static,
{
    Arc::new(FnMiddleware(f))
}

/// Wrap a synchronous closure as WebSocket middleware.
pub fn ws_from_fn<F>(f: F) -> Arc<dyn WsMiddleware>
where
    F: Fn(&mut WsUpgradeContext<'_>) -> Result<(), MiddlewareError> + Send + Sync + 'static,
{
    Arc::new(FnWsMiddleware(f))
}

/// Result of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Completed,
    Failed(String),
    Panicked,
}

/// Per-stage outcomes of one chain run, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainReport {
    pub outcomes: Vec<StageOutcome>,
}

impl ChainReport {
    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !matches!(o, StageOutcome::Completed))
            .count()
    }
}

async fn run_stage<Fut>(stage: Fut, label: &str, logger: &dyn ProxyLogger) -> StageOutcome
where
    Fut: Future<Output = Result<(), MiddlewareError>>,
{
    match AssertUnwindSafe(stage).catch_unwind().await {
        Ok(Ok(())) => StageOutcome::Completed,
        Ok(Err(e)) => {
            logger.error(&format!("{label} failed: {e}"));
            StageOutcome::Failed(e.to_string())
        }
        Err(_) => {
            logger.error(&format!("{label} panicked"));
            StageOutcome::Panicked
        }
    }
}

/// Run HTTP middleware in order; failures never stop the chain.
pub async fn run_chain(
    chain: &[Arc<dyn ProxyMiddleware>],
    ctx: &mut MiddlewareContext<'_>,
    logger: &dyn ProxyLogger,
) -> ChainReport {
    let mut report = ChainReport::default();
    for middleware in chain {
        let outcome = run_stage(middleware.handle(ctx), "Middleware", logger).await;
        report.outcomes.push(outcome);
    }
    report
}

/// Run WebSocket middleware in order; failures never stop the chain.
pub async fn run_ws_chain(
    chain: &[Arc<dyn WsMiddleware>],
    ctx: &mut WsUpgradeContext<'_>,
    logger: &dyn ProxyLogger,
) -> ChainReport {
    let mut report = ChainReport::default();
    for middleware in chain {
        let outcome = run_stage(middleware.handle(ctx), "WebSocket middleware", logger).await;
        report.outcomes.push(outcome);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::{CapturingLogger, LogRecord};
    use crate::routing::compiler::{compile, CompileOptions};
    use crate::config::schema::RouteEntry;
    use axum::http::{HeaderValue, Method, Request};

    fn route() -> RouteDescriptor {
        let mut entry = RouteEntry::new("http://backend:9000");
        entry.key = "v1".into();
        compile(vec![entry], &CompileOptions::default())
            .remove("/api/v1")
            .unwrap()
    }

    struct Panics;

    #[async_trait]
    impl ProxyMiddleware for Panics {
        async fn handle(&self, _ctx: &mut MiddlewareContext<'_>) -> Result<(), MiddlewareError> {
            panic!("middleware bug");
        }
    }

    #[tokio::test]
    async fn failing_stages_do_not_stop_the_chain() {
        let logger = CapturingLogger::new();
        let chain = vec![
            from_fn(|ctx| {
                ctx.proxy_request
                    .headers
                    .insert("x-first", HeaderValue::from_static("1"));
                Ok(())
            }),
            from_fn(|_| Err(MiddlewareError::msg("token service down"))),
            Arc::new(Panics) as Arc<dyn ProxyMiddleware>,
            from_fn(|ctx| {
                ctx.proxy_request
                    .headers
                    .insert("x-last", HeaderValue::from_static("1"));
                Ok(())
            }),
        ];

        let (mut parts, ()) = Request::new(()).into_parts();
        let request = RequestInfo::new(Method::GET, "/api/v1/users");
        let route = route();
        let mut ctx = MiddlewareContext {
            proxy_request: &mut parts,
            request: &request,
            route: &route,
        };

        let report = run_chain(&chain, &mut ctx, logger.as_ref()).await;
        assert_eq!(
            report.outcomes,
            vec![
                StageOutcome::Completed,
                StageOutcome::Failed("token service down".into()),
                StageOutcome::Panicked,
                StageOutcome::Completed,
            ]
        );
        assert_eq!(report.failures(), 2);
        assert!(parts.headers.contains_key("x-first"));
        assert!(parts.headers.contains_key("x-last"));
        assert_eq!(
            logger.records(),
            vec![
                LogRecord::Error("Middleware failed: token service down".into()),
                LogRecord::Error("Middleware panicked".into()),
            ]
        );
    }

    #[tokio::test]
    async fn ws_middleware_can_add_handshake_headers() {
        let logger = CapturingLogger::new();
        let chain = vec![ws_from_fn(|ctx| {
            let value = HeaderValue::from_str(ctx.request.url.as_str())
                .map_err(|e| MiddlewareError::Other(Box::new(e)))?;
            ctx.handshake_headers.insert("x-origin-url", value);
            Ok(())
        })];

        let request = RequestInfo::new(Method::GET, "/api/v1/live");
        let route = route();
        let mut headers = HeaderMap::new();
        let mut ctx = WsUpgradeContext {
            request: &request,
            peer_addr: None,
            handshake_headers: &mut headers,
            route: &route,
        };

        let report = run_ws_chain(&chain, &mut ctx, logger.as_ref()).await;
        assert_eq!(report.failures(), 0);
        assert_eq!(headers["x-origin-url"], "/api/v1/live");
        assert!(logger.records().is_empty());
    }
}
