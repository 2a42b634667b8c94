//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with a single fallback proxy handler
//! - Wire up middleware (tracing, request ID)
//! - Publish route tables without restarting
//! - Forward requests to backends and report lifecycle events
//! - Hand WebSocket upgrades to the tunnel

use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{request::Parts, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::error::ProxyError;
use crate::http::request::{apply_route_headers, strip_hop_by_hop, MakeCorrelationId};
use crate::http::websocket;
use crate::observability::MessageKind;
use crate::proxy::{Instrumenter, RequestInfo};
use crate::routing::RouteTable;

/// Pooled client for `http://` and `https://` backends.
pub type BackendClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<ArcSwap<RouteTable>>,
    pub client: BackendClient,
}

/// Build the backend client. Certificates are checked against the webpki
/// roots.
pub fn backend_client() -> BackendClient {
    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let https = HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .wrap_connector(http);

    Client::builder(TokioExecutor::new()).build(https)
}

/// Dev-server front end that proxies matching requests to their backends.
pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    pub fn new(routes: RouteTable) -> Self {
        Self {
            state: AppState {
                routes: Arc::new(ArcSwap::from_pointee(routes)),
                client: backend_client(),
            },
        }
    }

    /// Shared handle to the live route table.
    pub fn routes(&self) -> Arc<ArcSwap<RouteTable>> {
        self.state.routes.clone()
    }

    /// Replace the live route table. In-flight requests and open tunnels keep
    /// the route they started with.
    pub fn publish(&self, routes: RouteTable) {
        tracing::info!(routes = routes.len(), "Publishing proxy routes");
        self.state.routes.store(Arc::new(routes));
    }

    /// Build the Axum router with all middleware layers.
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(self.state.clone())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeCorrelationId))
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, routes = self.state.routes.load().len(), "HTTP server starting");

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server received shutdown signal");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
/// Matches the longest route prefix and forwards or tunnels the request.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let path = request.uri().path().to_string();
    let route = match state.routes.load().match_path(&path) {
        Some(route) => route.clone(),
        None => {
            tracing::debug!(path = %path, "No route matched");
            return (StatusCode::NOT_FOUND, "No matching proxy route").into_response();
        }
    };

    let peer_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (parts, body) = request.into_parts();
    let info = RequestInfo::from_parts(&parts);

    if info.is_websocket_upgrade() {
        if !route.route().ws.enabled {
            tracing::debug!(path = %path, route = %route.route().route_path, "WebSocket proxying disabled");
            return (StatusCode::NOT_FOUND, "WebSocket proxying disabled for route").into_response();
        }
        return websocket::tunnel(route, parts, peer_addr).await;
    }

    match forward(&state, &route, parts, body, &info).await {
        Ok(response) => response,
        Err(e) => {
            route.on_error(&info, &e);
            e.into_response()
        }
    }
}

async fn forward(
    state: &AppState,
    route: &Instrumenter,
    mut parts: Parts,
    body: Body,
    info: &RequestInfo,
) -> Result<Response, ProxyError> {
    let descriptor = route.route();
    let url = descriptor.backend_url(&info.url);
    parts.uri = url
        .parse::<Uri>()
        .map_err(|source| ProxyError::InvalidBackendUrl { url: url.clone(), source })?;
    strip_hop_by_hop(&mut parts.headers);
    apply_route_headers(&mut parts.headers, descriptor);

    route.on_request(&mut parts, info).await;

    let capture = route.body_capture();
    let body = if capture.request {
        let bytes = axum::body::to_bytes(body, usize::MAX).await?;
        route.log_body(MessageKind::Request, info, &bytes);
        Body::from(bytes)
    } else {
        body
    };

    let request = Request::from_parts(parts, body);
    let response = tokio::time::timeout(descriptor.timeout, state.client.request(request))
        .await
        .map_err(|_| ProxyError::Timeout(descriptor.timeout))??;

    let duration = route.on_response(info, response.status(), response.headers());
    tracing::debug!(
        route = %descriptor.route_path,
        url = %url,
        status = response.status().as_u16(),
        duration_ms = duration.map(|d| d.as_millis() as u64),
        "Proxied request"
    );

    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    let body = Body::new(body);
    if capture.response {
        let bytes = axum::body::to_bytes(body, usize::MAX).await?;
        route.log_body(MessageKind::Response, info, &bytes);
        return Ok(Response::from_parts(parts, Body::from(bytes)));
    }
    Ok(Response::from_parts(parts, body))
}
