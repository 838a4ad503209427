//! HTTP server setup and the proxy handler.
//!
//! # Responsibilities
//! - Create Axum Router with a catch-all handler
//! - Wire up middleware (tracing)
//! - Buffer the inbound request, replay it to newer then current
//! - Run the active comparator and log its verdict
//! - Return the current backend's response verbatim
//!
//! # Failure Policy
//! - Inbound body unreadable → 500, no backend is called
//! - Newer backend fails → 502, current is never called
//! - Current backend fails → 502, the comparator is never called
//! - The verdict never changes what the caller receives

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::Response,
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::comparator::Comparator;
use crate::config::ProxyConfig;
use crate::http::request::{forward, Backend, BackendRole, ForwardError, HttpClient, InboundRequest};
use crate::http::response::{error_response, to_client_response};
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub newer: Arc<Backend>,
    pub current: Arc<Backend>,
    pub comparator: Arc<dyn Comparator>,
    pub client: HttpClient,
    pub backend_timeout: Option<Duration>,
}

/// HTTP server for the diffing proxy.
pub struct ProxyServer {
    router: Router,
    config: ProxyConfig,
}

impl ProxyServer {
    /// Create a new server comparing with `comparator`.
    pub fn new(config: ProxyConfig, comparator: Arc<dyn Comparator>) -> Self {
        let newer = Arc::new(Backend::new(BackendRole::Newer, config.backends.newer.clone()));
        let current = Arc::new(Backend::new(
            BackendRole::Current,
            config.backends.current.clone(),
        ));

        for backend in [&newer, &current] {
            if let Some(reason) = backend.url_error() {
                tracing::warn!(
                    backend = %backend.role(),
                    url = %backend.base(),
                    reason = %reason,
                    "Backend URL does not parse; requests will fail with 502"
                );
            }
        }

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let state = AppState {
            newer,
            current,
            comparator,
            client,
            backend_timeout: config.backends.timeout(),
        };

        let router = Self::build_router(state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// The router, for serving on a custom transport or driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            newer_server = %self.config.backends.newer,
            current_server = %self.config.backends.current,
            "Starting proxiff server"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    tracing::debug!(request_id = %request_id, method = %method, path = %path, "Proxying request");

    // 1. Buffer the body once so both backends get the same bytes
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(
                request_id = %request_id,
                error = %e,
                method = %method,
                path = %path,
                "Failed to read request body"
            );
            metrics::record_request(500, start_time);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read request body");
        }
    };
    let inbound = InboundRequest::new(parts, body);

    // 2. Newer, then 3. current
    let newer = match forward(&state.client, &state.newer, &inbound, state.backend_timeout).await {
        Ok(response) => Arc::new(response),
        Err(e) => return backend_failure(&state.newer, &e, &inbound, request_id, start_time),
    };
    let current = match forward(&state.client, &state.current, &inbound, state.backend_timeout).await {
        Ok(response) => Arc::new(response),
        Err(e) => return backend_failure(&state.current, &e, &inbound, request_id, start_time),
    };

    // 4. Compare, newer first
    let comparison = state.comparator.compare(newer.clone(), current.clone()).await;

    // 5. Log the verdict
    if comparison.matched() {
        tracing::info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status = current.status,
            "responses match"
        );
    } else {
        tracing::warn!(
            request_id = %request_id,
            method = %method,
            path = %path,
            newer_status = newer.status,
            current_status = current.status,
            difference = %comparison.difference(),
            "response difference detected"
        );
    }
    metrics::record_comparison(comparison.matched(), comparison.is_plugin_error());
    metrics::record_request(current.status, start_time);

    // 6. The caller always gets current
    to_client_response(&current)
}

fn backend_failure(
    backend: &Backend,
    error: &ForwardError,
    inbound: &InboundRequest,
    request_id: Uuid,
    start_time: Instant,
) -> Response {
    tracing::error!(
        request_id = %request_id,
        backend = %backend.role(),
        server = %backend.base(),
        method = %inbound.method,
        path = %inbound.uri.path(),
        error = %error,
        "Failed to forward request to {} server",
        backend.role()
    );
    metrics::record_backend_error(backend.role().as_str());
    metrics::record_request(502, start_time);

    let message = match backend.role() {
        BackendRole::Newer => "Failed to forward to newer server",
        BackendRole::Current => "Failed to forward to current server",
    };
    error_response(StatusCode::BAD_GATEWAY, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::SimpleComparator;
    use axum::body::Bytes;
    use hyper::body::Frame;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tower::ServiceExt;

    /// Body whose first read fails.
    struct BrokenBody;

    impl hyper::body::Body for BrokenBody {
        type Data = Bytes;
        type Error = std::io::Error;

        fn poll_frame(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
            Poll::Ready(Some(Err(std::io::Error::other("client went away"))))
        }
    }

    fn server(newer: &str, current: &str) -> ProxyServer {
        let mut config = ProxyConfig::default();
        config.backends.newer = newer.into();
        config.backends.current = current.into();
        ProxyServer::new(config, Arc::new(SimpleComparator))
    }

    #[tokio::test]
    async fn test_unreadable_body_is_500() {
        let app = server("not a url", "not a url").router();
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .body(Body::new(BrokenBody))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_malformed_newer_url_is_502() {
        let app = server("not a url", "http://127.0.0.1:1").router();
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, "Failed to forward to newer server");
    }
}
