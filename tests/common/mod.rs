//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, Request, StatusCode};
use axum::Router;
use tokio::net::TcpListener;

use proxiff::comparator::{Comparator, Comparison, Response, SimpleComparator};
use proxiff::config::ProxyConfig;
use proxiff::{ProxyServer, Shutdown};

/// What a mock backend saw.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path_and_query: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

#[derive(Clone)]
struct BackendState {
    delay: Duration,
    status: u16,
    headers: Vec<(&'static str, &'static str)>,
    body: &'static str,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// An HTTP backend on an ephemeral port that records every request and
/// answers with a fixed response.
pub struct MockBackend {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockBackend {
    pub async fn start(
        status: u16,
        headers: &[(&'static str, &'static str)],
        body: &'static str,
    ) -> Self {
        Self::start_delayed(Duration::ZERO, status, headers, body).await
    }

    /// Like `start`, but every response is held back for `delay`.
    pub async fn start_delayed(
        delay: Duration,
        status: u16,
        headers: &[(&'static str, &'static str)],
        body: &'static str,
    ) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = BackendState {
            delay,
            status,
            headers: headers.to_vec(),
            body,
            requests: requests.clone(),
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().fallback(record).with_state(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, requests }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn record(State(state): State<BackendState>, request: Request<Body>) -> axum::response::Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    let headers = parts
        .headers
        .iter()
        .map(|(n, v)| (n.to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.to_string())
        .unwrap_or_default();

    state.requests.lock().unwrap().push(RecordedRequest {
        method: parts.method.to_string(),
        path_and_query,
        headers,
        body,
    });

    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    let mut response = axum::response::Response::new(Body::from(state.body));
    *response.status_mut() = StatusCode::from_u16(state.status).unwrap();
    // A fixed date keeps otherwise identical responses identical.
    response.headers_mut().insert(
        "date",
        HeaderValue::from_static("Mon, 19 Oct 2026 00:00:00 GMT"),
    );
    for (name, value) in &state.headers {
        response.headers_mut().append(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    response
}

/// A backend URL nothing is listening on.
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Comparator that counts calls and remembers each verdict.
#[derive(Default)]
pub struct RecordingComparator {
    inner: SimpleComparator,
    calls: AtomicUsize,
    verdicts: Mutex<Vec<Comparison>>,
}

impl RecordingComparator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn verdicts(&self) -> Vec<Comparison> {
        self.verdicts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Comparator for RecordingComparator {
    async fn compare(&self, newer: Arc<Response>, current: Arc<Response>) -> Comparison {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let comparison = self.inner.compare(newer, current).await;
        self.verdicts.lock().unwrap().push(comparison.clone());
        comparison
    }
}

/// Config pointing at the two backends, listening on an ephemeral port.
pub fn proxy_config(newer: &str, current: &str) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.backends.newer = newer.into();
    config.backends.current = current.into();
    config
}

/// Serve a proxy on an ephemeral port until the returned `Shutdown` fires.
pub async fn start_proxy(
    newer: &str,
    current: &str,
    comparator: Arc<dyn Comparator>,
) -> (SocketAddr, Shutdown) {
    start_proxy_with(proxy_config(newer, current), comparator).await
}

pub async fn start_proxy_with(
    config: ProxyConfig,
    comparator: Arc<dyn Comparator>,
) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = ProxyServer::new(config, comparator);
    tokio::spawn(server.run(listener, shutdown.wait()));

    (addr, shutdown)
}

/// Client that ignores proxy environment variables.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
