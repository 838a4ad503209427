//! Request replication to the backends.
//!
//! # Responsibilities
//! - Hold the buffered inbound request so it can be replayed twice
//! - Put the inbound path and query, unnormalized, onto a backend's
//!   scheme and authority
//! - Copy headers in order, keeping duplicates
//! - Send the call and read the complete response
//!
//! # Design Decisions
//! - `host` is re-derived from the target and `transfer-encoding` from the
//!   buffered body; every other header is forwarded as received
//! - A base URL that does not parse is an error at forward time, so it
//!   surfaces exactly like an unreachable backend
//! - No timeout unless one is configured

use std::fmt;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::header::{HOST, TRANSFER_ENCODING};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, Request, Uri};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use thiserror::Error;
use url::Url;

use crate::comparator::Response;
use crate::http::response::snapshot;

/// Client used for both backends.
pub type HttpClient = Client<HttpConnector, Body>;

/// Which side of the comparison a backend is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendRole {
    Newer,
    Current,
}

impl BackendRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendRole::Newer => "newer",
            BackendRole::Current => "current",
        }
    }
}

impl fmt::Display for BackendRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid backend URL {url:?}: {reason}")]
    InvalidTarget { url: String, reason: String },

    #[error("failed to build backend request: {0}")]
    Build(#[from] axum::http::Error),

    #[error("backend request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("failed to read backend response body: {0}")]
    Body(#[from] axum::Error),

    #[error("backend did not respond within {0:?}")]
    Timeout(Duration),
}

/// One of the two configured backends.
#[derive(Debug, Clone)]
pub struct Backend {
    role: BackendRole,
    base: String,
    url: Result<Url, String>,
}

impl Backend {
    pub fn new(role: BackendRole, base: impl Into<String>) -> Self {
        let base = base.into();
        let url = Url::parse(&base).map_err(|e| e.to_string());
        Self { role, base, url }
    }

    pub fn role(&self) -> BackendRole {
        self.role
    }

    /// The base URL as configured.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Parse problem with the configured URL, if any.
    pub fn url_error(&self) -> Option<&str> {
        self.url.as_ref().err().map(String::as_str)
    }

    /// Target URI for an inbound request: the base's scheme and authority,
    /// the inbound path and query byte for byte.
    pub fn target_uri(&self, inbound: &Uri) -> Result<Uri, ForwardError> {
        let invalid = |reason: String| ForwardError::InvalidTarget {
            url: self.base.clone(),
            reason,
        };

        let url = self.url.as_ref().map_err(|reason| invalid(reason.clone()))?;
        if url.cannot_be_a_base() {
            return Err(invalid("URL cannot carry a path".to_string()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| invalid("URL has no host".to_string()))?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let path_and_query = inbound.path_and_query().map_or("/", |pq| pq.as_str());

        Uri::builder()
            .scheme(url.scheme())
            .authority(authority.as_str())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| invalid(e.to_string()))
    }
}

/// Inbound request with its body fully read.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn new(parts: Parts, body: Bytes) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
        }
    }

    /// Build the outbound copy of this request for `backend`.
    pub fn to_backend(&self, backend: &Backend) -> Result<Request<Body>, ForwardError> {
        let mut builder = Request::builder()
            .method(self.method.clone())
            .uri(backend.target_uri(&self.uri)?);

        if let Some(headers) = builder.headers_mut() {
            for (name, value) in self.headers.iter() {
                if name == HOST || name == TRANSFER_ENCODING {
                    continue;
                }
                headers.append(name.clone(), value.clone());
            }
        }

        Ok(builder.body(Body::from(self.body.clone()))?)
    }
}

/// Send `request` to `backend` and return the complete response.
pub async fn forward(
    client: &HttpClient,
    backend: &Backend,
    request: &InboundRequest,
    timeout: Option<Duration>,
) -> Result<Response, ForwardError> {
    let outbound = request.to_backend(backend)?;
    match timeout {
        Some(limit) => tokio::time::timeout(limit, send(client, outbound))
            .await
            .map_err(|_| ForwardError::Timeout(limit))?,
        None => send(client, outbound).await,
    }
}

async fn send(client: &HttpClient, outbound: Request<Body>) -> Result<Response, ForwardError> {
    let response = client.request(outbound).await?;
    let (parts, body) = response.into_parts();
    let body = axum::body::to_bytes(Body::new(body), usize::MAX).await?;
    Ok(snapshot(parts, body))
}
