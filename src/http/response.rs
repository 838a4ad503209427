//! Response snapshots and the reply written back to the caller.
//!
//! # Responsibilities
//! - Freeze a backend response into a comparator `Response`
//! - Turn the current backend's snapshot into the caller's response
//! - Plain-text error replies for pipeline failures (500/502)
//!
//! # Design Decisions
//! - `transfer-encoding` is dropped from snapshots since the body is already
//!   complete; all other headers keep their multiplicity and order

use axum::body::{Body, Bytes};
use axum::http::header::TRANSFER_ENCODING;
use axum::http::response::Parts;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::comparator::Response;

/// Snapshot a fully read backend response.
pub fn snapshot(parts: Parts, body: Bytes) -> Response {
    let mut headers = parts.headers;
    headers.remove(TRANSFER_ENCODING);
    Response::new(parts.status.as_u16(), headers, body)
}

/// The caller-facing copy of a backend response.
pub fn to_client_response(response: &Response) -> axum::response::Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut reply = axum::response::Response::new(Body::from(response.body.clone()));
    *reply.status_mut() = status;
    *reply.headers_mut() = response.headers.clone();
    reply
}

pub fn error_response(status: StatusCode, message: &'static str) -> axum::response::Response {
    (status, message).into_response()
}
