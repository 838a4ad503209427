//! Response comparison subsystem.
//!
//! # Data Flow
//! ```text
//! newer backend   → Response ─┐
//!                             ├→ Comparator::compare → Comparison → log + metrics
//! current backend → Response ─┘
//! ```
//!
//! # Design Decisions
//! - One trait, several implementations: in-process (`SimpleComparator`,
//!   `StatusOnlyComparator`) and cross-process (`plugin::RemoteComparator`).
//!   The proxy handler only ever sees `Arc<dyn Comparator>`.
//! - `compare` is total: failures are folded into a mismatched `Comparison`.
//! - A `Comparison` can only be built from its difference text, so
//!   `matched == difference.is_empty()` always holds.

pub mod builtin;
pub mod status_only;

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::HeaderMap;

pub use builtin::SimpleComparator;
pub use status_only::StatusOnlyComparator;

/// Prefix marking a difference that came from a broken comparator channel
/// rather than from the responses themselves.
pub const PLUGIN_ERROR_PREFIX: &str = "plugin error: ";

/// Fully materialized snapshot of one backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Case-insensitive multi-map; values keep their order within a key.
    pub headers: HeaderMap,
    /// Complete body.
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }
}

/// Outcome of comparing a newer response against a current one.
#[derive(Debug, Clone)]
pub struct Comparison {
    matched: bool,
    newer: Arc<Response>,
    current: Arc<Response>,
    difference: String,
}

impl Comparison {
    /// Build a comparison from its difference text. An empty difference is a match.
    pub fn from_difference(
        newer: Arc<Response>,
        current: Arc<Response>,
        difference: impl Into<String>,
    ) -> Self {
        let difference = difference.into();
        Self {
            matched: difference.is_empty(),
            newer,
            current,
            difference,
        }
    }

    /// Mismatch caused by a comparator that could not deliver a verdict.
    pub fn plugin_error(
        newer: Arc<Response>,
        current: Arc<Response>,
        cause: impl std::fmt::Display,
    ) -> Self {
        Self::from_difference(newer, current, format!("{PLUGIN_ERROR_PREFIX}{cause}"))
    }

    pub fn matched(&self) -> bool {
        self.matched
    }

    pub fn difference(&self) -> &str {
        &self.difference
    }

    pub fn newer(&self) -> &Arc<Response> {
        &self.newer
    }

    pub fn current(&self) -> &Arc<Response> {
        &self.current
    }

    /// True when the mismatch reflects a comparator failure.
    pub fn is_plugin_error(&self) -> bool {
        self.difference.starts_with(PLUGIN_ERROR_PREFIX)
    }
}

/// Pluggable policy deciding whether two responses are equivalent.
///
/// Arguments are ordered: `newer` first, `current` second. Implementations
/// may treat them asymmetrically.
#[async_trait]
pub trait Comparator: Send + Sync {
    async fn compare(&self, newer: Arc<Response>, current: Arc<Response>) -> Comparison;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty(status: u16) -> Arc<Response> {
        Arc::new(Response::new(status, HeaderMap::new(), Bytes::new()))
    }

    #[test]
    fn test_empty_difference_is_match() {
        let c = Comparison::from_difference(empty(200), empty(200), "");
        assert!(c.matched());
        assert_eq!(c.difference(), "");
    }

    #[test]
    fn test_difference_is_mismatch() {
        let c = Comparison::from_difference(empty(200), empty(500), "status: newer=200 current=500");
        assert!(!c.matched());
        assert!(!c.is_plugin_error());
        assert_eq!(c.newer().status, 200);
        assert_eq!(c.current().status, 500);
    }

    #[test]
    fn test_plugin_error_is_tagged_mismatch() {
        let c = Comparison::plugin_error(empty(200), empty(200), "connection reset");
        assert!(!c.matched());
        assert!(c.is_plugin_error());
        assert_eq!(c.difference(), "plugin error: connection reset");
    }
}
