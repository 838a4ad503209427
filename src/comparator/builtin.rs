//! Built-in structural comparator.
//!
//! # Responsibilities
//! - Compare status code, header multi-map and body of two responses
//! - Render one line per field-level difference
//!
//! # Design Decisions
//! - Output order is fixed (status, headers sorted by name, body) so the same
//!   pair of responses always yields the same text
//! - Header values are compared as raw bytes, rendered lossily
//! - Body differences are reported as the smallest byte range outside the
//!   common prefix and suffix, with a short escaped preview of each side

use std::collections::BTreeSet;
use std::fmt::Write;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;

use super::{Comparator, Comparison, Response};

/// Longest slice of a differing body range shown in the preview.
const PREVIEW_LIMIT: usize = 64;

/// Compares every field of the two responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleComparator;

impl SimpleComparator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Comparator for SimpleComparator {
    async fn compare(&self, newer: Arc<Response>, current: Arc<Response>) -> Comparison {
        let difference = diff_responses(&newer, &current);
        Comparison::from_difference(newer, current, difference)
    }
}

/// Render every difference between `newer` and `current`. Empty when equal.
pub fn diff_responses(newer: &Response, current: &Response) -> String {
    let mut lines = Vec::new();

    if newer.status != current.status {
        lines.push(format!(
            "status: newer={} current={}",
            newer.status, current.status
        ));
    }

    lines.extend(diff_headers(&newer.headers, &current.headers));

    if let Some(body) = diff_body(&newer.body, &current.body) {
        lines.push(body);
    }

    lines.join("\n")
}

fn diff_headers(newer: &HeaderMap, current: &HeaderMap) -> Vec<String> {
    let names: BTreeSet<&str> = newer
        .keys()
        .chain(current.keys())
        .map(|name| name.as_str())
        .collect();

    let mut lines = Vec::new();
    for name in names {
        let newer_values: Vec<&[u8]> = newer.get_all(name).iter().map(|v| v.as_bytes()).collect();
        let current_values: Vec<&[u8]> =
            current.get_all(name).iter().map(|v| v.as_bytes()).collect();

        if newer_values != current_values {
            lines.push(format!(
                "header {:?}: newer={} current={}",
                name,
                render_values(&newer_values),
                render_values(&current_values)
            ));
        }
    }
    lines
}

fn render_values(values: &[&[u8]]) -> String {
    if values.is_empty() {
        return "<absent>".to_string();
    }
    let rendered: Vec<String> = values
        .iter()
        .map(|v| String::from_utf8_lossy(v).into_owned())
        .collect();
    format!("{:?}", rendered)
}

fn diff_body(newer: &[u8], current: &[u8]) -> Option<String> {
    if newer == current {
        return None;
    }

    let prefix = newer
        .iter()
        .zip(current.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let max_suffix = newer.len().min(current.len()) - prefix;
    let suffix = newer
        .iter()
        .rev()
        .zip(current.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    let newer_end = newer.len() - suffix;
    let current_end = current.len() - suffix;

    let mut out = String::new();
    let _ = write!(
        out,
        "body: differs in bytes [{}, {}) of newer ({} bytes) and [{}, {}) of current ({} bytes)",
        prefix,
        newer_end,
        newer.len(),
        prefix,
        current_end,
        current.len()
    );
    let _ = write!(out, "\n  newer:   {}", preview(&newer[prefix..newer_end]));
    let _ = write!(out, "\n  current: {}", preview(&current[prefix..current_end]));
    Some(out)
}

fn preview(range: &[u8]) -> String {
    let shown = &range[..range.len().min(PREVIEW_LIMIT)];
    let text = format!("{:?}", String::from_utf8_lossy(shown));
    if range.len() > PREVIEW_LIMIT {
        format!("{}... ({} more bytes)", text, range.len() - PREVIEW_LIMIT)
    } else {
        text
    }
}
