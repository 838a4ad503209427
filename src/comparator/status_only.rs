//! Comparator that only looks at status codes.
//!
//! Shipped as the policy behind the `proxiff-status-plugin` binary, and
//! usable in-process for backends whose bodies are expected to drift.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Comparator, Comparison, Response};

#[derive(Debug, Clone, Copy, Default)]
pub struct StatusOnlyComparator;

#[async_trait]
impl Comparator for StatusOnlyComparator {
    async fn compare(&self, newer: Arc<Response>, current: Arc<Response>) -> Comparison {
        let difference = if newer.status == current.status {
            String::new()
        } else {
            format!(
                "Status code differs: newer={}, current={}",
                newer.status, current.status
            )
        };
        Comparison::from_difference(newer, current, difference)
    }
}
