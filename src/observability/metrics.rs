//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxiff_comparisons_total` (counter): verdicts by `outcome`
//!   (`match`, `mismatch`, `plugin_error`)
//! - `proxiff_backend_errors_total` (counter): failed forwards by `backend`
//! - `proxiff_requests_total` (counter): caller responses by `status`
//! - `proxiff_request_duration_seconds` (histogram): end-to-end latency
//!
//! # Design Decisions
//! - The Prometheus exporter is only installed when an address is configured

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn comparison_outcome(matched: bool, plugin_error: bool) -> &'static str {
    match (matched, plugin_error) {
        (true, _) => "match",
        (false, true) => "plugin_error",
        (false, false) => "mismatch",
    }
}

pub fn record_comparison(matched: bool, plugin_error: bool) {
    metrics::counter!(
        "proxiff_comparisons_total",
        "outcome" => comparison_outcome(matched, plugin_error)
    )
    .increment(1);
}

pub fn record_backend_error(backend: &'static str) {
    metrics::counter!("proxiff_backend_errors_total", "backend" => backend).increment(1);
}

pub fn record_request(status: u16, start_time: Instant) {
    metrics::counter!("proxiff_requests_total", "status" => status.to_string()).increment(1);
    metrics::histogram!("proxiff_request_duration_seconds")
        .record(start_time.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_outcome_labels() {
        assert_eq!(comparison_outcome(true, false), "match");
        assert_eq!(comparison_outcome(false, false), "mismatch");
        assert_eq!(comparison_outcome(false, true), "plugin_error");
    }

    #[test]
    fn test_recording_without_exporter_is_noop() {
        record_comparison(false, false);
        record_backend_error("newer");
        record_request(200, Instant::now());
    }
}
