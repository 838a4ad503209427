//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Proxy handler and plugin host produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (comparison and backend error counters)
//!
//! Consumers:
//!     → stdout (JSON for log collectors, or pretty for local runs)
//!     → Prometheus scrape endpoint, when configured
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) by default
//! - Each request carries a request ID in its log records; it is never
//!   forwarded to the backends
//! - Metrics are recorded unconditionally; without an exporter they are no-ops

pub mod logging;
pub mod metrics;
