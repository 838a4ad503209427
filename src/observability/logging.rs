//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the process-wide tracing subscriber, once
//! - Pick JSON or pretty output from config
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level
//! - JSON events are flattened so fields sit next to the message

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

/// Filter used when `RUST_LOG` is unset.
pub fn default_directives(level: &str) -> String {
    format!("proxiff={level},tower_http=warn")
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(
    config: &ObservabilityConfig,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));

    let json = (config.log_format == LogFormat::Json)
        .then(|| fmt::layer().json().flatten_event(true).with_current_span(false));
    let pretty = (config.log_format == LogFormat::Pretty).then(fmt::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .try_init()
}
