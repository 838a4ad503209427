//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Load the comparator: built-in, or a plugin process
//! - Install the metrics exporter when configured
//! - Bind the listener and serve until shutdown
//! - Terminate the plugin on every exit path
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The comparator loads before the listener binds, so a broken plugin
//!   never leaves a port accepting traffic
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::comparator::{Comparator, SimpleComparator};
use crate::config::{validate_config, ConfigError, PluginConfig, ProxyConfig};
use crate::http::ProxyServer;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::plugin::{HandshakeConfig, PluginError, PluginHost};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to start comparator plugin: {0}")]
    Plugin(#[from] PluginError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// The comparator for this run, plus the plugin process behind it if any.
pub struct LoadedComparator {
    pub comparator: Arc<dyn Comparator>,
    pub host: Option<PluginHost>,
}

/// Launch the configured plugin, or fall back to the built-in comparator.
pub async fn load_comparator(config: &PluginConfig) -> Result<LoadedComparator, StartupError> {
    let Some(path) = &config.path else {
        tracing::info!("Using built-in comparator");
        return Ok(LoadedComparator {
            comparator: Arc::new(SimpleComparator::new()),
            host: None,
        });
    };

    let (host, comparator) =
        PluginHost::launch(path, &HandshakeConfig::default(), config.start_timeout()).await?;
    tracing::info!(plugin = %path.display(), "Using comparator plugin");

    Ok(LoadedComparator {
        comparator: Arc::new(comparator),
        host: Some(host),
    })
}

/// Run the proxy until `shutdown` fires.
pub async fn run(config: ProxyConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    validate_config(&config).map_err(ConfigError::Validation)?;

    let LoadedComparator {
        comparator,
        mut host,
    } = load_comparator(&config.plugin).await?;

    let result = serve(config, comparator, shutdown).await;

    if let Some(host) = host.as_mut() {
        host.shutdown().await;
    }
    tracing::info!("Shutdown complete");
    result
}

async fn serve(
    config: ProxyConfig,
    comparator: Arc<dyn Comparator>,
    shutdown: Shutdown,
) -> Result<(), StartupError> {
    if let Some(addr) = &config.observability.metrics_address {
        // Validation already checked the address.
        if let Ok(addr) = addr.parse::<SocketAddr>() {
            metrics::init_metrics(addr)?;
        }
    }

    let bind_address = config.listener.bind_address.clone();
    let listener = TcpListener::bind(&bind_address)
        .await
        .map_err(|source| StartupError::Bind {
            addr: bind_address.clone(),
            source,
        })?;

    ProxyServer::new(config, comparator)
        .run(listener, shutdown.wait())
        .await
        .map_err(StartupError::Serve)
}
