//! Command-line overrides layered on top of the file configuration.

use std::path::PathBuf;

use crate::config::schema::{LogFormat, ProxyConfig};

/// Values given on the command line. `None` leaves the file value alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub newer: Option<String>,
    pub current: Option<String>,
    pub port: Option<u16>,
    pub plugin: Option<PathBuf>,
    pub log_format: Option<LogFormat>,
}

impl ConfigOverrides {
    pub fn apply(self, config: &mut ProxyConfig) {
        if let Some(newer) = self.newer {
            config.backends.newer = newer;
        }
        if let Some(current) = self.current {
            config.backends.current = current;
        }
        if let Some(port) = self.port {
            config.listener.bind_address = format!("0.0.0.0:{}", port);
        }
        if let Some(plugin) = self.plugin {
            config.plugin.path = Some(plugin);
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }
    }
}
