//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! optional config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → overrides.rs (command-line flags win)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable for the process lifetime)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; backends are not reconfigurable per request
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod overrides;
pub mod schema;
pub mod validation;

pub use loader::{load_config, read_config, ConfigError};
pub use overrides::ConfigOverrides;
pub use schema::{
    BackendsConfig, ListenerConfig, LogFormat, ObservabilityConfig, PluginConfig, ProxyConfig,
};
pub use validation::{validate_config, ValidationError};
