//! Shadow-traffic diffing proxy.
//!
//! Every request is replayed to a `newer` and a `current` backend; the two
//! responses are handed to a comparator and the verdict is logged. Callers
//! always receive the `current` response.

pub mod comparator;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod plugin;

pub use comparator::{Comparator, Comparison, Response};
pub use config::schema::ProxyConfig;
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
