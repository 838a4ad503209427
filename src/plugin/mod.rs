//! Out-of-process comparator plugins.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     host.rs spawns executable (cookie in env)
//!     → plugin prints "<version>|tcp|<addr>" (handshake.rs)
//!     → host validates, connects (client.rs)
//!     → RemoteComparator handed to the proxy
//!
//! Per request:
//!     RemoteComparator::compare
//!     → wire.rs encodes both responses → one frame over the shared channel
//!     → plugin (server.rs) decodes, runs its Comparator, replies with verdict
//!     → verdict reattached to the local responses
//! ```
//!
//! # Design Decisions
//! - Channel failures never surface as HTTP errors; they become a mismatched
//!   comparison tagged with `plugin error: `
//! - Handshake failures are startup failures; the proxy does not serve

pub mod client;
pub mod error;
pub mod handshake;
pub mod host;
pub mod server;
pub mod state;
pub mod wire;

pub use client::{RemoteComparator, RpcClient};
pub use error::{HandshakeError, PluginError, RpcError, WireError};
pub use handshake::{Handshake, HandshakeConfig, PROTOCOL_VERSION};
pub use host::PluginHost;
pub use server::{serve, serve_with_config};
pub use state::PluginState;
