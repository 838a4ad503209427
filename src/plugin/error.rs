//! Plugin error types.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::state::PluginState;

/// Startup-time failures of the plugin host, plus cookie refusal on the plugin side.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("failed to launch plugin {path}: {source}")]
    Launch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("plugin exited before completing the handshake ({status})")]
    ExitedBeforeHandshake { status: String },

    #[error("timed out after {0:?} waiting for the plugin handshake")]
    HandshakeTimeout(Duration),

    #[error("invalid plugin handshake: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("failed to connect to plugin at {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid plugin state transition from {from:?} to {to:?}")]
    InvalidTransition { from: PluginState, to: PluginState },

    #[error(
        "magic cookie {key} is missing or wrong: this binary is a proxiff plugin and is not meant \
         to be executed directly, start it through `proxiff start --plugin`"
    )]
    CookieMismatch { key: String },

    #[error("plugin I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Problems with the single handshake line a plugin prints on startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("malformed handshake line {0:?}, expected <version>|<transport>|<address>")]
    Malformed(String),

    #[error("protocol version mismatch: host speaks {expected}, plugin speaks {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("unsupported transport {0:?}")]
    UnsupportedTransport(String),

    #[error("invalid plugin address {0:?}")]
    InvalidAddress(String),
}

/// Failures of a single call over the plugin channel.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("plugin connection closed")]
    Closed,

    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("plugin returned an error: {0}")]
    Remote(String),

    #[error("plugin reply carried neither a result nor an error")]
    EmptyReply,

    #[error("malformed plugin reply: {0}")]
    MalformedReply(String),
}

/// Wire values that cannot be turned back into a `Response`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("invalid header name {0:?}")]
    InvalidHeaderName(String),

    #[error("invalid value for header {0:?}")]
    InvalidHeaderValue(String),
}
