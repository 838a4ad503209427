//! Host/plugin handshake.
//!
//! # Responsibilities
//! - Define the protocol version and magic cookie both sides must agree on
//! - Parse and render the handshake line `<version>|<transport>|<address>`
//! - Validate a parsed handshake against the host's expectations
//!
//! # Design Decisions
//! - The host passes the cookie through the child's environment; the plugin
//!   refuses to serve without it, so a cookie mismatch shows up on the host
//!   side as a plugin that exits before handshaking
//! - Only TCP on a loopback address is offered as a transport

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use super::error::HandshakeError;

/// Version of the compare protocol spoken over the plugin channel.
pub const PROTOCOL_VERSION: u32 = 1;

pub const MAGIC_COOKIE_KEY: &str = "PROXIFF_PLUGIN";
pub const MAGIC_COOKIE_VALUE: &str = "comparator";

/// What host and plugin must share before any traffic flows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    pub protocol_version: u32,
    pub magic_cookie_key: String,
    pub magic_cookie_value: String,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            magic_cookie_key: MAGIC_COOKIE_KEY.to_string(),
            magic_cookie_value: MAGIC_COOKIE_VALUE.to_string(),
        }
    }
}

impl HandshakeConfig {
    /// Plugin-side check of the value found under `magic_cookie_key`.
    pub fn cookie_matches(&self, value: Option<&str>) -> bool {
        value == Some(self.magic_cookie_value.as_str())
    }
}

/// Transport advertised by the plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
        }
    }
}

impl FromStr for Transport {
    type Err = HandshakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Transport::Tcp),
            other => Err(HandshakeError::UnsupportedTransport(other.to_string())),
        }
    }
}

/// A parsed handshake line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: u32,
    pub transport: Transport,
    pub address: SocketAddr,
}

impl Handshake {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            transport: Transport::Tcp,
            address,
        }
    }

    /// Parse a handshake line and check it against `expected`.
    pub fn negotiate(line: &str, expected: &HandshakeConfig) -> Result<Self, HandshakeError> {
        let handshake: Handshake = line.parse()?;
        handshake.validate(expected)?;
        Ok(handshake)
    }

    pub fn validate(&self, expected: &HandshakeConfig) -> Result<(), HandshakeError> {
        if self.protocol_version != expected.protocol_version {
            return Err(HandshakeError::VersionMismatch {
                expected: expected.protocol_version,
                actual: self.protocol_version,
            });
        }
        Ok(())
    }
}

impl FromStr for Handshake {
    type Err = HandshakeError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let mut fields = line.split('|');
        let (Some(version), Some(transport), Some(address), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(HandshakeError::Malformed(line.to_string()));
        };

        let protocol_version = version
            .parse()
            .map_err(|_| HandshakeError::Malformed(line.to_string()))?;
        let transport = transport.parse()?;
        let address = address
            .parse()
            .map_err(|_| HandshakeError::InvalidAddress(address.to_string()))?;

        Ok(Self {
            protocol_version,
            transport,
            address,
        })
    }
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}",
            self.protocol_version,
            self.transport.as_str(),
            self.address
        )
    }
}
