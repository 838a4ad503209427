//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Client request
//!     → server.rs (Axum setup, buffer body once)
//!     → request.rs (replay to newer, then current)
//!     → comparator (verdict is logged, never returned)
//!     → response.rs (current's response, verbatim)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{Backend, BackendRole, ForwardError};
pub use server::ProxyServer;
