//! Unified error type for the Outpost server.

use outpost_protocol::ProtocolError;
use outpost_transport::TransportError;

use crate::config::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls, so
/// `?` converts layer errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum OutpostError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, bad route).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The server configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
