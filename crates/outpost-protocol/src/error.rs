//! Error types for the protocol layer.

/// Errors that can occur in the protocol layer.
///
/// A frame that fails to decode is dropped and the connection keeps going.
/// Only a bad route ends a connection.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into text).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, a missing required field,
    /// or a field of the wrong type.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The connection was opened on a path that is not a game route.
    #[error("invalid route {path:?}: {reason}")]
    InvalidRoute {
        /// The request path as received.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}
