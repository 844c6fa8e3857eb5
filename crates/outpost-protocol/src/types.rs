//! Identity types and the frames exchanged over a game connection.
//!
//! Every frame is one JSON text message. Clients send intents
//! ([`ClientFrame`]); the server answers with full-state snapshots (defined
//! next to the state they describe, in `outpost-session`) and with the
//! occasional [`ServerFrame`] control message.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifier of a session (one isolated game world).
///
/// Taken verbatim from the connection path. Serializes as a bare string.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Identifier of a player within a session.
///
/// Taken verbatim from the connection path and used as the key of the
/// `players` object in every snapshot.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl Borrow<str> for PlayerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// An intent sent by a client.
///
/// Tagged by the `"type"` field:
///
/// ```json
/// {"type":"move","dx":10,"dy":-5}
/// {"type":"collect","id":"9f2c..."}
/// {"type":"ping"}
/// ```
///
/// Unrecognized `type` values decode to [`ClientFrame::Unknown`] instead of
/// failing, so newer clients don't trip up older servers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Move the sender by a delta. Missing deltas count as 0.
    Move {
        #[serde(default)]
        dx: i64,
        #[serde(default)]
        dy: i64,
    },

    /// Collect a resource by id.
    Collect {
        /// The resource to collect.
        id: String,
    },

    /// Client keep-alive.
    Ping,

    /// Reply to a server [`ServerFrame::Ping`].
    Pong,

    /// Any other `type`.
    #[serde(other)]
    Unknown,
}

impl ClientFrame {
    /// Returns `true` if applying this frame should be followed by a
    /// state broadcast.
    pub fn triggers_broadcast(&self) -> bool {
        matches!(self, Self::Move { .. } | Self::Collect { .. })
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// A control frame sent by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Idle ping, sent after the idle timeout elapses.
    Ping,
}
