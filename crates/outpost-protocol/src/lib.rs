//! Wire protocol for Outpost.
//!
//! - **Types** ([`ClientFrame`], [`ServerFrame`], [`SessionId`],
//!   [`PlayerId`]): what travels on a game connection.
//! - **Routes** ([`WsRoute`]): how a connection names its session and
//!   player.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how frames are converted
//!   to and from text.
//! - **Errors** ([`ProtocolError`]).
//!
//! The protocol layer knows nothing about sockets or sessions; it only
//! shapes and parses frames.

mod codec;
mod error;
mod route;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use route::{DEFAULT_MAX_ID_LEN, WS_PREFIX, WsRoute};
pub use types::{ClientFrame, PlayerId, ServerFrame, SessionId};
