//! # Outpost
//!
//! Authoritative real-time state synchronizer for multiplayer top-down
//! worlds.
//!
//! Clients connect over WebSocket at `/ws/{session_id}/{player_id}`. Each
//! session is an isolated world holding a square map, the players on it and
//! a set of resources. Clients send movement and collection intents; the
//! server applies them and rebroadcasts the full session state to every
//! player in that session.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use outpost::prelude::*;
//!
//! # async fn run() -> Result<(), OutpostError> {
//! let server = OutpostServer::builder()
//!     .bind("0.0.0.0:8000")
//!     .build()
//!     .await?;
//! server.run_until(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await
//! # }
//! ```

mod broadcast;
mod config;
mod connections;
mod dispatcher;
mod error;
mod registry;
mod server;

pub use broadcast::{BroadcastReport, Broadcaster};
pub use config::{
    ConfigError, ENV_BIND, ENV_IDLE_TIMEOUT_SECS, ENV_MAP_SIZE,
    ENV_RESOURCE_COUNT, ENV_WRITE_TIMEOUT_SECS, MAX_IDLE_TIMEOUT, ServerConfig,
};
pub use connections::{
    ConnectionHandle, ConnectionManager, DeliveryError, OutboundFrame,
};
pub use dispatcher::{ConnectionPhase, DisconnectReason};
pub use error::OutpostError;
pub use registry::{LeaveOutcome, Room, RoomState, SessionRegistry};
pub use server::{OutpostServer, OutpostServerBuilder};

/// Convenience re-exports for building and running a server.
pub mod prelude {
    pub use crate::{
        OutpostError, OutpostServer, OutpostServerBuilder, ServerConfig,
        SessionRegistry,
    };
    pub use outpost_protocol::{ClientFrame, PlayerId, ServerFrame, SessionId};
    pub use outpost_session::{
        PlayerState, Resource, ResourceKind, SessionConfig, SpawnPoint,
    };
}
