//! Authoritative world state for Outpost sessions.
//!
//! A session is one isolated game world: a square map, the players walking
//! on it, and the resources scattered over it.
//!
//! # Key types
//!
//! - [`Session`]: the state container and its mutation rules
//! - [`PlayerState`]: position, stats, inventory and color of one player
//! - [`Resource`] / [`ResourceKind`]: collectibles placed at creation
//! - [`SessionConfig`] / [`SpawnPoint`]: map size, resource count, spawn
//! - [`Snapshot`]: the serializable view sent to clients

mod config;
mod player;
mod resource;
mod session;

pub use config::{SessionConfig, SpawnPoint};
pub use player::{DEFAULT_HEALTH, DEFAULT_HUNGER, PlayerState, color_for};
pub use resource::{Resource, ResourceKind, generate_resources};
pub use session::{Session, Snapshot};
