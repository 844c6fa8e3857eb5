//! The authoritative state of one game world.
//!
//! A [`Session`] is a plain data structure: it holds the map, the players
//! and the resources, and applies the mutation rules. It does no locking of
//! its own. The server wraps each session in its own mutex, so every
//! operation here runs with exclusive access and never races.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use outpost_protocol::{PlayerId, SessionId};
use serde::Serialize;

use crate::resource::generate_resources;
use crate::{PlayerState, Resource, SessionConfig, SpawnPoint};

/// One isolated game world.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    map_size: u32,
    spawn: SpawnPoint,
    players: HashMap<PlayerId, PlayerState>,
    resources: Vec<Resource>,
}

/// A borrowed view of a session's state, shaped like the wire snapshot:
///
/// ```json
/// {"players": {"p1": {"x":500,"y":500,...}}, "resources": [...], "map_size": 1000}
/// ```
///
/// Serialize it while the session is locked; every recipient then gets the
/// same text.
#[derive(Debug, Serialize)]
pub struct Snapshot<'a> {
    pub players: &'a HashMap<PlayerId, PlayerState>,
    pub resources: &'a [Resource],
    pub map_size: u32,
}

impl Session {
    /// Creates a session with a freshly generated resource set.
    pub fn new(id: SessionId, config: &SessionConfig) -> Self {
        let resources = generate_resources(
            &mut rand::rng(),
            config.resource_count,
            config.map_size,
        );
        Self::with_resources(id, config, resources)
    }

    /// Creates a session with the given resources.
    ///
    /// Resources outside the map are clamped onto it.
    pub fn with_resources(
        id: SessionId,
        config: &SessionConfig,
        mut resources: Vec<Resource>,
    ) -> Self {
        let max = i64::from(config.map_size);
        for r in &mut resources {
            r.x = r.x.clamp(0, max);
            r.y = r.y.clamp(0, max);
        }
        tracing::debug!(
            session_id = %id,
            map_size = config.map_size,
            resources = resources.len(),
            "session created"
        );
        Self {
            id,
            map_size: config.map_size,
            spawn: config.spawn,
            players: HashMap::new(),
            resources,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn map_size(&self) -> u32 {
        self.map_size
    }

    /// Adds a player at the spawn point with default stats.
    ///
    /// If the player is already present, their state is reset to the
    /// defaults rather than merged.
    pub fn add_player(&mut self, player_id: PlayerId) -> &PlayerState {
        let (x, y) = self.spawn.position(self.map_size);
        let state = PlayerState::spawn(&player_id, x, y);
        match self.players.entry(player_id) {
            Entry::Occupied(mut entry) => {
                entry.insert(state);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(state),
        }
    }

    /// Removes a player. Missing ids are ignored.
    pub fn remove_player(&mut self, player_id: &PlayerId) -> Option<PlayerState> {
        self.players.remove(player_id)
    }

    /// Moves a player by `(dx, dy)`, clamping each axis to `[0, map_size]`.
    ///
    /// Returns the new position, or `None` if the player is not in the
    /// session (in which case nothing changes).
    pub fn move_player(
        &mut self,
        player_id: &PlayerId,
        dx: i64,
        dy: i64,
    ) -> Option<(i64, i64)> {
        let max = i64::from(self.map_size);
        let player = self.players.get_mut(player_id)?;
        player.x = player.x.saturating_add(dx).clamp(0, max);
        player.y = player.y.saturating_add(dy).clamp(0, max);
        Some((player.x, player.y))
    }

    /// Handles a collect intent.
    ///
    /// Collection has no effect on state: the resource stays on the map and
    /// nothing is added to the inventory. The intent is still accepted, and
    /// the caller broadcasts afterwards as for any other accepted intent.
    pub fn collect(&mut self, resource_id: &str, player_id: &PlayerId) {
        let known = self.resources.iter().any(|r| r.id == resource_id);
        tracing::trace!(
            session_id = %self.id,
            %player_id,
            resource_id,
            known,
            "collect intent (no state change)"
        );
    }

    pub fn player(&self, player_id: &PlayerId) -> Option<&PlayerState> {
        self.players.get(player_id)
    }

    pub fn players(&self) -> &HashMap<PlayerId, PlayerState> {
        &self.players
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Returns `true` if no players are in the session.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Borrows the current state as a wire snapshot.
    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            players: &self.players,
            resources: &self.resources,
            map_size: self.map_size,
        }
    }
}
