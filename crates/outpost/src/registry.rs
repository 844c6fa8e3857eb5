//! Session registry: resolves session ids to live rooms, creating them on
//! first reference and evicting them when the last player leaves.
//!
//! # Locking
//!
//! Two kinds of lock exist, and they are always taken in this order:
//!
//! 1. the registry map lock, held only to look up, create or evict a room;
//! 2. one room lock per session, guarding that session's world state and
//!    connection table together.
//!
//! Nothing ever holds a room lock while waiting for the registry lock, so
//! the ordering cannot deadlock. Sessions never share a room lock.

use std::collections::HashMap;
use std::sync::Arc;

use outpost_protocol::{PlayerId, SessionId};
use outpost_session::{Session, SessionConfig};
use outpost_transport::ConnectionId;
use tokio::sync::{Mutex, MutexGuard};

use crate::connections::{ConnectionHandle, ConnectionManager};

/// Everything guarded by one room's lock.
#[derive(Debug)]
pub struct RoomState {
    /// The world state.
    pub session: Session,
    /// The session's live connections.
    pub connections: ConnectionManager,
    /// Set once the room has been evicted from the registry. A closed room
    /// never accepts players again.
    closed: bool,
}

impl RoomState {
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// No players and no connections.
    pub fn is_idle(&self) -> bool {
        self.session.is_empty() && self.connections.is_empty()
    }
}

/// A live session: its world state and its connections behind one lock.
#[derive(Debug)]
pub struct Room {
    id: SessionId,
    state: Mutex<RoomState>,
}

impl Room {
    fn new(id: SessionId, config: &SessionConfig) -> Self {
        let session = Session::new(id.clone(), config);
        Self {
            id,
            state: Mutex::new(RoomState {
                session,
                connections: ConnectionManager::new(),
                closed: false,
            }),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Locks the room for exclusive access.
    pub async fn lock(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock().await
    }
}

/// What a [`SessionRegistry::leave`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LeaveOutcome {
    /// The player entry was removed from the session.
    pub player_removed: bool,
    /// The room was evicted because nobody is left.
    pub evicted: bool,
}

/// Owns every live session of the process.
pub struct SessionRegistry {
    config: SessionConfig,
    rooms: Mutex<HashMap<SessionId, Arc<Room>>>,
}

impl SessionRegistry {
    /// Creates an empty registry. New sessions are built from `config`.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            rooms: Mutex::new(HashMap::new()),
        }
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the room for `session_id`, creating it if absent.
    ///
    /// Creation happens under the registry lock, so concurrent first
    /// references to the same id all get the same room.
    pub async fn resolve(&self, session_id: &SessionId) -> Arc<Room> {
        let mut rooms = self.rooms.lock().await;
        if let Some(room) = rooms.get(session_id) {
            return Arc::clone(room);
        }
        let room = Arc::new(Room::new(session_id.clone(), &self.config));
        rooms.insert(session_id.clone(), Arc::clone(&room));
        tracing::info!(%session_id, sessions = rooms.len(), "session created");
        room
    }

    /// Returns the room for `session_id` without creating it.
    pub async fn get(&self, session_id: &SessionId) -> Option<Arc<Room>> {
        self.rooms.lock().await.get(session_id).cloned()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.rooms.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.lock().await.is_empty()
    }

    /// Adds `player_id` to the session and registers its connection, as
    /// one step under the room lock.
    ///
    /// A player id that already has a live connection is taken over: the
    /// new connection replaces the old one, whose queue is closed so its
    /// task ends, and the player entry is reset to the spawn point.
    ///
    /// If the resolved room is evicted between lookup and lock, the lookup
    /// is retried so the player always lands in a live room.
    pub async fn join(
        &self,
        session_id: &SessionId,
        player_id: &PlayerId,
        handle: ConnectionHandle,
    ) -> Arc<Room> {
        loop {
            let room = self.resolve(session_id).await;
            let mut state = room.lock().await;
            if state.closed {
                continue;
            }
            let conn_id = handle.id();
            if let Some(previous) =
                state.connections.register(player_id.clone(), handle)
            {
                tracing::info!(
                    %session_id,
                    %player_id,
                    previous = %previous.id(),
                    %conn_id,
                    "player reconnected, replacing connection"
                );
            }
            state.session.add_player(player_id.clone());
            tracing::info!(
                %session_id,
                %player_id,
                %conn_id,
                players = state.session.player_count(),
                "player joined"
            );
            drop(state);
            return room;
        }
    }

    /// Removes `player_id` and its connection from `room`, then evicts the
    /// room if it is left idle.
    ///
    /// The player is only removed while connection `conn_id` still owns it
    /// (or nothing does). A stale teardown therefore never removes a player
    /// that a newer connection has since claimed.
    pub async fn leave(
        &self,
        room: &Arc<Room>,
        player_id: &PlayerId,
        conn_id: ConnectionId,
    ) -> LeaveOutcome {
        let mut outcome = LeaveOutcome::default();
        let idle = {
            let mut state = room.lock().await;
            if state.connections.owned_by(player_id, conn_id) != Some(false) {
                state.connections.unregister(player_id);
                outcome.player_removed =
                    state.session.remove_player(player_id).is_some();
            }
            tracing::info!(
                session_id = %room.id(),
                %player_id,
                %conn_id,
                removed = outcome.player_removed,
                players = state.session.player_count(),
                "player left"
            );
            state.is_idle()
        };

        if idle {
            outcome.evicted = self.evict_if_idle(room).await;
        }
        outcome
    }

    /// Removes `room` from the registry if it is still idle, marking it
    /// closed. Returns `true` if it was evicted.
    pub async fn evict_if_idle(&self, room: &Arc<Room>) -> bool {
        let mut rooms = self.rooms.lock().await;
        let mut state = room.lock().await;
        if state.closed || !state.is_idle() {
            return false;
        }
        if rooms.get(room.id()).is_some_and(|r| Arc::ptr_eq(r, room)) {
            rooms.remove(room.id());
        }
        state.closed = true;
        tracing::info!(
            session_id = %room.id(),
            sessions = rooms.len(),
            "session evicted"
        );
        true
    }
}
