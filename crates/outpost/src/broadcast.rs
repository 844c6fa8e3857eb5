//! Full-state fan-out to every connection of a session.

use std::sync::Arc;

use outpost_protocol::{Codec, PlayerId, ProtocolError, SessionId};
use outpost_transport::ConnectionId;

use crate::connections::OutboundFrame;
use crate::registry::{Room, RoomState, SessionRegistry};

/// Result of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Players whose connection accepted the snapshot.
    pub delivered: Vec<PlayerId>,
    /// Players whose connection failed and was unregistered.
    pub dropped: Vec<PlayerId>,
}

/// Serializes session snapshots and pushes them to registered connections.
pub struct Broadcaster<C: Codec> {
    registry: Arc<SessionRegistry>,
    codec: C,
}

impl<C: Codec> Broadcaster<C> {
    pub fn new(registry: Arc<SessionRegistry>, codec: C) -> Self {
        Self { registry, codec }
    }

    /// Broadcasts the current state of `session_id`.
    ///
    /// Returns `Ok(None)` if no such session is live.
    pub async fn broadcast(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<BroadcastReport>, ProtocolError> {
        match self.registry.get(session_id).await {
            Some(room) => self.broadcast_room(&room).await.map(Some),
            None => Ok(None),
        }
    }

    /// Locks `room` and broadcasts its current state.
    pub async fn broadcast_room(
        &self,
        room: &Room,
    ) -> Result<BroadcastReport, ProtocolError> {
        let mut state = room.lock().await;
        self.deliver(&mut state)
    }

    /// Broadcasts from an already-locked room.
    ///
    /// The snapshot is serialized once and every recipient gets the same
    /// text. Delivery never waits: a connection whose queue is full or
    /// closed is unregistered and the remaining recipients still get the
    /// frame. The player entry of a dropped connection stays; its own task
    /// removes it during teardown.
    pub fn deliver(
        &self,
        state: &mut RoomState,
    ) -> Result<BroadcastReport, ProtocolError> {
        let frame: OutboundFrame =
            self.codec.encode(&state.session.snapshot())?.into();

        let mut report = BroadcastReport::default();
        let mut failed: Vec<(PlayerId, ConnectionId)> = Vec::new();

        for (player_id, handle) in state.connections.iter() {
            match handle.deliver(&frame) {
                Ok(()) => report.delivered.push(player_id.clone()),
                Err(e) => {
                    tracing::warn!(
                        session_id = %state.session.id(),
                        %player_id,
                        conn_id = %handle.id(),
                        error = %e,
                        "dropping connection after failed send"
                    );
                    failed.push((player_id.clone(), handle.id()));
                }
            }
        }

        for (player_id, conn_id) in failed {
            state.connections.unregister_connection(&player_id, conn_id);
            report.dropped.push(player_id);
        }

        tracing::debug!(
            session_id = %state.session.id(),
            delivered = report.delivered.len(),
            dropped = report.dropped.len(),
            bytes = frame.len(),
            "broadcast"
        );
        Ok(report)
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }
}
