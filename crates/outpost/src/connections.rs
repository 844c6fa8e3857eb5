//! Live connection handles and the per-session connection table.
//!
//! A [`ConnectionHandle`] is the sending end of one connection's bounded
//! outbound queue. The connection's own task drains the queue onto the
//! socket, so delivering a frame never waits on a peer: it either lands in
//! the queue immediately or fails.
//!
//! # Concurrency note
//!
//! [`ConnectionManager`] is a plain `HashMap` and is not thread-safe by
//! itself. Each session owns one, guarded by the session's mutex together
//! with the world state, so enumeration for a broadcast and registration
//! from another connection's task are serialized by the same lock.

use std::collections::HashMap;
use std::sync::Arc;

use outpost_protocol::PlayerId;
use outpost_transport::ConnectionId;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// One serialized frame, shared between every recipient of a broadcast.
pub type OutboundFrame = Arc<str>;

/// Why a frame could not be handed to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The connection is not draining its queue fast enough.
    #[error("outbound queue full")]
    QueueFull,

    /// The connection's task has gone away.
    #[error("connection gone")]
    Closed,
}

/// Handle used to push frames to one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<OutboundFrame>,
}

impl ConnectionHandle {
    /// Creates a handle with a queue of `capacity` frames, returning the
    /// receiving end for the connection task to drain.
    ///
    /// # Panics
    /// Panics if `capacity` is 0.
    pub fn channel(
        id: ConnectionId,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { id, tx }, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues a frame without waiting.
    pub fn deliver(&self, frame: &OutboundFrame) -> Result<(), DeliveryError> {
        self.tx.try_send(Arc::clone(frame)).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::QueueFull,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// The live connections of one session, keyed by player.
///
/// A player has at most one registered connection. Registering a second
/// one replaces the first.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    connections: HashMap<PlayerId, ConnectionHandle>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` for `player_id`, returning the handle it
    /// replaced, if any.
    ///
    /// Dropping the returned handle closes the replaced connection's queue,
    /// which ends that connection's task.
    pub fn register(
        &mut self,
        player_id: PlayerId,
        handle: ConnectionHandle,
    ) -> Option<ConnectionHandle> {
        self.connections.insert(player_id, handle)
    }

    /// Removes whatever connection is registered for `player_id`.
    pub fn unregister(&mut self, player_id: &PlayerId) -> Option<ConnectionHandle> {
        self.connections.remove(player_id)
    }

    /// Removes the registration for `player_id` only if it belongs to
    /// connection `id`. Returns `true` if something was removed.
    pub fn unregister_connection(
        &mut self,
        player_id: &PlayerId,
        id: ConnectionId,
    ) -> bool {
        if self.owned_by(player_id, id) == Some(true) {
            self.connections.remove(player_id);
            return true;
        }
        false
    }

    /// `Some(true)` if `player_id` is registered to connection `id`,
    /// `Some(false)` if it is registered to another connection, `None` if
    /// it is not registered.
    pub fn owned_by(&self, player_id: &PlayerId, id: ConnectionId) -> Option<bool> {
        self.connections.get(player_id).map(|h| h.id() == id)
    }

    pub fn get(&self, player_id: &PlayerId) -> Option<&ConnectionHandle> {
        self.connections.get(player_id)
    }

    pub fn contains(&self, player_id: &PlayerId) -> bool {
        self.connections.contains_key(player_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PlayerId, &ConnectionHandle)> {
        self.connections.iter()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(id: &str) -> PlayerId {
        PlayerId::from(id)
    }

    fn handle(id: u64) -> (ConnectionHandle, mpsc::Receiver<OutboundFrame>) {
        ConnectionHandle::channel(ConnectionId::new(id), 4)
    }

    #[test]
    fn test_register_and_unregister() {
        let mut mgr = ConnectionManager::new();
        let (h, _rx) = handle(1);

        assert!(mgr.register(pid("p1"), h).is_none());
        assert!(mgr.contains(&pid("p1")));
        assert_eq!(mgr.len(), 1);

        let removed = mgr.unregister(&pid("p1")).unwrap();
        assert_eq!(removed.id(), ConnectionId::new(1));
        assert!(mgr.is_empty());
    }

    #[tokio::test]
    async fn test_register_replaces_previous_connection() {
        let mut mgr = ConnectionManager::new();
        let (first, mut rx1) = handle(1);
        let (second, _rx2) = handle(2);

        assert!(mgr.register(pid("p1"), first).is_none());
        let replaced = mgr.register(pid("p1"), second).unwrap();

        assert_eq!(replaced.id(), ConnectionId::new(1));
        assert_eq!(mgr.get(&pid("p1")).unwrap().id(), ConnectionId::new(2));
        assert_eq!(mgr.len(), 1);

        // Dropping the replaced handle closes the old queue.
        drop(replaced);
        assert!(rx1.recv().await.is_none());
    }

    #[test]
    fn test_unregister_missing_is_none() {
        let mut mgr = ConnectionManager::new();
        assert!(mgr.unregister(&pid("ghost")).is_none());
    }

    #[test]
    fn test_unregister_connection_ignores_other_owner() {
        let mut mgr = ConnectionManager::new();
        let (h, _rx) = handle(1);
        assert!(mgr.register(pid("p1"), h).is_none());

        assert!(!mgr.unregister_connection(&pid("p1"), ConnectionId::new(9)));
        assert!(mgr.contains(&pid("p1")));

        assert!(mgr.unregister_connection(&pid("p1"), ConnectionId::new(1)));
        assert!(!mgr.contains(&pid("p1")));
    }

    #[test]
    fn test_owned_by() {
        let mut mgr = ConnectionManager::new();
        let (h, _rx) = handle(1);
        assert!(mgr.register(pid("p1"), h).is_none());

        assert_eq!(mgr.owned_by(&pid("p1"), ConnectionId::new(1)), Some(true));
        assert_eq!(mgr.owned_by(&pid("p1"), ConnectionId::new(2)), Some(false));
        assert_eq!(mgr.owned_by(&pid("p2"), ConnectionId::new(1)), None);
    }

    #[test]
    fn test_deliver_queues_frame() {
        let (h, mut rx) = handle(1);
        let frame: OutboundFrame = Arc::from("hello");

        h.deliver(&frame).unwrap();

        assert_eq!(rx.try_recv().unwrap().as_ref(), "hello");
    }

    #[test]
    fn test_deliver_full_queue_fails_without_waiting() {
        let (h, _rx) = ConnectionHandle::channel(ConnectionId::new(1), 1);
        let frame: OutboundFrame = Arc::from("x");

        h.deliver(&frame).unwrap();
        assert_eq!(h.deliver(&frame), Err(DeliveryError::QueueFull));
    }

    #[test]
    fn test_deliver_to_dropped_receiver_fails() {
        let (h, rx) = handle(1);
        drop(rx);

        assert_eq!(h.deliver(&Arc::from("x")), Err(DeliveryError::Closed));
    }
}
