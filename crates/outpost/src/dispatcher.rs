//! Per-connection dispatcher: handshake, route check, join, frame loop,
//! teardown.
//!
//! Each accepted TCP connection gets its own Tokio task running
//! [`handle_connection`]. The flow is:
//!   1. Complete the WebSocket handshake
//!   2. Parse `/ws/{session_id}/{player_id}` from the upgrade path
//!   3. Join the session (adds the player, registers the connection)
//!   4. Broadcast the initial snapshot
//!   5. Loop: apply inbound intents, forward queued broadcasts to the
//!      socket, ping the peer when it goes quiet
//!   6. Teardown: remove the player, broadcast once without them

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use outpost_protocol::{ClientFrame, Codec, PlayerId, WsRoute};
use outpost_transport::{
    Connection, ConnectionId, Transport, WebSocketIncoming, WebSocketTransport,
};
use tokio::time::Instant;

use crate::OutpostError;
use crate::connections::ConnectionHandle;
use crate::registry::Room;
use crate::server::ServerState;

// ---------------------------------------------------------------------------
// Phase and disconnect reason
// ---------------------------------------------------------------------------

/// Lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Upgraded, not yet part of a session.
    Connecting,
    /// Joined; intents are applied and broadcasts forwarded.
    Active,
    /// Torn down. Terminal.
    Closed,
}

impl ConnectionPhase {
    /// Returns the phase that follows this one, or `None` if terminal.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Connecting => Some(Self::Active),
            Self::Active => Some(Self::Closed),
            Self::Closed => None,
        }
    }

    /// Returns `true` if moving to `target` is valid.
    ///
    /// A connection that never became active may also close directly.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target)
            || (self == Self::Connecting && target == Self::Closed)
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Active => write!(f, "Active"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// Why an active connection was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer closed the socket.
    ClientClosed,
    /// Reading from the socket failed.
    ReceiveFailed,
    /// Writing a queued broadcast to the socket failed.
    SendFailed,
    /// The idle ping could not be sent.
    PingFailed,
    /// The connection was unregistered: a broadcast found its queue full,
    /// or a newer connection took over the same player.
    Dropped,
    /// The connection task ended without running teardown itself.
    Aborted,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ClientClosed => "client closed",
            Self::ReceiveFailed => "receive failed",
            Self::SendFailed => "send failed",
            Self::PingFailed => "ping failed",
            Self::Dropped => "dropped by broadcast",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

/// Removes a player from its room and broadcasts the result.
///
/// Skips the broadcast if the room was evicted, since nobody is left to
/// receive it.
async fn leave_and_broadcast<C: Codec>(
    state: &ServerState<C>,
    room: &Arc<Room>,
    player_id: &PlayerId,
    conn_id: ConnectionId,
    reason: DisconnectReason,
) {
    let outcome = state.registry.leave(room, player_id, conn_id).await;
    tracing::info!(
        session_id = %room.id(),
        %player_id,
        %conn_id,
        %reason,
        evicted = outcome.evicted,
        "connection torn down"
    );
    if outcome.evicted {
        return;
    }
    if let Err(e) = state.broadcaster.broadcast_room(room).await {
        tracing::error!(session_id = %room.id(), error = %e, "leave broadcast failed");
    }
}

/// Runs teardown for an active connection exactly once.
///
/// The normal path calls [`run`](Self::run). If the task unwinds or is
/// cancelled first, `Drop` spawns the same teardown on the current runtime.
struct TeardownGuard<C: Codec> {
    state: Arc<ServerState<C>>,
    room: Arc<Room>,
    player_id: PlayerId,
    conn_id: ConnectionId,
    done: bool,
}

impl<C: Codec> TeardownGuard<C> {
    async fn run(mut self, reason: DisconnectReason) {
        self.done = true;
        leave_and_broadcast(
            &self.state,
            &self.room,
            &self.player_id,
            self.conn_id,
            reason,
        )
        .await;
    }
}

impl<C: Codec> Drop for TeardownGuard<C> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                player_id = %self.player_id,
                conn_id = %self.conn_id,
                "no runtime left to tear down connection"
            );
            return;
        };
        let state = Arc::clone(&self.state);
        let room = Arc::clone(&self.room);
        let player_id = self.player_id.clone();
        let conn_id = self.conn_id;
        runtime.spawn(async move {
            leave_and_broadcast(
                &state,
                &room,
                &player_id,
                conn_id,
                DisconnectReason::Aborted,
            )
            .await;
        });
    }
}

// ---------------------------------------------------------------------------
// Socket writes and timers
// ---------------------------------------------------------------------------

/// Ceiling used when `now + idle_timeout` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// When the next idle ping is due.
fn idle_deadline(now: Instant, idle_timeout: Duration) -> Instant {
    now.checked_add(idle_timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

#[derive(Debug, thiserror::Error)]
enum WriteError<E> {
    #[error("{0}")]
    Failed(E),
    #[error("write timed out after {0:?}")]
    TimedOut(Duration),
}

/// Writes one frame, giving up after `limit`.
async fn write_frame<T: Connection>(
    conn: &T,
    text: &str,
    limit: Duration,
) -> Result<(), WriteError<T::Error>> {
    match tokio::time::timeout(limit, conn.send(text)).await {
        Ok(result) => result.map_err(WriteError::Failed),
        Err(_) => Err(WriteError::TimedOut(limit)),
    }
}

// ---------------------------------------------------------------------------
// Connection handler
// ---------------------------------------------------------------------------

/// Handles a single connection from handshake to close.
///
/// Returns why the connection ended, or an error if it failed the handshake
/// or was rejected before joining a session.
pub(crate) async fn handle_connection<C: Codec>(
    incoming: WebSocketIncoming,
    state: Arc<ServerState<C>>,
) -> Result<DisconnectReason, OutpostError> {
    let peer = incoming.peer_addr();

    // --- Step 1: Handshake ---
    let conn = match WebSocketTransport::upgrade(incoming).await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::debug!(%peer, error = %e, "handshake failed");
            return Err(e.into());
        }
    };
    let conn_id = conn.id();
    tracing::debug!(%conn_id, %peer, path = conn.path(), "handling new connection");

    // --- Step 2: Route ---
    let route = match WsRoute::parse(conn.path(), state.config.max_id_len) {
        Ok(route) => route,
        Err(e) => {
            tracing::warn!(%conn_id, %peer, error = %e, "rejecting connection");
            let _ = tokio::time::timeout(
                state.config.write_timeout,
                conn.reject("invalid route"),
            )
            .await;
            return Err(e.into());
        }
    };

    Ok(run_session(&conn, route, state).await)
}

/// Joins `route`'s session and runs the frame loop until the connection
/// ends, then tears it down.
pub(crate) async fn run_session<T: Connection, C: Codec>(
    conn: &T,
    route: WsRoute,
    state: Arc<ServerState<C>>,
) -> DisconnectReason {
    let conn_id = conn.id();
    let mut phase = ConnectionPhase::Connecting;
    let WsRoute {
        session_id,
        player_id,
    } = route;

    // --- Step 3: Join ---
    let (handle, mut outbound) =
        ConnectionHandle::channel(conn_id, state.config.outbound_capacity);
    let room = state.registry.join(&session_id, &player_id, handle).await;
    let guard = TeardownGuard {
        state: Arc::clone(&state),
        room: Arc::clone(&room),
        player_id: player_id.clone(),
        conn_id,
        done: false,
    };
    advance(&mut phase, ConnectionPhase::Active, conn_id);

    // --- Step 4: Initial snapshot ---
    if let Err(e) = state.broadcaster.broadcast_room(&room).await {
        tracing::error!(%session_id, error = %e, "join broadcast failed");
    }

    // --- Step 5: Frame loop ---
    let idle_timeout = state.config.idle_timeout;
    let write_timeout = state.config.write_timeout;
    let idle = tokio::time::sleep_until(idle_deadline(Instant::now(), idle_timeout));
    tokio::pin!(idle);

    let reason = loop {
        tokio::select! {
            inbound = conn.recv() => match inbound {
                Ok(Some(data)) => {
                    idle.as_mut().reset(idle_deadline(Instant::now(), idle_timeout));
                    apply_frame(&state, &room, &player_id, &data).await;
                }
                Ok(None) => break DisconnectReason::ClientClosed,
                Err(e) => {
                    tracing::debug!(%player_id, %conn_id, error = %e, "recv error");
                    break DisconnectReason::ReceiveFailed;
                }
            },

            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = write_frame(conn, &frame, write_timeout).await {
                        tracing::debug!(%player_id, %conn_id, error = %e, "send error");
                        break DisconnectReason::SendFailed;
                    }
                }
                // Every sender is gone: we were unregistered.
                None => break DisconnectReason::Dropped,
            },

            () = &mut idle => {
                tracing::debug!(%player_id, %conn_id, "idle, sending ping");
                if let Err(e) = write_frame(conn, &state.ping_frame, write_timeout).await {
                    tracing::debug!(%player_id, %conn_id, error = %e, "ping failed");
                    break DisconnectReason::PingFailed;
                }
                idle.as_mut().reset(idle_deadline(Instant::now(), idle_timeout));
            }
        }
    };

    // --- Step 6: Teardown ---
    advance(&mut phase, ConnectionPhase::Closed, conn_id);
    guard.run(reason).await;
    if reason == DisconnectReason::Dropped {
        let _ = tokio::time::timeout(write_timeout, conn.close()).await;
    }

    reason
}

/// Decodes one inbound frame and applies it to the room.
///
/// Undecodable frames are logged and dropped; the connection stays open
/// and nothing is broadcast.
async fn apply_frame<C: Codec>(
    state: &ServerState<C>,
    room: &Room,
    player_id: &PlayerId,
    data: &[u8],
) {
    let frame: ClientFrame = match state.broadcaster.codec().decode(data) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(
                session_id = %room.id(),
                %player_id,
                error = %e,
                "dropping malformed frame"
            );
            return;
        }
    };

    if !frame.triggers_broadcast() {
        match frame {
            ClientFrame::Unknown => {
                tracing::debug!(%player_id, "ignoring unknown frame type");
            }
            _ => tracing::trace!(%player_id, ?frame, "liveness frame"),
        }
        return;
    }

    let mut room_state = room.lock().await;
    match frame {
        ClientFrame::Move { dx, dy } => {
            let moved = room_state.session.move_player(player_id, dx, dy);
            tracing::debug!(%player_id, dx, dy, position = ?moved, "move");
        }
        ClientFrame::Collect { id } => {
            room_state.session.collect(&id, player_id);
        }
        ClientFrame::Ping | ClientFrame::Pong | ClientFrame::Unknown => {}
    }
    if let Err(e) = state.broadcaster.deliver(&mut room_state) {
        tracing::error!(session_id = %room.id(), error = %e, "broadcast failed");
    }
}

fn advance(phase: &mut ConnectionPhase, target: ConnectionPhase, conn_id: ConnectionId) {
    debug_assert!(phase.can_transition_to(target), "{phase} -> {target}");
    tracing::debug!(%conn_id, from = %phase, to = %target, "connection phase");
    *phase = target;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use outpost_protocol::{JsonCodec, SessionId};
    use outpost_transport::TransportError;
    use serde_json::Value;

    use crate::config::ServerConfig;

    const PING: &str = r#"{"type":"ping"}"#;

    /// A connection that replays scripted inbound frames and records what
    /// it is sent.
    struct ScriptedConn {
        id: ConnectionId,
        path: String,
        inbound: Mutex<VecDeque<Vec<u8>>>,
        /// Keep `recv` pending once the script is exhausted instead of
        /// reporting a clean close.
        hold_open: bool,
        /// Fail every ping write, as a peer that has vanished would.
        reject_ping: bool,
        sent: Mutex<Vec<String>>,
    }

    impl ScriptedConn {
        fn new(id: u64, path: &str) -> Self {
            Self {
                id: ConnectionId::new(id),
                path: path.to_owned(),
                inbound: Mutex::new(VecDeque::new()),
                hold_open: false,
                reject_ping: false,
                sent: Mutex::new(Vec::new()),
            }
        }

        fn with_inbound(self, frames: &[&str]) -> Self {
            *self.inbound.lock().unwrap() =
                frames.iter().map(|f| f.as_bytes().to_vec()).collect();
            self
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Connection for ScriptedConn {
        type Error = TransportError;

        async fn send(&self, text: &str) -> Result<(), TransportError> {
            if self.reject_ping && text == PING {
                return Err(TransportError::ConnectionClosed("peer vanished".into()));
            }
            self.sent.lock().unwrap().push(text.to_owned());
            Ok(())
        }

        async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
            let next = self.inbound.lock().unwrap().pop_front();
            match next {
                Some(frame) => Ok(Some(frame)),
                None if self.hold_open => std::future::pending().await,
                None => Ok(None),
            }
        }

        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }

        fn id(&self) -> ConnectionId {
            self.id
        }

        fn path(&self) -> &str {
            &self.path
        }
    }

    fn server_state(idle_timeout: Duration) -> Arc<ServerState<JsonCodec>> {
        let config = ServerConfig {
            idle_timeout,
            ..ServerConfig::default()
        };
        Arc::new(ServerState::new(config, JsonCodec).unwrap())
    }

    fn route(conn: &ScriptedConn) -> WsRoute {
        WsRoute::parse(conn.path(), 64).unwrap()
    }

    // =====================================================================
    // Phase and reason
    // =====================================================================

    #[test]
    fn test_phase_next_follows_strict_order() {
        assert_eq!(
            ConnectionPhase::Connecting.next(),
            Some(ConnectionPhase::Active)
        );
        assert_eq!(ConnectionPhase::Active.next(), Some(ConnectionPhase::Closed));
        assert_eq!(ConnectionPhase::Closed.next(), None);
    }

    #[test]
    fn test_phase_can_transition_to() {
        assert!(ConnectionPhase::Connecting.can_transition_to(ConnectionPhase::Active));
        assert!(ConnectionPhase::Connecting.can_transition_to(ConnectionPhase::Closed));
        assert!(ConnectionPhase::Active.can_transition_to(ConnectionPhase::Closed));
        assert!(!ConnectionPhase::Active.can_transition_to(ConnectionPhase::Connecting));
        assert!(!ConnectionPhase::Closed.can_transition_to(ConnectionPhase::Active));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(ConnectionPhase::Connecting.to_string(), "Connecting");
        assert_eq!(ConnectionPhase::Closed.to_string(), "Closed");
    }

    #[test]
    fn test_disconnect_reason_display() {
        assert_eq!(DisconnectReason::ClientClosed.to_string(), "client closed");
        assert_eq!(DisconnectReason::PingFailed.to_string(), "ping failed");
    }

    // =====================================================================
    // idle_deadline()
    // =====================================================================

    #[test]
    fn test_idle_deadline_adds_timeout() {
        let now = Instant::now();
        assert_eq!(
            idle_deadline(now, Duration::from_secs(30)),
            now + Duration::from_secs(30)
        );
    }

    #[test]
    fn test_idle_deadline_saturates_instead_of_overflowing() {
        let now = Instant::now();
        let deadline = idle_deadline(now, Duration::from_secs(u64::MAX));
        assert!(deadline >= now + Duration::from_secs(60 * 60 * 24 * 365));
    }

    // =====================================================================
    // run_session()
    // =====================================================================

    #[tokio::test]
    async fn test_failed_ping_removes_player_and_broadcasts() {
        let state = server_state(Duration::from_millis(50));
        let (watcher, mut frames) =
            ConnectionHandle::channel(ConnectionId::new(9_000), 16);
        state
            .registry
            .join(&SessionId::from("abc"), &PlayerId::from("p2"), watcher)
            .await;

        let conn = ScriptedConn {
            hold_open: true,
            reject_ping: true,
            ..ScriptedConn::new(9_001, "/ws/abc/p1")
        };
        let reason = tokio::time::timeout(
            Duration::from_secs(2),
            run_session(&conn, route(&conn), Arc::clone(&state)),
        )
        .await
        .expect("ping failure should end the session");

        assert_eq!(reason, DisconnectReason::PingFailed);
        assert_eq!(conn.sent().len(), 1, "only the join snapshot got through");

        let room = state.registry.get(&SessionId::from("abc")).await.unwrap();
        {
            let room_state = room.lock().await;
            assert!(room_state.session.player(&PlayerId::from("p1")).is_none());
            assert!(!room_state.connections.contains(&PlayerId::from("p1")));
        }

        let mut last = None;
        while let Ok(frame) = frames.try_recv() {
            last = Some(frame);
        }
        let last: Value = serde_json::from_str(&last.unwrap()).unwrap();
        assert!(last["players"].get("p1").is_none());
        assert!(last["players"].get("p2").is_some());
    }

    #[tokio::test]
    async fn test_unbounded_idle_timeout_survives_inbound_frames() {
        let state = server_state(Duration::from_secs(u64::MAX));
        let conn = ScriptedConn::new(9_002, "/ws/abc/p1")
            .with_inbound(&[r#"{"type":"move","dx":3,"dy":4}"#]);

        let reason = run_session(&conn, route(&conn), Arc::clone(&state)).await;

        assert_eq!(reason, DisconnectReason::ClientClosed);
        assert!(!conn.sent().is_empty());
        assert!(state.registry.is_empty().await, "last leave evicts");
    }

    #[tokio::test]
    async fn test_replaced_connection_ends_as_dropped() {
        let state = server_state(Duration::from_secs(30));
        let old = ScriptedConn {
            hold_open: true,
            ..ScriptedConn::new(9_003, "/ws/abc/p1")
        };
        let old_session = {
            let state = Arc::clone(&state);
            let route = route(&old);
            async move { run_session(&old, route, state).await }
        };
        let old_task = tokio::spawn(old_session);

        // Let the old connection register before the new one claims p1.
        loop {
            if let Some(room) = state.registry.get(&SessionId::from("abc")).await {
                if room.lock().await.connections.contains(&PlayerId::from("p1")) {
                    break;
                }
            }
            tokio::task::yield_now().await;
        }
        let (newer, _rx) = ConnectionHandle::channel(ConnectionId::new(9_004), 8);
        let room = state
            .registry
            .join(&SessionId::from("abc"), &PlayerId::from("p1"), newer)
            .await;

        let reason = tokio::time::timeout(Duration::from_secs(2), old_task)
            .await
            .expect("replaced connection should end")
            .unwrap();

        assert_eq!(reason, DisconnectReason::Dropped);
        let room_state = room.lock().await;
        assert!(room_state.session.player(&PlayerId::from("p1")).is_some());
        assert_eq!(
            room_state
                .connections
                .owned_by(&PlayerId::from("p1"), ConnectionId::new(9_004)),
            Some(true)
        );
    }
}
