//! `OutpostServer` builder and accept loop.
//!
//! This is the entry point for running an Outpost server. It ties together
//! the layers: transport → protocol → session registry → dispatcher.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use outpost_protocol::{Codec, JsonCodec, ServerFrame};
use outpost_session::SessionConfig;
use outpost_transport::{Transport, WebSocketTransport};

use crate::OutpostError;
use crate::broadcast::Broadcaster;
use crate::config::ServerConfig;
use crate::dispatcher::handle_connection;
use crate::registry::SessionRegistry;

/// Shared server state passed to each connection task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) config: ServerConfig,
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) broadcaster: Broadcaster<C>,
    /// The encoded ping, sent verbatim on every idle timeout.
    pub(crate) ping_frame: String,
}

impl<C: Codec> ServerState<C> {
    pub(crate) fn new(config: ServerConfig, codec: C) -> Result<Self, OutpostError> {
        let ping_frame = codec.encode(&ServerFrame::Ping)?;
        let registry = Arc::new(SessionRegistry::new(config.session.clone()));
        Ok(Self {
            broadcaster: Broadcaster::new(Arc::clone(&registry), codec),
            registry,
            ping_frame,
            config,
        })
    }
}

/// Builder for configuring and starting an Outpost server.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use outpost::prelude::*;
///
/// # async fn run() -> Result<(), OutpostError> {
/// let server = OutpostServer::builder()
///     .bind("0.0.0.0:8000")
///     .idle_timeout(Duration::from_secs(30))
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct OutpostServerBuilder {
    config: ServerConfig,
}

impl OutpostServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets how long a connection may stay silent before it is pinged.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Sets how long a single socket write may take.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Sets the capacity of each connection's outbound queue.
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.config.outbound_capacity = capacity;
        self
    }

    /// Sets the maximum session and player id length.
    pub fn max_id_len(mut self, len: usize) -> Self {
        self.config.max_id_len = len;
        self
    }

    /// Sets the configuration applied to new sessions.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config.session = config;
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds the listener and builds a server speaking JSON.
    pub async fn build(self) -> Result<OutpostServer<JsonCodec>, OutpostError> {
        self.build_with_codec(JsonCodec).await
    }

    /// Binds the listener and builds a server using `codec`.
    pub async fn build_with_codec<C: Codec>(
        self,
        codec: C,
    ) -> Result<OutpostServer<C>, OutpostError> {
        let config = self.config;
        config.validate()?;

        let transport = WebSocketTransport::bind(&config.bind_addr).await?;
        let state = Arc::new(ServerState::new(config, codec)?);

        Ok(OutpostServer { transport, state })
    }
}

/// A bound Outpost server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting connections.
pub struct OutpostServer<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl OutpostServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> OutpostServerBuilder {
        OutpostServerBuilder::new()
    }
}

impl<C: Codec> OutpostServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// The registry holding every live session.
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.state.registry)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), OutpostError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `signal` completes.
    ///
    /// The loop only takes TCP connections off the listener. The WebSocket
    /// handshake runs on each connection's own task, so a client that
    /// stalls mid-handshake never delays anyone else's join.
    ///
    /// Connections that are already open keep running on their own tasks;
    /// only new connections stop being accepted.
    pub async fn run_until<F>(mut self, signal: F) -> Result<(), OutpostError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            addr = %self.state.config.bind_addr,
            idle_timeout = ?self.state.config.idle_timeout,
            write_timeout = ?self.state.config.write_timeout,
            "Outpost server running"
        );
        tokio::pin!(signal);

        loop {
            tokio::select! {
                () = &mut signal => {
                    tracing::info!("shutdown signal received, no longer accepting");
                    break;
                }
                accepted = self.transport.accept() => match accepted {
                    Ok(incoming) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            match handle_connection(incoming, state).await {
                                Ok(reason) => {
                                    tracing::debug!(%reason, "connection ended");
                                }
                                Err(e) => {
                                    tracing::debug!(
                                        error = %e,
                                        "connection ended with error"
                                    );
                                }
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        self.transport.shutdown().await?;
        Ok(())
    }
}
