//! Core game server implementation.
//!
//! This module contains the main `GameServer` struct: it prepares storage,
//! spawns the Directory, accepts connections and coordinates the graceful
//! shutdown of every session.

use crate::{
    config::ServerConfig,
    connection::{ConnectionContext, ConnectionManager, ServerMessage},
    directory::{spawn_directory, DirectoryHandle},
    error::ServerError,
    server::{handlers::handle_connection, shutdown::ShutdownState},
};
use futures::future::join_all;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// The word-count game server.
///
/// `GameServer` owns the network side of the process. Game state lives in
/// the Directory and Session actors it spawns at startup.
///
/// # Lifecycle
///
/// * **Startup**: the storage root is created and the Directory spawned
///   before the first connection is accepted.
/// * **Serving**: one task per accepted connection; connections over
///   `max_connections` are told the server is full and closed.
/// * **Shutdown**: the accept loop stops, every session is told to exit and
///   awaited, then the Directory stops.
pub struct GameServer {
    /// Server configuration settings
    config: ServerConfig,

    /// Registry of open sockets
    connection_manager: Arc<ConnectionManager>,

    /// Shutdown switch used by [`start`](Self::start) and
    /// [`start_with_listener`](Self::start_with_listener)
    shutdown_state: ShutdownState,

    /// Address the listener is bound to, once serving
    local_addr: OnceLock<SocketAddr>,
}

impl GameServer {
    /// Creates a new game server with the specified configuration.
    pub fn new(config: ServerConfig) -> Self {
        let connection_manager = Arc::new(ConnectionManager::new(config.max_connections));
        Self {
            config,
            connection_manager,
            shutdown_state: ShutdownState::new(),
            local_addr: OnceLock::new(),
        }
    }

    /// Binds the configured address and serves until [`shutdown`](Self::shutdown).
    pub async fn start(&self) -> Result<(), ServerError> {
        self.start_with_shutdown_state(self.shutdown_state.clone())
            .await
    }

    /// Binds the configured address and serves until `shutdown_state` is
    /// initiated.
    pub async fn start_with_shutdown_state(
        &self,
        shutdown_state: ShutdownState,
    ) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| {
                ServerError::Network(format!("Failed to bind {}: {e}", self.config.bind_address))
            })?;
        self.serve(listener, shutdown_state).await
    }

    /// Serves on an already bound listener until [`shutdown`](Self::shutdown).
    pub async fn start_with_listener(&self, listener: TcpListener) -> Result<(), ServerError> {
        self.serve(listener, self.shutdown_state.clone()).await
    }

    /// Initiates graceful shutdown of a server started with its own state.
    pub fn shutdown(&self) {
        self.shutdown_state.initiate_shutdown();
    }

    /// The bound address, once the server is serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn connection_manager(&self) -> Arc<ConnectionManager> {
        self.connection_manager.clone()
    }

    async fn serve(
        &self,
        listener: TcpListener,
        shutdown_state: ShutdownState,
    ) -> Result<(), ServerError> {
        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::Network(format!("Listener has no local address: {e}")))?;
        let _ = self.local_addr.set(addr);

        tokio::fs::create_dir_all(&self.config.storage_directory)
            .await
            .map_err(|e| {
                ServerError::Storage(format!(
                    "Cannot create storage root {}: {e}",
                    self.config.storage_directory.display()
                ))
            })?;

        let directory = spawn_directory(&self.config);
        let (connection_shutdown, _) = broadcast::channel(1);
        let mut connections = JoinSet::new();
        let mut shutdown_signal = shutdown_state.subscribe();

        info!("🚀 Word count server listening on {}", addr);
        info!(
            "🎲 Sessions need {} to {} players, storage in {}",
            self.config.rules.min_players,
            self.config.rules.max_players,
            self.config.storage_directory.display()
        );

        while !shutdown_state.is_shutdown_initiated() {
            tokio::select! {
                _ = shutdown_signal.recv() => break,
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        self.accept(stream, remote, &directory, &connection_shutdown, &mut connections)
                            .await;
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
            }
        }

        drop(listener);
        let outcome = self
            .wind_down(directory, connection_shutdown, connections)
            .await;
        shutdown_state.complete_shutdown();
        info!("Server stopped");
        outcome
    }

    async fn accept(
        &self,
        mut stream: TcpStream,
        remote: SocketAddr,
        directory: &DirectoryHandle,
        connection_shutdown: &broadcast::Sender<()>,
        connections: &mut JoinSet<()>,
    ) {
        let Some(connection_id) = self.connection_manager.add_connection(remote).await else {
            warn!("🚫 Rejecting {}: server is full", remote);
            tokio::spawn(async move {
                let line = format!("{}\n", ServerMessage::ServerFull);
                let _ = stream.write_all(line.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
            return;
        };

        let context = ConnectionContext {
            directory: directory.clone(),
            manager: self.connection_manager.clone(),
            shutdown: connection_shutdown.subscribe(),
            shutdown_timeout: self.config.shutdown_timeout(),
        };
        let max_message_size = self.config.max_message_size;
        connections.spawn(async move {
            if let Err(e) =
                handle_connection(stream, remote, connection_id, context, max_message_size).await
            {
                error!("Connection error: {:?}", e);
            }
        });
    }

    /// Terminates every session and waits for connections to render the exit.
    ///
    /// Cleanup always runs to the end; a Directory that stopped answering is
    /// reported afterwards as [`ServerError::Internal`].
    async fn wind_down(
        &self,
        directory: DirectoryHandle,
        connection_shutdown: broadcast::Sender<()>,
        mut connections: JoinSet<()>,
    ) -> Result<(), ServerError> {
        let mut failure = None;
        info!("🧹 Performing server cleanup...");
        let timeout = self.config.shutdown_timeout();

        // Connections stop reading commands before sessions go away.
        let _ = connection_shutdown.send(());

        let exits = match directory.shutdown().await {
            Ok(exits) => exits,
            Err(e) => {
                error!("📇 Directory unavailable during shutdown: {}", e);
                failure = Some(ServerError::Internal(format!(
                    "directory unavailable during shutdown: {e}"
                )));
                Vec::new()
            }
        };
        info!("🛑 Terminating {} session(s)", exits.len());

        let confirmations = join_all(exits.into_iter().map(|exit| async move {
            let tag = exit.tag().to_string();
            (tag, exit.trigger(timeout).await)
        }))
        .await;
        for (tag, confirmed) in confirmations {
            if confirmed {
                debug!("✅ Session {} exited", tag);
            } else {
                warn!("⏰ Session {} did not confirm its exit", tag);
            }
        }

        if let Err(e) = directory.stop().await {
            warn!("📇 Directory did not stop cleanly: {}", e);
            failure.get_or_insert(ServerError::Internal(format!(
                "directory did not stop cleanly: {e}"
            )));
        }

        let drained = tokio::time::timeout(timeout, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                "⏰ {} connection(s) still open after {:?}, closing them",
                connections.len(),
                timeout
            );
            connections.abort_all();
        }
        info!("✅ Server cleanup completed");
        failure.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_in(root: &tempfile::TempDir) -> GameServer {
        GameServer::new(ServerConfig {
            storage_directory: root.path().to_path_buf(),
            shutdown_timeout_ms: 200,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn wind_down_reports_a_dead_directory_as_internal() {
        let root = tempfile::tempdir().unwrap();
        let server = server_in(&root);
        let directory = spawn_directory(server.config());
        directory.stop().await.unwrap();

        let (connection_shutdown, _) = broadcast::channel(1);
        let outcome = server
            .wind_down(directory, connection_shutdown, JoinSet::new())
            .await;
        assert!(matches!(outcome, Err(ServerError::Internal(_))));
    }

    #[tokio::test]
    async fn wind_down_with_a_live_directory_succeeds() {
        let root = tempfile::tempdir().unwrap();
        let server = server_in(&root);
        let directory = spawn_directory(server.config());

        let (connection_shutdown, _) = broadcast::channel(1);
        let outcome = server
            .wind_down(directory, connection_shutdown, JoinSet::new())
            .await;
        assert!(outcome.is_ok());
    }
}
