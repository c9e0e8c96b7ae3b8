//! Registry of open client connections.
//!
//! The manager only tracks sockets: who is connected from where, and how
//! many connections are open. Game state never lives here; it belongs to the
//! Directory and Session actors.

use super::{client::ClientConnection, ConnectionId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug)]
pub struct ConnectionManager {
    connections: RwLock<HashMap<ConnectionId, ClientConnection>>,
    next_id: AtomicUsize,
    max_connections: usize,
}

impl ConnectionManager {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
            max_connections,
        }
    }

    /// Registers a new connection, or returns `None` when the server is at
    /// capacity.
    pub async fn add_connection(&self, remote_addr: SocketAddr) -> Option<ConnectionId> {
        let mut connections = self.connections.write().await;
        if connections.len() >= self.max_connections {
            return None;
        }
        let connection_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        connections.insert(connection_id, ClientConnection::new(remote_addr));
        info!("🔗 Connection {} from {}", connection_id, remote_addr);
        Some(connection_id)
    }

    pub async fn remove_connection(&self, connection_id: ConnectionId) {
        let mut connections = self.connections.write().await;
        if let Some(connection) = connections.remove(&connection_id) {
            info!(
                "❌ Connection {} from {} ({}) closed after {:?}",
                connection_id,
                connection.remote_addr,
                connection.player_name.as_deref().unwrap_or("anonymous"),
                connection.age()
            );
        }
    }

    pub async fn set_player_name(&self, connection_id: ConnectionId, name: &str) {
        let mut connections = self.connections.write().await;
        if let Some(connection) = connections.get_mut(&connection_id) {
            connection.player_name = Some(name.to_string());
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enforces_capacity_and_frees_slots() {
        let manager = ConnectionManager::new(2);
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();

        let first = manager.add_connection(addr).await.unwrap();
        let second = manager.add_connection(addr).await.unwrap();
        assert_ne!(first, second);
        assert!(manager.add_connection(addr).await.is_none());

        manager.set_player_name(first, "alice").await;
        manager.set_player_name(99, "ghost").await;

        manager.remove_connection(first).await;
        assert_eq!(manager.connection_count().await, 1);
        assert!(manager.add_connection(addr).await.is_some());
    }
}
