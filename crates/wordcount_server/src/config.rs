//! Server configuration types and defaults.
//!
//! This module contains the server configuration structure and default values
//! used to initialize and customize the word-count server.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration structure for the word-count server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Root directory holding one storage scope per session
    pub storage_directory: PathBuf,

    /// Maximum number of concurrent connections allowed
    pub max_connections: usize,

    /// Capacity of the Directory's and every Session's command mailbox
    pub mailbox_capacity: usize,

    /// Maximum length of a protocol line and of an uploaded file, in bytes
    pub max_message_size: usize,

    /// How long a Session waits for an uploader to finish writing its file
    pub upload_ack_timeout_ms: u64,

    /// How long shutdown waits for sessions and connections to wind down
    pub shutdown_timeout_ms: u64,

    /// Player-count rules shared by every session
    pub rules: GameRules,

    /// Seed for picker selection; `None` seeds from entropy
    pub picker_seed: Option<u64>,
}

/// Player-count thresholds that drive the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRules {
    /// Sessions with fewer active players are WAITING
    pub min_players: usize,

    /// Sessions with at least this many active players are FULL
    pub max_players: usize,
}

impl ServerConfig {
    pub fn upload_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_ack_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 9999)),
            storage_directory: PathBuf::from("serverStorage"),
            max_connections: 1000,
            mailbox_capacity: 64,
            max_message_size: 1024 * 1024, // 1MB
            upload_ack_timeout_ms: 10_000,
            shutdown_timeout_ms: 5_000,
            rules: GameRules::default(),
            picker_seed: None,
        }
    }
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            min_players: 4,
            max_players: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_classic_game() {
        let config = ServerConfig::default();
        assert_eq!(config.rules.min_players, 4);
        assert_eq!(config.rules.max_players, 8);
        assert_eq!(config.bind_address.port(), 9999);
        assert_eq!(config.upload_ack_timeout(), Duration::from_secs(10));
        assert!(config.picker_seed.is_none());
    }
}
