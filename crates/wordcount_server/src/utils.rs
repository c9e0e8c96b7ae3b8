//! Shortcuts for building servers.

use crate::config::{GameRules, ServerConfig};
use crate::server::GameServer;
use std::path::PathBuf;

/// Builds a server from a complete configuration.
pub fn create_server_with_config(config: ServerConfig) -> GameServer {
    GameServer::new(config)
}

/// Builds a server with default limits that keeps session storage under
/// `storage_directory`.
///
/// ```rust
/// use wordcount_server::create_server_in;
///
/// let server = create_server_in("/tmp/wordcount");
/// assert_eq!(server.config().rules.min_players, 4);
/// assert!(server.config().picker_seed.is_none());
/// ```
pub fn create_server_in(storage_directory: impl Into<PathBuf>) -> GameServer {
    GameServer::new(ServerConfig {
        storage_directory: storage_directory.into(),
        ..Default::default()
    })
}

/// Builds a server whose picker draws are reproducible across runs.
///
/// ```rust
/// use wordcount_server::{create_seeded_server, GameRules};
///
/// let rules = GameRules { min_players: 2, max_players: 3 };
/// let server = create_seeded_server("/tmp/wordcount", rules, 42);
/// assert_eq!(server.config().picker_seed, Some(42));
/// assert_eq!(server.config().rules, rules);
/// ```
pub fn create_seeded_server(
    storage_directory: impl Into<PathBuf>,
    rules: GameRules,
    seed: u64,
) -> GameServer {
    GameServer::new(ServerConfig {
        storage_directory: storage_directory.into(),
        rules,
        picker_seed: Some(seed),
        ..Default::default()
    })
}
