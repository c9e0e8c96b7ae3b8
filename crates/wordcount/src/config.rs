//! Configuration management for the word-count server.
//!
//! This module handles loading, validation, and conversion of server configuration
//! from TOML files and command-line arguments.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use wordcount_server::{GameRules, ServerConfig};

fn default_max_connections() -> usize {
    1000
}

fn default_max_message_size() -> usize {
    1024 * 1024
}

fn default_mailbox_capacity() -> usize {
    64
}

fn default_upload_ack_timeout_ms() -> u64 {
    10_000
}

fn default_shutdown_timeout_ms() -> u64 {
    5_000
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Network, storage and limit settings
    pub server: ServerSettings,
    /// Player-count rules and picker seed
    #[serde(default)]
    pub game: GameSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:9999")
    pub bind_address: String,
    /// Root directory for per-session file storage
    pub storage_directory: String,
    /// Maximum number of concurrent client connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Maximum length of a command line or uploaded file, in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Capacity of every actor command mailbox
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
    /// How long a session waits for an upload to be written, in milliseconds
    #[serde(default = "default_upload_ack_timeout_ms")]
    pub upload_ack_timeout_ms: u64,
    /// How long shutdown waits for sessions and connections, in milliseconds
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

/// Game rules shared by every session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSettings {
    /// Players needed before a session can start
    pub min_players: usize,
    /// Players at which a session stops accepting joins
    pub max_players: usize,
    /// Fixed seed for picker selection (random when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picker_seed: Option<u64>,
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for GameSettings {
    fn default() -> Self {
        let rules = GameRules::default();
        Self {
            min_players: rules.min_players,
            max_players: rules.max_players,
            picker_seed: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind_address: "127.0.0.1:9999".to_string(),
                storage_directory: "serverStorage".to_string(),
                max_connections: default_max_connections(),
                max_message_size: default_max_message_size(),
                mailbox_capacity: default_mailbox_capacity(),
                upload_ack_timeout_ms: default_upload_ack_timeout_ms(),
                shutdown_timeout_ms: default_shutdown_timeout_ms(),
            },
            game: GameSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, a default configuration file is written at
    /// the specified path and the defaults are returned.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts the application configuration to the server library's
    /// configuration.
    pub fn to_server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        Ok(ServerConfig {
            bind_address: self.server.bind_address.parse()?,
            storage_directory: PathBuf::from(&self.server.storage_directory),
            max_connections: self.server.max_connections,
            mailbox_capacity: self.server.mailbox_capacity,
            max_message_size: self.server.max_message_size,
            upload_ack_timeout_ms: self.server.upload_ack_timeout_ms,
            shutdown_timeout_ms: self.server.shutdown_timeout_ms,
            rules: GameRules {
                min_players: self.game.min_players,
                max_players: self.game.max_players,
            },
            picker_seed: self.game.picker_seed,
        })
    }

    /// Validates the configuration.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "Invalid bind address: {}",
                &self.server.bind_address
            ));
        }

        if self.server.storage_directory.is_empty() {
            return Err("Storage directory cannot be empty".to_string());
        }

        if self.server.max_connections == 0 {
            return Err("server.max_connections must be greater than 0".to_string());
        }
        if self.server.max_message_size == 0 {
            return Err("server.max_message_size must be greater than 0".to_string());
        }
        if self.server.mailbox_capacity == 0 {
            return Err("server.mailbox_capacity must be greater than 0".to_string());
        }

        if self.game.min_players < 2 {
            return Err("game.min_players must be at least 2".to_string());
        }
        if self.game.min_players > self.game.max_players {
            return Err(format!(
                "game.min_players ({}) cannot exceed game.max_players ({})",
                self.game.min_players, self.game.max_players
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.server.bind_address, "127.0.0.1:9999");
        assert_eq!(config.server.storage_directory, "serverStorage");
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.server.max_message_size, 1024 * 1024);
        assert_eq!(config.game.min_players, 4);
        assert_eq!(config.game.max_players, 8);
        assert!(config.game.picker_seed.is_none());
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:9999");
        assert!(path.exists());

        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.game.min_players, config.game.min_players);
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[server]
bind_address = "0.0.0.0:4000"
storage_directory = "/tmp/games"
max_connections = 50

[game]
min_players = 2
max_players = 3
picker_seed = 99

[logging]
level = "debug"
json_format = true
"#;
        let file = NamedTempFile::new().unwrap();
        tokio::fs::write(file.path(), toml_content).await.unwrap();

        let config = AppConfig::load_from_file(file.path()).await.unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:4000");
        assert_eq!(config.server.max_connections, 50);
        // Omitted limits fall back to their defaults.
        assert_eq!(config.server.max_message_size, 1024 * 1024);
        assert_eq!(config.server.shutdown_timeout_ms, 5_000);
        assert_eq!(config.game.min_players, 2);
        assert_eq!(config.game.picker_seed, Some(99));
        assert!(config.logging.json_format);
    }

    #[test]
    fn test_missing_game_table_uses_classic_rules() {
        let config: AppConfig = toml::from_str(
            r#"
[server]
bind_address = "127.0.0.1:9999"
storage_directory = "serverStorage"

[logging]
level = "info"
json_format = false
"#,
        )
        .unwrap();
        assert_eq!(config.game.min_players, 4);
        assert_eq!(config.game.max_players, 8);
    }

    #[test]
    fn test_to_server_config_conversion() {
        let mut config = AppConfig::default();
        config.server.storage_directory = "games".to_string();
        config.game.min_players = 2;
        config.game.max_players = 5;
        config.game.picker_seed = Some(11);

        let server_config = config.to_server_config().unwrap();
        assert_eq!(server_config.bind_address.port(), 9999);
        assert_eq!(server_config.storage_directory, PathBuf::from("games"));
        assert_eq!(server_config.rules.min_players, 2);
        assert_eq!(server_config.rules.max_players, 5);
        assert_eq!(server_config.picker_seed, Some(11));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.server.bind_address = "invalid".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.game.min_players = 1;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.game.min_players = 6;
        config.game.max_players = 5;
        assert!(config.validate().unwrap_err().contains("cannot exceed"));

        let mut config = AppConfig::default();
        config.server.storage_directory.clear();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.server.max_message_size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_accepts_every_log_level() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            let mut config = AppConfig::default();
            config.logging.level = level.to_string();
            assert!(config.validate().is_ok(), "level {level} rejected");
        }
    }
}
