//! Main application logic and lifecycle management.
//!
//! The `Application` owns the merged configuration and the server, runs the
//! server until a termination signal arrives, and drives graceful shutdown.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{setup_signal_handlers, wait_for_signal},
};
use std::time::Duration;
use tracing::{error, info, warn};
use wordcount_server::{GameServer, ShutdownState};

/// Grace period on top of the configured shutdown timeout before the server
/// task is abandoned.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Main application struct.
///
/// # Process
///
/// 1. Load configuration from file (creating default if missing)
/// 2. Apply command-line argument overrides
/// 3. Validate merged configuration
/// 4. Initialize the server
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// Word-count server instance
    server: GameServer,
}

impl Application {
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;
        apply_overrides(&mut config, args);

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        let server = GameServer::new(config.to_server_config()?);
        Ok(Self { config, server })
    }

    /// Runs the server until a termination signal, then shuts down
    /// gracefully. A second signal exits immediately.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        self.log_configuration_summary();

        let shutdown_state = ShutdownState::new();
        let shutdown_budget =
            Duration::from_millis(self.config.server.shutdown_timeout_ms) * 2 + SHUTDOWN_GRACE;

        let mut server_handle = {
            let server = self.server;
            let shutdown_state = shutdown_state.clone();
            tokio::spawn(async move { server.start_with_shutdown_state(shutdown_state).await })
        };

        info!("✅ Word Count Server is now running!");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        tokio::select! {
            signal = setup_signal_handlers(&shutdown_state) => signal?,
            outcome = &mut server_handle => {
                // The server stopped on its own, which only happens on error.
                return match outcome {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => {
                        error!("❌ Server error: {}", e);
                        Err(e.into())
                    }
                    Err(e) => Err(e.into()),
                };
            }
        }

        // merciless shutdown
        tokio::spawn(async move {
            if let Err(e) = wait_for_signal().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }
            warn!("Shutdown signal received again! Exiting immediately.");
            std::process::exit(1);
        });

        info!("⏳ Waiting for sessions to end...");
        match tokio::time::timeout(shutdown_budget, server_handle).await {
            Ok(Ok(Ok(()))) => info!("✅ Server task completed gracefully"),
            Ok(Ok(Err(e))) => {
                error!("❌ Server error during shutdown: {}", e);
                return Err(e.into());
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => warn!("⏰ Server task did not complete within {:?}", shutdown_budget),
        }

        if shutdown_state.is_shutdown_complete() {
            info!("✅ Word Count Server shutdown complete");
        }
        Ok(())
    }

    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!("  💾 Storage: {}", self.config.server.storage_directory);
        info!(
            "  👥 Max connections: {}",
            self.config.server.max_connections
        );
        info!(
            "  🎲 Players per game: {}-{}",
            self.config.game.min_players, self.config.game.max_players
        );
        if let Some(seed) = self.config.game.picker_seed {
            info!("  🎯 Picker seed: {}", seed);
        }
    }
}

/// Applies command-line overrides on top of the file configuration.
pub(crate) fn apply_overrides(config: &mut AppConfig, args: CliArgs) {
    if let Some(bind_address) = args.bind_address {
        config.server.bind_address = bind_address;
    }
    if let Some(storage) = args.storage_directory {
        config.server.storage_directory = storage.to_string_lossy().into_owned();
    }
    if let Some(log_level) = args.log_level {
        config.logging.level = log_level;
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    if let Some(seed) = args.seed {
        config.game.picker_seed = Some(seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args() -> CliArgs {
        CliArgs {
            config_path: PathBuf::from("config.toml"),
            bind_address: None,
            storage_directory: None,
            log_level: None,
            json_logs: false,
            seed: None,
        }
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config = AppConfig::default();
        apply_overrides(
            &mut config,
            CliArgs {
                bind_address: Some("0.0.0.0:7000".into()),
                storage_directory: Some(PathBuf::from("/srv/games")),
                log_level: Some("warn".into()),
                json_logs: true,
                seed: Some(5),
                ..args()
            },
        );
        assert_eq!(config.server.bind_address, "0.0.0.0:7000");
        assert_eq!(config.server.storage_directory, "/srv/games");
        assert_eq!(config.logging.level, "warn");
        assert!(config.logging.json_format);
        assert_eq!(config.game.picker_seed, Some(5));
    }

    #[test]
    fn absent_overrides_keep_file_values() {
        let mut config = AppConfig::default();
        config.game.picker_seed = Some(3);
        apply_overrides(&mut config, args());
        assert_eq!(config.server.bind_address, "127.0.0.1:9999");
        assert_eq!(config.game.picker_seed, Some(3));
        assert!(!config.logging.json_format);
    }

    #[tokio::test]
    async fn application_rejects_invalid_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let result = Application::new(CliArgs {
            config_path: dir.path().join("config.toml"),
            bind_address: Some("not-an-address".into()),
            ..args()
        })
        .await;
        assert!(result.is_err());
        assert!(dir.path().join("config.toml").exists());
    }
}
