//! Subscriber setup for the `tracing` output of the server.
//!
//! `RUST_LOG` takes precedence over the configured level.

use crate::config::LoggingSettings;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output flavour of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Plain,
    Json,
}

impl LogFormat {
    /// `--json-logs` wins over a plain configuration.
    pub fn select(settings: &LoggingSettings, json_flag: bool) -> Self {
        if json_flag || settings.json_format {
            LogFormat::Json
        } else {
            LogFormat::Plain
        }
    }
}

/// Builds the level filter, preferring `RUST_LOG` when it is set.
pub fn level_filter(settings: &LoggingSettings) -> Result<EnvFilter, Box<dyn std::error::Error>> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(&settings.level)?),
    }
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn setup_logging(
    settings: &LoggingSettings,
    json_flag: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let format = LogFormat::select(settings, json_flag);
    let registry = tracing_subscriber::registry().with(level_filter(settings)?);

    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_thread_ids(true),
            )
            .try_init()?,
        LogFormat::Plain => registry
            .with(fmt::layer().with_target(false).with_thread_ids(true))
            .try_init()?,
    }

    info!("🔧 Logging ready ({:?}, level {})", format, settings.level);
    Ok(())
}

/// Logs the startup banner.
pub fn display_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("┌────────────────────────────────────────┐");
    info!("│  🔤 Word Count Server v{:<16}│", version);
    info!("│  Guess how often the word appears.     │");
    info!("└────────────────────────────────────────┘");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(level: &str, json_format: bool) -> LoggingSettings {
        LoggingSettings {
            level: level.to_string(),
            json_format,
        }
    }

    #[test]
    fn json_flag_overrides_plain_settings() {
        assert_eq!(LogFormat::select(&settings("info", false), false), LogFormat::Plain);
        assert_eq!(LogFormat::select(&settings("info", false), true), LogFormat::Json);
        assert_eq!(LogFormat::select(&settings("info", true), false), LogFormat::Json);
    }

    #[test]
    fn configured_level_builds_a_filter() {
        assert!(level_filter(&settings("wordcount_server=debug,warn", false)).is_ok());
    }
}
