//! Command-line interface handling for the word-count server.
//!
//! Arguments are parsed with `clap` and override values from the
//! configuration file.

use clap::{value_parser, Arg, ArgMatches, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for bind address
    pub bind_address: Option<String>,
    /// Optional override for the storage root
    pub storage_directory: Option<PathBuf>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Optional fixed seed for picker selection
    pub seed: Option<u64>,
}

fn command() -> Command {
    Command::new("Word Count Server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Multiplayer word-count guessing game over TCP")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .value_name("ADDRESS")
                .help("Bind address (e.g., 127.0.0.1:9999)"),
        )
        .arg(
            Arg::new("storage")
                .short('s')
                .long("storage")
                .value_name("DIR")
                .help("Root directory for uploaded files"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("SEED")
                .help("Fixed seed for picker selection, for reproducible games")
                .value_parser(value_parser!(u64)),
        )
}

impl CliArgs {
    /// Parses the process arguments, exiting with usage on error.
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    /// Parses an explicit argument list.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_matches(&command().try_get_matches_from(args)?))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config.toml")),
            bind_address: matches.get_one::<String>("bind").cloned(),
            storage_directory: matches.get_one::<String>("storage").map(PathBuf::from),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            seed: matches.get_one::<u64>("seed").copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_flags() {
        let args = CliArgs::try_parse_from(["wordcount"]).unwrap();
        assert_eq!(args.config_path, PathBuf::from("config.toml"));
        assert!(args.bind_address.is_none());
        assert!(args.storage_directory.is_none());
        assert!(!args.json_logs);
        assert!(args.seed.is_none());
    }

    #[test]
    fn every_override_is_parsed() {
        let args = CliArgs::try_parse_from([
            "wordcount",
            "--config",
            "game.toml",
            "--bind",
            "0.0.0.0:7000",
            "--storage",
            "/srv/games",
            "--log-level",
            "debug",
            "--json-logs",
            "--seed",
            "42",
        ])
        .unwrap();
        assert_eq!(args.config_path, PathBuf::from("game.toml"));
        assert_eq!(args.bind_address.as_deref(), Some("0.0.0.0:7000"));
        assert_eq!(args.storage_directory, Some(PathBuf::from("/srv/games")));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
        assert_eq!(args.seed, Some(42));
    }

    #[test]
    fn seed_must_be_numeric() {
        assert!(CliArgs::try_parse_from(["wordcount", "--seed", "many"]).is_err());
    }
}
