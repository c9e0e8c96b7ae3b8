//! # Word Count Server
//!
//! A TCP server hosting concurrent multiplayer word-count games. Players
//! connect with a line-based text protocol, create or join named game
//! sessions, and compete to guess how often a chosen word occurs in a text
//! file uploaded by the session leader.
//!
//! ## Architecture Overview
//!
//! The server is a small set of actors. Each owns its state exclusively and
//! talks to the others only through mailboxes:
//!
//! * **Directory** - registry of player identities and sessions. It checks
//!   identities out to connections and parks them while their player is
//!   offline, so a returning player resumes their games.
//! * **Session** - one per game. Holds the roster, the leader, the word table
//!   of the uploaded file and the current round, and runs the
//!   WAITING / READY / FULL / RUNNING state machine.
//! * **Connection** - one per socket. Parses commands, forwards them to the
//!   Directory or a Session, and renders the notifications pushed into its
//!   player's mailbox.
//!
//! ### Message Flow
//!
//! 1. The client sends a command line (`HELLO alice`, `NEW_GAME G1`, ...)
//! 2. The Connection parses it and sends a request to the addressed actor
//! 3. The actor replies on a one-shot slot, which the Connection renders
//! 4. Broadcasts (game started, word selected, winner, ...) arrive in the
//!    player's mailbox and are written out in emission order
//!
//! ## Configuration
//!
//! The server is configured through [`ServerConfig`]: bind address, storage
//! root, connection and message limits, player-count rules, and an optional
//! seed for picker selection.
//!
//! ## Error Handling
//!
//! Errors are typed per layer ([`ServerError`], [`DirectoryError`],
//! [`SessionError`]). A refused command is reported to its sender and
//! leaves every actor's state unchanged.

// Re-export core types and functions for easy access
pub use config::{GameRules, ServerConfig};
pub use error::{DirectoryError, ServerError, SessionError};
pub use server::{GameServer, ShutdownState};
pub use utils::{create_seeded_server, create_server_in, create_server_with_config};

// Public module declarations
pub mod config;
pub mod connection;
pub mod directory;
pub mod error;
pub mod mailbox;
pub mod server;
pub mod session;
pub mod utils;

#[cfg(test)]
mod tests;
