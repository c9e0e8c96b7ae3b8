//! Client connections.
//!
//! Each accepted socket is served by a Connection actor that reads protocol
//! frames, forwards them to the Directory and to Sessions, and renders the
//! notifications pushed into its player's mailbox.

mod actor;
pub mod client;
pub mod manager;
pub mod protocol;
pub mod response;

pub(crate) use actor::{ConnectionActor, ConnectionContext};
pub use manager::ConnectionManager;
pub use protocol::{Command, CommandReader, Frame, ProtocolError, Verb};
pub use response::ServerMessage;

/// Type alias for connection identifiers.
///
/// Connection IDs label a client connection in logs and in the
/// [`ConnectionManager`] for as long as the socket is open.
pub type ConnectionId = usize;
