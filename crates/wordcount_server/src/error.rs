//! Error types and handling for the word-count server.
//!
//! Errors are grouped by the layer that detects them:
//!
//! * [`ServerError`] - process-level failures (binding, storage root).
//! * [`DirectoryError`] - failures reported by the Directory actor.
//! * [`SessionError`] - authorization, state and not-found errors reported
//!   by a Session actor. Every variant is terminal only for the single
//!   operation that produced it.

use crate::mailbox::MailboxError;
use crate::session::SessionState;

/// Enumeration of possible server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Network-related errors such as binding failures
    #[error("Network error: {0}")]
    Network(String),

    /// The storage root could not be prepared
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal errors, typically an actor that terminated unexpectedly
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors reported by the Directory actor.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// Another live connection currently holds this player identity.
    #[error("player {name} is already connected")]
    PlayerInUse { name: String },

    /// The storage scope for a new session could not be created.
    #[error("cannot create storage for session {tag}: {source}")]
    Storage {
        tag: String,
        #[source]
        source: std::io::Error,
    },

    /// The server is shutting down and no longer creates sessions.
    #[error("server is shutting down")]
    ShuttingDown,

    /// The Directory actor is no longer running.
    #[error("directory unavailable: {0}")]
    Unavailable(#[from] MailboxError),
}

/// Errors reported by a Session actor for a single command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    // Authorization errors carry the authorized party's name.
    #[error("only the leader ({leader}) may do this")]
    NotLeader { leader: String },

    #[error("only the picker may choose the word")]
    NotPicker { picker: Option<String> },

    #[error("player is not active in this session")]
    NotMember,

    // State errors.
    #[error("player already joined")]
    AlreadyJoined,

    #[error("session is {state} and cannot be joined")]
    NotJoinable { state: SessionState },

    #[error("session already started")]
    AlreadyStarted,

    #[error("not enough players, {missing} more needed")]
    NotEnoughPlayers { missing: usize },

    #[error("file {filename} already exists")]
    FileExists { filename: String },

    #[error("no player is available to pick a word")]
    NoPickerCandidates,

    #[error("no file has been uploaded")]
    NoFileUploaded { leader: String },

    #[error("word {word} is not a valid choice")]
    InvalidWord { word: String },

    #[error("a word has already been selected for this round")]
    WordAlreadySelected,

    #[error("guessing is not open")]
    GuessingClosed,

    #[error("player is not disconnected from this session")]
    NotDisconnected,

    /// The session's storage scope could not be read or written.
    #[error("session storage unavailable: {0}")]
    Storage(String),

    /// The session actor has terminated.
    #[error("session unavailable: {0}")]
    Unavailable(#[from] MailboxError),
}
