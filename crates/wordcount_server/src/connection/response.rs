//! Outbound protocol messages.
//!
//! Every line the server writes to a client is a [`ServerMessage`]. The
//! `Display` implementation renders the text without the trailing newline,
//! which the connection appends when writing.

use super::protocol::{ProtocolError, Verb};
use crate::error::{DirectoryError, SessionError};
use crate::session::SessionState;
use std::fmt;

/// Leader-only operations, named in authorization failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderAction {
    Start,
    Upload,
    Restart,
    Close,
}

impl LeaderAction {
    fn describe(self) -> &'static str {
        match self {
            LeaderAction::Start => "start the game",
            LeaderAction::Upload => "upload the file",
            LeaderAction::Restart => "restart the game",
            LeaderAction::Close => "close the game",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    // Session lifecycle.
    Welcome { name: String },
    Resumed { name: String, tag: String, state: SessionState },
    GameCreated { tag: String },
    GameJoined { tag: String, state: SessionState },
    GameReady { tag: String },
    StartedLeader { tag: String },
    StartedMember { tag: String, leader: String },

    // Upload lifecycle.
    UploadedWaiting { tag: String },
    UploadedPick { tag: String, filename: String },
    UploadFailed { tag: String, filename: String },

    // Round lifecycle.
    WordSelected { tag: String, word: String },
    Winner { tag: String },
    Loser { tag: String, winner: String },
    RestartOrClose { tag: String },

    // Membership lifecycle.
    NewLeaderSelf { tag: String },
    NewLeaderOther { tag: String, leader: String },
    Restarted { tag: String },
    Closed { tag: String },
    SessionEnded { tag: String },
    Bye,

    // Protocol errors.
    NoHello,
    InvalidArguments { verb: Verb },
    InvalidCommand,
    InvalidName,
    LineTooLong { limit: usize },
    PayloadTooLarge { limit: usize },

    // Directory errors.
    PlayerInUse { name: String },
    GameExists { tag: String },
    GameNotFound { tag: String },
    ServerFull,
    ShuttingDown,

    // Session errors.
    JoinRefused { tag: String },
    AlreadyJoined { tag: String },
    NotMember { tag: String },
    AlreadyStarted { tag: String },
    NotLeader { action: LeaderAction, leader: String },
    NotEnoughPlayers { tag: String, missing: usize },
    FileExists { tag: String, filename: String },
    NoPickerCandidates { tag: String },
    NotPicker { picker: Option<String> },
    NoFile { leader: String },
    InvalidWord { word: String },
    WordAlreadySelected { tag: String },
    GuessingClosed { tag: String },
    StorageFailure { tag: String },
}

impl ServerMessage {
    /// Renders a session's refusal of a command on `tag`.
    pub fn session_error(tag: &str, action: Option<LeaderAction>, err: SessionError) -> Self {
        let tag = tag.to_string();
        match err {
            SessionError::NotLeader { leader } => match action {
                Some(action) => ServerMessage::NotLeader { action, leader },
                None => ServerMessage::InvalidCommand,
            },
            SessionError::NotPicker { picker } => ServerMessage::NotPicker { picker },
            SessionError::NotMember => ServerMessage::NotMember { tag },
            SessionError::AlreadyJoined => ServerMessage::AlreadyJoined { tag },
            SessionError::NotJoinable { .. } => ServerMessage::JoinRefused { tag },
            SessionError::AlreadyStarted => ServerMessage::AlreadyStarted { tag },
            SessionError::NotEnoughPlayers { missing } => {
                ServerMessage::NotEnoughPlayers { tag, missing }
            }
            SessionError::FileExists { filename } => ServerMessage::FileExists { tag, filename },
            SessionError::NoPickerCandidates => ServerMessage::NoPickerCandidates { tag },
            SessionError::NoFileUploaded { leader } => ServerMessage::NoFile { leader },
            SessionError::InvalidWord { word } => ServerMessage::InvalidWord { word },
            SessionError::WordAlreadySelected => ServerMessage::WordAlreadySelected { tag },
            SessionError::GuessingClosed => ServerMessage::GuessingClosed { tag },
            SessionError::NotDisconnected => ServerMessage::InvalidCommand,
            SessionError::Storage(_) => ServerMessage::StorageFailure { tag },
            SessionError::Unavailable(_) => ServerMessage::GameNotFound { tag },
        }
    }

    /// Renders a Directory failure while resolving `tag`.
    pub fn directory_error(tag: &str, err: &DirectoryError) -> Self {
        match err {
            DirectoryError::PlayerInUse { name } => ServerMessage::PlayerInUse { name: name.clone() },
            DirectoryError::Storage { .. } => ServerMessage::StorageFailure {
                tag: tag.to_string(),
            },
            DirectoryError::ShuttingDown | DirectoryError::Unavailable(_) => {
                ServerMessage::ShuttingDown
            }
        }
    }

    /// Renders a protocol error, given whether the client has said HELLO.
    pub fn protocol_error(err: &ProtocolError, greeted: bool) -> Self {
        match err {
            ProtocolError::LineTooLong { limit } => ServerMessage::LineTooLong { limit: *limit },
            ProtocolError::PayloadTooLarge { limit, .. } if greeted => {
                ServerMessage::PayloadTooLarge { limit: *limit }
            }
            ProtocolError::InvalidName => ServerMessage::InvalidName,
            ProtocolError::InvalidArguments { verb: Verb::Hello } => {
                ServerMessage::InvalidArguments { verb: Verb::Hello }
            }
            _ if !greeted => ServerMessage::NoHello,
            ProtocolError::InvalidArguments { verb } => ServerMessage::InvalidArguments { verb: *verb },
            _ => ServerMessage::InvalidCommand,
        }
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Welcome { name } => write!(
                f,
                "Welcome to Word Count {name}! Do you want to create a new game or join an existing game?"
            ),
            ServerMessage::Resumed { name, tag, state } => write!(
                f,
                "Welcome to Word Count {name}! Resumed Game {tag}. Current state is {state}."
            ),
            ServerMessage::GameCreated { tag } => write!(
                f,
                "Game {tag} created! You are the leader of the game. Waiting for players to join."
            ),
            ServerMessage::GameJoined { tag, state } => {
                write!(f, "Joined Game {tag}. Current state is {state}.")
            }
            ServerMessage::GameReady { tag } => write!(f, "Game {tag} is ready to start."),
            ServerMessage::StartedLeader { tag } => {
                write!(f, "Game {tag} is running. Please upload the file.")
            }
            ServerMessage::StartedMember { tag, leader } => write!(
                f,
                "Game {tag} has started. Waiting for {leader} to upload the file."
            ),
            ServerMessage::UploadedWaiting { tag } => {
                write!(f, "Upload completed for game {tag}! Waiting for word selection.")
            }
            ServerMessage::UploadedPick { tag, filename } => write!(
                f,
                "Upload completed for game {tag}! Please select a word from {filename}."
            ),
            ServerMessage::UploadFailed { tag, filename } => {
                write!(f, "Upload failed! File {filename} could not be stored for game {tag}.")
            }
            ServerMessage::WordSelected { tag, word } => {
                write!(f, "Word selected for game {tag} is {word}! Guess the word count.")
            }
            ServerMessage::Winner { tag } => {
                write!(f, "Congratulations you are the winner of game {tag}!")
            }
            ServerMessage::Loser { tag, winner } => write!(
                f,
                "Sorry you lose game {tag}, {winner} won! Better luck next time."
            ),
            ServerMessage::RestartOrClose { tag } => write!(
                f,
                "Game {tag} complete. Do you want to restart or close the game?"
            ),
            ServerMessage::NewLeaderSelf { tag } => {
                write!(f, "You are the new leader for game {tag}!")
            }
            ServerMessage::NewLeaderOther { tag, leader } => {
                write!(f, "{leader} is the new leader for game {tag}.")
            }
            ServerMessage::Restarted { tag } => write!(f, "New game started for {tag}!"),
            ServerMessage::Closed { tag } => write!(f, "Game {tag} was closed. Bye!"),
            ServerMessage::SessionEnded { tag } => {
                write!(f, "Server is shutting down, game {tag} has ended.")
            }
            ServerMessage::Bye => f.write_str("Bye!"),
            ServerMessage::NoHello => f.write_str("New player must always start with HELLO!"),
            ServerMessage::InvalidArguments { verb } => {
                write!(f, "Invalid arguments for command {verb}.")
            }
            ServerMessage::InvalidCommand => f.write_str("Error! Please send a valid command."),
            ServerMessage::InvalidName => f.write_str("Invalid user name. Try again."),
            ServerMessage::LineTooLong { limit } => {
                write!(f, "Error! Commands are limited to {limit} bytes.")
            }
            ServerMessage::PayloadTooLarge { limit } => {
                write!(f, "Upload failed! Files are limited to {limit} bytes.")
            }
            ServerMessage::PlayerInUse { name } => write!(
                f,
                "Player {name} is already connected. Choose another name or try again later."
            ),
            ServerMessage::GameExists { tag } => write!(
                f,
                "Game {tag} already exists, please provide a new game tag."
            ),
            ServerMessage::GameNotFound { tag } => write!(
                f,
                "Game {tag} doesn't exist! Please enter correct tag or create a new game."
            ),
            ServerMessage::ServerFull => f.write_str("Server is full. Connect back later."),
            ServerMessage::ShuttingDown => f.write_str("Server is shutting down."),
            ServerMessage::JoinRefused { tag } => write!(
                f,
                "Game {tag} is full or already in progress. Connect back later."
            ),
            ServerMessage::AlreadyJoined { tag } => {
                write!(f, "You have already joined game {tag}.")
            }
            ServerMessage::NotMember { tag } => write!(f, "You are not playing in game {tag}."),
            ServerMessage::AlreadyStarted { tag } => write!(
                f,
                "Game {tag} has already started! Please create a new game."
            ),
            ServerMessage::NotLeader { action, leader } => write!(
                f,
                "Only the leader can {}. Please contact {leader}.",
                action.describe()
            ),
            ServerMessage::NotEnoughPlayers { tag, missing } => write!(
                f,
                "Can't start the game {tag}, waiting for {missing} more players."
            ),
            ServerMessage::FileExists { tag, filename } => write!(
                f,
                "Upload failed! File {filename} already exists for game {tag}."
            ),
            ServerMessage::NoPickerCandidates { tag } => write!(
                f,
                "Upload failed! Game {tag} has no other player to pick a word."
            ),
            ServerMessage::NotPicker { picker: Some(picker) } => write!(
                f,
                "Only the picker can pick the word. Please contact {picker}."
            ),
            ServerMessage::NotPicker { picker: None } => {
                f.write_str("No picker has been chosen yet. Wait for the next upload.")
            }
            ServerMessage::NoFile { leader } => {
                write!(f, "No file uploaded. Please contact {leader}.")
            }
            ServerMessage::InvalidWord { word } => {
                write!(f, "Word {word} is not a valid choice, choose another word.")
            }
            ServerMessage::WordAlreadySelected { tag } => write!(
                f,
                "A word has already been selected for game {tag}."
            ),
            ServerMessage::GuessingClosed { tag } => {
                write!(f, "No word has been selected yet for game {tag}. Wait!")
            }
            ServerMessage::StorageFailure { tag } => write!(
                f,
                "Storage for game {tag} is unavailable. Please try again later."
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carries_the_fields_clients_rely_on() {
        let started = ServerMessage::StartedMember {
            tag: "G1".into(),
            leader: "alice".into(),
        };
        assert_eq!(
            started.to_string(),
            "Game G1 has started. Waiting for alice to upload the file."
        );

        let shortfall = ServerMessage::session_error(
            "G1",
            Some(LeaderAction::Start),
            SessionError::NotEnoughPlayers { missing: 3 },
        );
        assert!(shortfall.to_string().contains("3 more players"));

        let resumed = ServerMessage::Resumed {
            name: "bob".into(),
            tag: "G1".into(),
            state: SessionState::Full,
        };
        assert!(resumed.to_string().ends_with("Current state is FULL."));
    }

    #[test]
    fn authorization_failures_name_the_authorized_player() {
        let message = ServerMessage::session_error(
            "G1",
            Some(LeaderAction::Close),
            SessionError::NotLeader {
                leader: "carol".into(),
            },
        );
        assert_eq!(
            message.to_string(),
            "Only the leader can close the game. Please contact carol."
        );
    }

    #[test]
    fn protocol_errors_before_hello_ask_for_hello() {
        let unknown = ProtocolError::UnknownCommand { verb: "X".into() };
        assert_eq!(ServerMessage::protocol_error(&unknown, false), ServerMessage::NoHello);
        assert_eq!(
            ServerMessage::protocol_error(&unknown, true),
            ServerMessage::InvalidCommand
        );

        let bad_join = ProtocolError::InvalidArguments {
            verb: Verb::JoinGame,
        };
        assert_eq!(ServerMessage::protocol_error(&bad_join, false), ServerMessage::NoHello);
        assert_eq!(
            ServerMessage::protocol_error(&bad_join, true).to_string(),
            "Invalid arguments for command JOIN_GAME."
        );

        let bad_hello = ProtocolError::InvalidArguments { verb: Verb::Hello };
        assert_eq!(
            ServerMessage::protocol_error(&bad_hello, false),
            ServerMessage::InvalidArguments { verb: Verb::Hello }
        );
    }
}
