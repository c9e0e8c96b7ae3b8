//! Cloneable handle to a Session actor and the records it accepts.

use super::SessionState;
use crate::error::SessionError;
use crate::mailbox::{request, MailboxError, PlayerAddress, ReplyTo};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

type Reply<T> = ReplyTo<Result<T, SessionError>>;

/// Commands accepted by a Session actor, one per protocol operation.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    Join { player: PlayerAddress, reply: Reply<SessionView> },
    Start { name: String, reply: Reply<()> },
    Upload { name: String, filename: String, reply: Reply<UploadTicket> },
    RandomWord { name: String, word: String, reply: Reply<()> },
    WordCount { name: String, guess: i64, reply: Reply<()> },
    Disconnect { name: String },
    Reconnect { name: String, reply: Reply<SessionView> },
    Restart { name: String, reply: Reply<()> },
    Close { name: String, reply: Reply<()> },
    Goodbye { name: String, reply: Reply<()> },
}

/// Snapshot returned on join and reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub state: SessionState,
    pub leader: String,
}

/// Permission to write an uploaded file, granted by the session's leader
/// check. The session is blocked until [`UploadTicket::complete`] is called
/// or the ticket is dropped.
#[derive(Debug)]
pub struct UploadTicket {
    path: PathBuf,
    ack: oneshot::Sender<Result<(), String>>,
}

impl UploadTicket {
    pub(crate) fn new(path: PathBuf) -> (Self, oneshot::Receiver<Result<(), String>>) {
        let (ack, completion) = oneshot::channel();
        (Self { path, ack }, completion)
    }

    /// Where the uploader must write the file bytes.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Reports the outcome of the write back to the session.
    pub fn complete(self, outcome: Result<(), String>) {
        if self.ack.send(outcome).is_err() {
            trace!("📭 Session stopped waiting for upload of {}", self.path.display());
        }
    }
}

/// Signal asking a Session to terminate during process shutdown.
#[derive(Debug)]
pub(crate) struct ExitRequest {
    pub confirm: oneshot::Sender<()>,
}

/// One-shot exit switch for a single Session, held by the Directory until
/// shutdown hands it to the shutdown initiator.
#[derive(Debug)]
pub struct SessionExit {
    tag: String,
    signal: oneshot::Sender<ExitRequest>,
}

impl SessionExit {
    pub(crate) fn new(tag: String, signal: oneshot::Sender<ExitRequest>) -> Self {
        Self { tag, signal }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Signals the session and waits up to `timeout` for its confirmation.
    /// Returns `false` if the session was already gone or did not confirm.
    pub async fn trigger(self, timeout: Duration) -> bool {
        let (confirm, confirmed) = oneshot::channel();
        if self.signal.send(ExitRequest { confirm }).is_err() {
            return false;
        }
        matches!(tokio::time::timeout(timeout, confirmed).await, Ok(Ok(())))
    }
}

/// Address of a Session actor. Cheap to clone; every Connection that knows
/// the session holds one.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tag: String,
    mailbox: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub(crate) fn new(tag: String, mailbox: mpsc::Sender<SessionCommand>) -> Self {
        Self { tag, mailbox }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// True once the session actor has terminated.
    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        request(&self.mailbox, build).await?
    }

    pub async fn join(&self, player: PlayerAddress) -> Result<SessionView, SessionError> {
        self.call(|reply| SessionCommand::Join { player, reply }).await
    }

    pub async fn start(&self, name: &str) -> Result<(), SessionError> {
        let name = name.to_string();
        self.call(|reply| SessionCommand::Start { name, reply }).await
    }

    pub async fn upload(&self, name: &str, filename: &str) -> Result<UploadTicket, SessionError> {
        let name = name.to_string();
        let filename = filename.to_string();
        self.call(|reply| SessionCommand::Upload { name, filename, reply })
            .await
    }

    pub async fn random_word(&self, name: &str, word: &str) -> Result<(), SessionError> {
        let name = name.to_string();
        let word = word.to_string();
        self.call(|reply| SessionCommand::RandomWord { name, word, reply })
            .await
    }

    pub async fn word_count(&self, name: &str, guess: i64) -> Result<(), SessionError> {
        let name = name.to_string();
        self.call(|reply| SessionCommand::WordCount { name, guess, reply })
            .await
    }

    /// Fire-and-forget: the player's connection went away.
    pub async fn disconnect(&self, name: &str) -> Result<(), MailboxError> {
        self.mailbox
            .send(SessionCommand::Disconnect {
                name: name.to_string(),
            })
            .await
            .map_err(|_| MailboxError::Closed)
    }

    pub async fn reconnect(&self, name: &str) -> Result<SessionView, SessionError> {
        let name = name.to_string();
        self.call(|reply| SessionCommand::Reconnect { name, reply }).await
    }

    pub async fn restart(&self, name: &str) -> Result<(), SessionError> {
        let name = name.to_string();
        self.call(|reply| SessionCommand::Restart { name, reply }).await
    }

    pub async fn close(&self, name: &str) -> Result<(), SessionError> {
        let name = name.to_string();
        self.call(|reply| SessionCommand::Close { name, reply }).await
    }

    pub async fn goodbye(&self, name: &str) -> Result<(), SessionError> {
        let name = name.to_string();
        self.call(|reply| SessionCommand::Goodbye { name, reply }).await
    }
}
