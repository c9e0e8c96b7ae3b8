//! Mailbox plumbing shared by every actor in the server.
//!
//! All cross-actor communication goes through the types in this module:
//!
//! * **Command mailboxes** are bounded `mpsc` queues owned by the Directory and
//!   by each Session. A command that expects an answer carries its own
//!   [`ReplyTo`] slot, so the caller blocks on exactly one reply.
//! * **Player mailboxes** are unbounded queues of [`Notification`] records.
//!   Sessions push into them and never wait, which keeps a Session from ever
//!   blocking on a Connection.
//!
//! Every queue is FIFO, so replies and broadcasts reach a recipient in the
//! order the sending actor produced them.

use tokio::sync::{mpsc, oneshot};
use tracing::trace;

/// One-shot slot used to answer a single request.
pub type ReplyTo<T> = oneshot::Sender<T>;

/// Errors produced when talking to another actor's mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MailboxError {
    /// The receiving actor has terminated.
    #[error("mailbox closed")]
    Closed,

    /// The receiving actor dropped the request without answering.
    #[error("request dropped without a reply")]
    NoReply,
}

/// Sends a command built around a fresh reply slot and waits for the answer.
pub(crate) async fn request<C, R>(
    mailbox: &mpsc::Sender<C>,
    build: impl FnOnce(ReplyTo<R>) -> C,
) -> Result<R, MailboxError> {
    let (reply, response) = oneshot::channel();
    mailbox
        .send(build(reply))
        .await
        .map_err(|_| MailboxError::Closed)?;
    response.await.map_err(|_| MailboxError::NoReply)
}

/// Answers a request, ignoring callers that stopped waiting.
pub(crate) fn respond<T>(reply: ReplyTo<T>, value: T) {
    if reply.send(value).is_err() {
        trace!("📭 Requester went away before the reply was delivered");
    }
}

/// Asynchronous notification pushed by a Session into a player's mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The session reached the minimum number of players (leader only).
    Ready { tag: String },
    /// The leader started the session.
    Started { tag: String, leader: String },
    /// The leader uploaded a file and someone else picks the word.
    Uploaded { tag: String },
    /// The recipient has been chosen to pick a word from `filename`.
    Pick { tag: String, filename: String },
    /// The picker chose the target word; guessing is open.
    WordSelected { tag: String, word: String },
    /// Every active player guessed; `winner` had the closest guess.
    Winner { tag: String, winner: String },
    /// Leadership moved to `leader`.
    NewLeader { tag: String, leader: String },
    /// The leader restarted the session.
    Restarted { tag: String },
    /// The session was closed by its leader.
    Closed { tag: String },
    /// The server is shutting down and the session has terminated.
    Exit { tag: String },
    /// The uploaded file could not be read back from storage (leader only).
    UploadFailed { tag: String, filename: String },
}

impl Notification {
    /// Tag of the session that emitted this notification.
    pub fn tag(&self) -> &str {
        match self {
            Notification::Ready { tag }
            | Notification::Started { tag, .. }
            | Notification::Uploaded { tag }
            | Notification::Pick { tag, .. }
            | Notification::WordSelected { tag, .. }
            | Notification::Winner { tag, .. }
            | Notification::NewLeader { tag, .. }
            | Notification::Restarted { tag }
            | Notification::Closed { tag }
            | Notification::Exit { tag }
            | Notification::UploadFailed { tag, .. } => tag,
        }
    }
}

/// A player's owned mailbox: the receiving end plus the address handed out
/// to sessions.
#[derive(Debug)]
pub struct Mailbox {
    address: mpsc::UnboundedSender<Notification>,
    inbox: mpsc::UnboundedReceiver<Notification>,
}

impl Mailbox {
    pub fn new() -> Self {
        let (address, inbox) = mpsc::unbounded_channel();
        Self { address, inbox }
    }

    /// Waits for the next notification.
    ///
    /// Never returns `None` while the mailbox is alive, since it keeps its
    /// own sending half.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.inbox.recv().await
    }

    /// Takes a notification if one is already queued.
    pub fn try_recv(&mut self) -> Option<Notification> {
        self.inbox.try_recv().ok()
    }

    fn sender(&self) -> mpsc::UnboundedSender<Notification> {
        self.address.clone()
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Address of a player as seen by sessions: the name plus a sending handle
/// into the player's mailbox.
#[derive(Debug, Clone)]
pub struct PlayerAddress {
    name: String,
    mailbox: mpsc::UnboundedSender<Notification>,
}

impl PlayerAddress {
    pub fn new(name: impl Into<String>, mailbox: &Mailbox) -> Self {
        Self {
            name: name.into(),
            mailbox: mailbox.sender(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pushes a notification without waiting. Returns `false` when the
    /// owning player is gone for good.
    pub fn deliver(&self, notification: Notification) -> bool {
        match self.mailbox.send(notification) {
            Ok(()) => true,
            Err(err) => {
                trace!(
                    "📭 Dropped {:?} for departed player {}",
                    err.0,
                    self.name
                );
                false
            }
        }
    }
}
