//! The Connection actor.
//!
//! A connection goes through three phases:
//!
//! 1. **Handshake**: every frame other than a valid `HELLO` is refused until
//!    the Directory hands over the player's identity.
//! 2. **Serving**: socket frames and mailbox notifications are multiplexed
//!    into one loop. A command blocks the loop until the addressed actor
//!    replies, so replies reach the client in command order.
//! 3. **Ending**: on a dropped socket every joined session hears a DISCONN
//!    and the identity is parked; on GOODBYE the identity is released; on
//!    process shutdown the actor waits for each session's exit notice.

use super::manager::ConnectionManager;
use super::protocol::{Command, Frame};
use super::response::{LeaderAction, ServerMessage};
use super::ConnectionId;
use crate::directory::{DirectoryHandle, PlayerIdentity};
use crate::error::{DirectoryError, SessionError};
use crate::mailbox::Notification;
use crate::session::{SessionHandle, UploadTicket};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, trace, warn};

/// Shared collaborators handed to every connection.
#[derive(Debug)]
pub(crate) struct ConnectionContext {
    pub directory: DirectoryHandle,
    pub manager: Arc<ConnectionManager>,
    pub shutdown: broadcast::Receiver<()>,
    pub shutdown_timeout: Duration,
}

enum Input {
    Shutdown,
    Notification(Option<Notification>),
    Frame(Option<Frame>),
}

enum Ending {
    /// The socket closed without GOODBYE.
    Disconnected,
    /// The player said GOODBYE.
    Farewell,
    /// The process is shutting down.
    Shutdown,
}

pub(crate) struct ConnectionActor<W> {
    id: ConnectionId,
    writer: W,
    frames: mpsc::Receiver<Frame>,
    context: ConnectionContext,
    /// Last known leader per joined session.
    leaders: HashMap<String, String>,
}

impl<W: AsyncWrite + Unpin> ConnectionActor<W> {
    pub fn new(
        id: ConnectionId,
        writer: W,
        frames: mpsc::Receiver<Frame>,
        context: ConnectionContext,
    ) -> Self {
        Self {
            id,
            writer,
            frames,
            context,
            leaders: HashMap::new(),
        }
    }

    pub async fn run(mut self) {
        let mut identity = match self.handshake().await {
            Ok(Some(identity)) => identity,
            Ok(None) => return,
            Err(err) => {
                debug!("🔌 Connection {} lost during handshake: {}", self.id, err);
                return;
            }
        };
        self.context
            .manager
            .set_player_name(self.id, identity.name())
            .await;
        info!("👤 Connection {} is player {}", self.id, identity.name());

        let ending = match self.resume(&mut identity).await {
            Ok(true) => match self.serve(&mut identity).await {
                Ok(ending) => ending,
                Err(err) => {
                    debug!("🔌 Connection {} write failed: {}", self.id, err);
                    Ending::Disconnected
                }
            },
            Ok(false) => {
                self.park(identity).await;
                return;
            }
            Err(err) => {
                debug!("🔌 Connection {} write failed: {}", self.id, err);
                Ending::Disconnected
            }
        };
        self.finish(identity, ending).await;
    }

    async fn send(&mut self, message: ServerMessage) -> io::Result<()> {
        trace!("📤 Connection {}: {}", self.id, message);
        let mut line = message.to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await
    }

    async fn handshake(&mut self) -> io::Result<Option<PlayerIdentity>> {
        loop {
            let input = tokio::select! {
                biased;
                _ = self.context.shutdown.recv() => Input::Shutdown,
                frame = self.frames.recv() => Input::Frame(frame),
            };
            let frame = match input {
                Input::Frame(Some(frame)) => frame,
                _ => return Ok(None),
            };

            match frame {
                Ok(Command::Hello { name }) => {
                    match self.context.directory.resolve_player(&name).await {
                        Ok(identity) => return Ok(Some(identity)),
                        Err(DirectoryError::PlayerInUse { name }) => {
                            self.send(ServerMessage::PlayerInUse { name }).await?;
                        }
                        Err(err) => {
                            warn!("📇 Connection {} cannot resolve {}: {}", self.id, name, err);
                            self.send(ServerMessage::ShuttingDown).await?;
                            return Ok(None);
                        }
                    }
                }
                Ok(_) => self.send(ServerMessage::NoHello).await?,
                Err(err) => {
                    self.send(ServerMessage::protocol_error(&err, false))
                        .await?
                }
            }
        }
    }

    /// Reattaches the identity to every session it joined. Returns `false`
    /// when one of them refuses, in which case the connection must close.
    async fn resume(&mut self, identity: &mut PlayerIdentity) -> io::Result<bool> {
        // Notifications queued while parked were meant for the old socket.
        while let Some(notification) = identity.mailbox_mut().try_recv() {
            if let Notification::Closed { tag } | Notification::Exit { tag } = &notification {
                identity.forget_session(tag);
            }
        }
        let ended: Vec<String> = identity
            .sessions()
            .iter()
            .filter(|(_, handle)| handle.is_closed())
            .map(|(tag, _)| tag.clone())
            .collect();
        for tag in ended {
            identity.forget_session(&tag);
        }

        let name = identity.name().to_string();
        if !identity.has_sessions() {
            self.send(ServerMessage::Welcome { name }).await?;
            return Ok(true);
        }

        let joined: Vec<(String, SessionHandle)> = identity
            .sessions()
            .iter()
            .map(|(tag, handle)| (tag.clone(), handle.clone()))
            .collect();
        let mut resumed: Vec<SessionHandle> = Vec::new();
        for (tag, handle) in joined {
            match handle.reconnect(&name).await {
                Ok(view) => {
                    self.leaders.insert(tag.clone(), view.leader);
                    self.send(ServerMessage::Resumed {
                        name: name.clone(),
                        tag,
                        state: view.state,
                    })
                    .await?;
                    resumed.push(handle);
                }
                Err(err) => {
                    warn!("🔁 {} could not resume game {}: {}", name, tag, err);
                    for handle in &resumed {
                        let _ = handle.disconnect(&name).await;
                    }
                    identity.forget_session(&tag);
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    async fn serve(&mut self, identity: &mut PlayerIdentity) -> io::Result<Ending> {
        loop {
            let input = tokio::select! {
                biased;
                _ = self.context.shutdown.recv() => Input::Shutdown,
                notification = identity.mailbox_mut().recv() => Input::Notification(notification),
                frame = self.frames.recv() => Input::Frame(frame),
            };

            match input {
                Input::Shutdown => return Ok(Ending::Shutdown),
                Input::Notification(Some(notification)) => {
                    if self.render(identity, notification).await? {
                        return Ok(Ending::Shutdown);
                    }
                }
                Input::Notification(None) => {}
                Input::Frame(None) => return Ok(Ending::Disconnected),
                Input::Frame(Some(Err(err))) => {
                    debug!("⚠️ Connection {}: {}", self.id, err);
                    self.send(ServerMessage::protocol_error(&err, true)).await?;
                }
                Input::Frame(Some(Ok(command))) => {
                    if self.dispatch(identity, command).await? {
                        return Ok(Ending::Farewell);
                    }
                }
            }
        }
    }

    /// Handles one command. Returns `true` after GOODBYE.
    async fn dispatch(&mut self, identity: &mut PlayerIdentity, command: Command) -> io::Result<bool> {
        let name = identity.name().to_string();
        debug!("📥 {} sent {}", name, command.verb());

        match command {
            Command::Hello { .. } => self.send(ServerMessage::InvalidCommand).await?,
            Command::NewGame { tag } => {
                let created = self
                    .context
                    .directory
                    .resolve_session(&tag, Some(identity.address()))
                    .await;
                match created {
                    Ok(Some(handle)) => {
                        info!("🎲 {} created game {}", name, tag);
                        identity.record_session(handle);
                        self.leaders.insert(tag.clone(), name);
                        self.send(ServerMessage::GameCreated { tag }).await?;
                    }
                    Ok(None) => self.send(ServerMessage::GameExists { tag }).await?,
                    Err(err) => {
                        error!("📇 {} could not create game {}: {}", name, tag, err);
                        self.send(ServerMessage::directory_error(&tag, &err)).await?;
                    }
                }
            }
            Command::JoinGame { tag } => {
                let Some(handle) = self.registered_session(&tag).await? else {
                    return Ok(false);
                };
                match handle.join(identity.address()).await {
                    Ok(view) => {
                        self.leaders.insert(tag.clone(), view.leader);
                        identity.record_session(handle);
                        self.send(ServerMessage::GameJoined {
                            tag,
                            state: view.state,
                        })
                        .await?;
                    }
                    Err(err) => self.refused(identity, &tag, None, err).await?,
                }
            }
            Command::StartGame { tag } => {
                let Some(handle) = self.session(identity, &tag).await? else {
                    return Ok(false);
                };
                match handle.start(&name).await {
                    Ok(()) => self.send(ServerMessage::StartedLeader { tag }).await?,
                    Err(err) => {
                        self.refused(identity, &tag, Some(LeaderAction::Start), err)
                            .await?
                    }
                }
            }
            Command::FileUpload {
                tag,
                filename,
                contents,
            } => {
                let Some(handle) = self.session(identity, &tag).await? else {
                    return Ok(false);
                };
                match handle.upload(&name, &filename).await {
                    Ok(ticket) => match write_upload(&ticket, &contents).await {
                        Ok(()) => {
                            debug!("📤 {} stored {} ({} bytes) for {}", name, filename, contents.len(), tag);
                            ticket.complete(Ok(()));
                        }
                        Err(err) => {
                            error!("💾 Cannot write {}: {}", ticket.path().display(), err);
                            ticket.complete(Err(err.to_string()));
                            self.send(ServerMessage::StorageFailure { tag }).await?;
                        }
                    },
                    Err(err) => {
                        self.refused(identity, &tag, Some(LeaderAction::Upload), err)
                            .await?
                    }
                }
            }
            Command::RandomWord { tag, word } => {
                let Some(handle) = self.session(identity, &tag).await? else {
                    return Ok(false);
                };
                if let Err(err) = handle.random_word(&name, &word).await {
                    self.refused(identity, &tag, None, err).await?;
                }
            }
            Command::WordCount { tag, guess } => {
                let Some(handle) = self.session(identity, &tag).await? else {
                    return Ok(false);
                };
                if let Err(err) = handle.word_count(&name, guess).await {
                    self.refused(identity, &tag, None, err).await?;
                }
            }
            Command::Restart { tag } => {
                let Some(handle) = self.session(identity, &tag).await? else {
                    return Ok(false);
                };
                if let Err(err) = handle.restart(&name).await {
                    self.refused(identity, &tag, Some(LeaderAction::Restart), err)
                        .await?;
                }
            }
            Command::Close { tag } => {
                let Some(handle) = self.session(identity, &tag).await? else {
                    return Ok(false);
                };
                if let Err(err) = handle.close(&name).await {
                    self.refused(identity, &tag, Some(LeaderAction::Close), err)
                        .await?;
                }
            }
            Command::Goodbye => {
                for (tag, handle) in identity.sessions() {
                    if let Err(err) = handle.goodbye(&name).await {
                        debug!("👋 Goodbye from {} to game {} not delivered: {}", name, tag, err);
                    }
                }
                self.send(ServerMessage::Bye).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The joined session for `tag`, falling back to the Directory for
    /// sessions the player has not joined. Reports a missing session to the
    /// client.
    async fn session(&mut self, identity: &PlayerIdentity, tag: &str) -> io::Result<Option<SessionHandle>> {
        match identity.session(tag) {
            Some(handle) if !handle.is_closed() => Ok(Some(handle.clone())),
            _ => self.registered_session(tag).await,
        }
    }

    async fn registered_session(&mut self, tag: &str) -> io::Result<Option<SessionHandle>> {
        match self.context.directory.resolve_session(tag, None).await {
            Ok(Some(handle)) => Ok(Some(handle)),
            Ok(None) => {
                self.send(ServerMessage::GameNotFound { tag: tag.to_string() })
                    .await?;
                Ok(None)
            }
            Err(err) => {
                self.send(ServerMessage::directory_error(tag, &err)).await?;
                Ok(None)
            }
        }
    }

    /// Reports a session's refusal, learning the current leader on the way.
    async fn refused(
        &mut self,
        identity: &PlayerIdentity,
        tag: &str,
        action: Option<LeaderAction>,
        err: SessionError,
    ) -> io::Result<()> {
        debug!("🚫 {} refused by game {}: {}", identity.name(), tag, err);
        if let SessionError::NotLeader { leader } = &err {
            if identity.session(tag).is_some() {
                self.leaders.insert(tag.to_string(), leader.clone());
            }
        }
        self.send(ServerMessage::session_error(tag, action, err)).await
    }

    /// Writes a notification to the client. Returns `true` for an exit
    /// notice, which ends normal service.
    async fn render(&mut self, identity: &mut PlayerIdentity, notification: Notification) -> io::Result<bool> {
        let name = identity.name().to_string();
        let message = match notification {
            Notification::Ready { tag } => ServerMessage::GameReady { tag },
            Notification::Started { tag, leader } => {
                self.leaders.insert(tag.clone(), leader.clone());
                ServerMessage::StartedMember { tag, leader }
            }
            Notification::Uploaded { tag } => ServerMessage::UploadedWaiting { tag },
            Notification::Pick { tag, filename } => ServerMessage::UploadedPick { tag, filename },
            Notification::WordSelected { tag, word } => ServerMessage::WordSelected { tag, word },
            Notification::Winner { tag, winner } => {
                let verdict = if winner == name {
                    ServerMessage::Winner { tag: tag.clone() }
                } else {
                    ServerMessage::Loser {
                        tag: tag.clone(),
                        winner,
                    }
                };
                self.send(verdict).await?;
                if self.leaders.get(&tag) != Some(&name) {
                    return Ok(false);
                }
                ServerMessage::RestartOrClose { tag }
            }
            Notification::NewLeader { tag, leader } => {
                self.leaders.insert(tag.clone(), leader.clone());
                if leader == name {
                    ServerMessage::NewLeaderSelf { tag }
                } else {
                    ServerMessage::NewLeaderOther { tag, leader }
                }
            }
            Notification::Restarted { tag } => ServerMessage::Restarted { tag },
            Notification::Closed { tag } => {
                identity.forget_session(&tag);
                self.leaders.remove(&tag);
                ServerMessage::Closed { tag }
            }
            Notification::Exit { tag } => {
                identity.forget_session(&tag);
                self.leaders.remove(&tag);
                self.send(ServerMessage::SessionEnded { tag }).await?;
                return Ok(true);
            }
            Notification::UploadFailed { tag, filename } => {
                ServerMessage::UploadFailed { tag, filename }
            }
        };
        self.send(message).await?;
        Ok(false)
    }

    async fn park(&mut self, identity: PlayerIdentity) {
        let name = identity.name().to_string();
        if let Err(err) = self.context.directory.park_player(identity).await {
            warn!("📇 Could not park player {}: {}", name, err);
        }
    }

    async fn finish(&mut self, mut identity: PlayerIdentity, ending: Ending) {
        let name = identity.name().to_string();
        match ending {
            Ending::Disconnected => {
                for (tag, handle) in identity.sessions() {
                    if handle.disconnect(&name).await.is_err() {
                        trace!("🔌 Game {} already gone for {}", tag, name);
                    }
                }
                self.park(identity).await;
                info!("🔌 {} disconnected", name);
            }
            Ending::Farewell => {
                if let Err(err) = self.context.directory.remove_player(&name).await {
                    warn!("📇 Could not remove player {}: {}", name, err);
                }
                info!("👋 {} said goodbye", name);
            }
            Ending::Shutdown => {
                self.wind_down(&mut identity).await;
                info!("🛑 Connection {} for {} closed by shutdown", self.id, name);
            }
        }
    }

    /// Renders exit notices until no joined session remains or the shutdown
    /// deadline passes.
    async fn wind_down(&mut self, identity: &mut PlayerIdentity) {
        let deadline = tokio::time::Instant::now() + self.context.shutdown_timeout;
        while identity.has_sessions() {
            let next = tokio::time::timeout_at(deadline, identity.mailbox_mut().recv()).await;
            let Ok(Some(notification)) = next else {
                debug!("⏰ Connection {} stopped waiting for exit notices", self.id);
                break;
            };
            if self.render(identity, notification).await.is_err() {
                break;
            }
        }
    }
}

async fn write_upload(ticket: &UploadTicket, contents: &[u8]) -> io::Result<()> {
    tokio::fs::write(ticket.path(), contents).await
}
