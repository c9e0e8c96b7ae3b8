//! The process-wide Directory actor.
//!
//! The Directory owns the two registries of the server: player name to
//! [`PlayerIdentity`] and session tag to [`SessionHandle`]. It answers
//! requests one at a time from its single mailbox and never issues a
//! blocking call into a Session or a Connection, which keeps the three actor
//! populations free of wait cycles.
//!
//! Player identities are checked out to one live connection at a time and
//! parked again when that connection ends without saying goodbye, so a
//! reconnecting player finds its mailbox and session map intact.

use crate::config::{GameRules, ServerConfig};
use crate::error::DirectoryError;
use crate::mailbox::{request, respond, Mailbox, PlayerAddress, ReplyTo};
use crate::session::{self, SessionExit, SessionHandle, SessionSettings};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A player as known to the server: name, own mailbox, and the sessions the
/// player has joined.
#[derive(Debug)]
pub struct PlayerIdentity {
    name: String,
    mailbox: Mailbox,
    sessions: BTreeMap<String, SessionHandle>,
}

impl PlayerIdentity {
    fn new(name: String) -> Self {
        Self {
            name,
            mailbox: Mailbox::new(),
            sessions: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address sessions use to push notifications to this player.
    pub fn address(&self) -> PlayerAddress {
        PlayerAddress::new(self.name.clone(), &self.mailbox)
    }

    pub fn mailbox_mut(&mut self) -> &mut Mailbox {
        &mut self.mailbox
    }

    /// Joined sessions in tag order.
    pub fn sessions(&self) -> &BTreeMap<String, SessionHandle> {
        &self.sessions
    }

    pub fn session(&self, tag: &str) -> Option<&SessionHandle> {
        self.sessions.get(tag)
    }

    pub fn has_sessions(&self) -> bool {
        !self.sessions.is_empty()
    }

    pub fn record_session(&mut self, handle: SessionHandle) {
        self.sessions.insert(handle.tag().to_string(), handle);
    }

    pub fn forget_session(&mut self, tag: &str) -> Option<SessionHandle> {
        self.sessions.remove(tag)
    }
}

enum PlayerSlot {
    Parked(PlayerIdentity),
    CheckedOut,
}

struct SessionEntry {
    handle: SessionHandle,
    exit: Option<SessionExit>,
}

enum DirectoryRequest {
    ResolvePlayer {
        name: String,
        reply: ReplyTo<Result<PlayerIdentity, DirectoryError>>,
    },
    ParkPlayer {
        identity: PlayerIdentity,
        reply: ReplyTo<()>,
    },
    ResolveSession {
        tag: String,
        creator: Option<PlayerAddress>,
        reply: ReplyTo<Result<Option<SessionHandle>, DirectoryError>>,
    },
    RemoveSession {
        tag: String,
        reply: ReplyTo<()>,
    },
    RemovePlayer {
        name: String,
        reply: ReplyTo<()>,
    },
    Shutdown {
        reply: ReplyTo<Vec<SessionExit>>,
    },
    Stop {
        reply: ReplyTo<()>,
    },
}

/// Address of the Directory actor.
#[derive(Clone)]
pub struct DirectoryHandle {
    mailbox: mpsc::Sender<DirectoryRequest>,
}

impl std::fmt::Debug for DirectoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryHandle")
            .field("closed", &self.mailbox.is_closed())
            .finish()
    }
}

impl DirectoryHandle {
    /// Checks out the identity registered under `name`, creating it on
    /// first use. Fails with [`DirectoryError::PlayerInUse`] while another
    /// connection holds it.
    pub async fn resolve_player(&self, name: &str) -> Result<PlayerIdentity, DirectoryError> {
        let name = name.to_string();
        request(&self.mailbox, |reply| DirectoryRequest::ResolvePlayer { name, reply }).await?
    }

    /// Returns a checked-out identity so a later HELLO can resume it.
    pub async fn park_player(&self, identity: PlayerIdentity) -> Result<(), DirectoryError> {
        request(&self.mailbox, |reply| DirectoryRequest::ParkPlayer { identity, reply }).await?;
        Ok(())
    }

    /// Looks up `tag`, or creates it when `creator` is given.
    ///
    /// With a creator, `Ok(None)` means the tag is already taken. Without
    /// one, `Ok(None)` means no such session exists.
    pub async fn resolve_session(
        &self,
        tag: &str,
        creator: Option<PlayerAddress>,
    ) -> Result<Option<SessionHandle>, DirectoryError> {
        let tag = tag.to_string();
        request(&self.mailbox, |reply| DirectoryRequest::ResolveSession {
            tag,
            creator,
            reply,
        })
        .await?
    }

    /// Deregisters a session. Idempotent.
    pub async fn remove_session(&self, tag: &str) -> Result<(), DirectoryError> {
        let tag = tag.to_string();
        request(&self.mailbox, |reply| DirectoryRequest::RemoveSession { tag, reply }).await?;
        Ok(())
    }

    /// Forgets a player that left every session.
    pub async fn remove_player(&self, name: &str) -> Result<(), DirectoryError> {
        let name = name.to_string();
        request(&self.mailbox, |reply| DirectoryRequest::RemovePlayer { name, reply }).await?;
        Ok(())
    }

    /// Stops session creation and hands over every live session's exit
    /// switch.
    pub async fn shutdown(&self) -> Result<Vec<SessionExit>, DirectoryError> {
        Ok(request(&self.mailbox, |reply| DirectoryRequest::Shutdown { reply }).await?)
    }

    /// Terminates the Directory actor.
    pub async fn stop(&self) -> Result<(), DirectoryError> {
        request(&self.mailbox, |reply| DirectoryRequest::Stop { reply }).await?;
        Ok(())
    }
}

struct Directory {
    players: HashMap<String, PlayerSlot>,
    sessions: HashMap<String, SessionEntry>,
    storage_root: PathBuf,
    rules: GameRules,
    mailbox_capacity: usize,
    upload_ack_timeout: Duration,
    rng: StdRng,
    closing: bool,
    handle: DirectoryHandle,
}

/// Spawns the Directory actor for `config`.
pub fn spawn_directory(config: &ServerConfig) -> DirectoryHandle {
    let (tx, rx) = mpsc::channel(config.mailbox_capacity.max(1));
    let handle = DirectoryHandle { mailbox: tx };
    let rng = match config.picker_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let directory = Directory {
        players: HashMap::new(),
        sessions: HashMap::new(),
        storage_root: config.storage_directory.clone(),
        rules: config.rules,
        mailbox_capacity: config.mailbox_capacity,
        upload_ack_timeout: config.upload_ack_timeout(),
        rng,
        closing: false,
        handle: handle.clone(),
    };
    tokio::spawn(directory.run(rx));
    handle
}

impl Directory {
    async fn run(mut self, mut mailbox: mpsc::Receiver<DirectoryRequest>) {
        debug!("📇 Directory started");
        while let Some(request) = mailbox.recv().await {
            match request {
                DirectoryRequest::ResolvePlayer { name, reply } => {
                    respond(reply, self.resolve_player(name));
                }
                DirectoryRequest::ParkPlayer { identity, reply } => {
                    debug!("🅿️ Parking player {}", identity.name());
                    self.players
                        .insert(identity.name().to_string(), PlayerSlot::Parked(identity));
                    respond(reply, ());
                }
                DirectoryRequest::ResolveSession { tag, creator, reply } => {
                    let outcome = match creator {
                        Some(leader) => self.create_session(tag, leader).await,
                        None => Ok(self.lookup_session(&tag)),
                    };
                    respond(reply, outcome);
                }
                DirectoryRequest::RemoveSession { tag, reply } => {
                    if self.sessions.remove(&tag).is_some() {
                        debug!("📇 Session {} deregistered", tag);
                    }
                    respond(reply, ());
                }
                DirectoryRequest::RemovePlayer { name, reply } => {
                    if self.players.remove(&name).is_some() {
                        debug!("📇 Player {} deregistered", name);
                    }
                    respond(reply, ());
                }
                DirectoryRequest::Shutdown { reply } => {
                    self.closing = true;
                    let exits: Vec<SessionExit> = self
                        .sessions
                        .values_mut()
                        .filter_map(|entry| entry.exit.take())
                        .collect();
                    info!("📇 Directory handing over {} session(s) for shutdown", exits.len());
                    respond(reply, exits);
                }
                DirectoryRequest::Stop { reply } => {
                    respond(reply, ());
                    break;
                }
            }
        }
        debug!("📇 Directory stopped");
    }

    fn resolve_player(&mut self, name: String) -> Result<PlayerIdentity, DirectoryError> {
        match self.players.insert(name.clone(), PlayerSlot::CheckedOut) {
            None => {
                debug!("📇 New player {}", name);
                Ok(PlayerIdentity::new(name))
            }
            Some(PlayerSlot::Parked(identity)) => {
                debug!("📇 Resuming player {}", name);
                Ok(identity)
            }
            Some(PlayerSlot::CheckedOut) => Err(DirectoryError::PlayerInUse { name }),
        }
    }

    fn lookup_session(&self, tag: &str) -> Option<SessionHandle> {
        if self.closing {
            return None;
        }
        self.sessions
            .get(tag)
            .filter(|entry| !entry.handle.is_closed())
            .map(|entry| entry.handle.clone())
    }

    async fn create_session(
        &mut self,
        tag: String,
        leader: PlayerAddress,
    ) -> Result<Option<SessionHandle>, DirectoryError> {
        if self.closing {
            return Err(DirectoryError::ShuttingDown);
        }
        if self.sessions.contains_key(&tag) {
            return Ok(None);
        }

        let storage = self.storage_root.join(&tag);
        prepare_storage(&storage)
            .await
            .map_err(|source| DirectoryError::Storage {
                tag: tag.clone(),
                source,
            })?;

        let settings = SessionSettings {
            tag: tag.clone(),
            storage,
            rules: self.rules,
            mailbox_capacity: self.mailbox_capacity,
            upload_ack_timeout: self.upload_ack_timeout,
            seed: self.rng.gen(),
        };
        let (handle, exit) = session::spawn(settings, leader, self.handle.clone());
        self.sessions.insert(
            tag,
            SessionEntry {
                handle: handle.clone(),
                exit: Some(exit),
            },
        );
        Ok(Some(handle))
    }
}

/// Creates an empty storage scope, discarding leftovers of an earlier run.
async fn prepare_storage(path: &std::path::Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => warn!("💾 Discarded stale storage at {}", path.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    tokio::fs::create_dir_all(path).await
}
