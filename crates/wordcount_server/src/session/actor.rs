//! The Session actor: sole owner of one game's mutable state.
//!
//! Every command is handled to completion before the next mailbox record is
//! read, so there is never more than one mutator of a session. The actor
//! only ever waits on its own mailbox, its exit signal, or the uploader's
//! write acknowledgment; notifications to players are pushed into unbounded
//! mailboxes and never block.

use super::handle::{ExitRequest, SessionCommand, SessionExit, SessionHandle, SessionView, UploadTicket};
use super::roster::Roster;
use super::words::{Round, WordTable};
use super::SessionState;
use crate::config::GameRules;
use crate::directory::DirectoryHandle;
use crate::error::SessionError;
use crate::mailbox::{respond, Notification, PlayerAddress, ReplyTo};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

type Reply<T> = ReplyTo<Result<T, SessionError>>;

/// Parameters for spawning a session.
#[derive(Debug, Clone)]
pub(crate) struct SessionSettings {
    pub tag: String,
    pub storage: PathBuf,
    pub rules: GameRules,
    pub mailbox_capacity: usize,
    pub upload_ack_timeout: Duration,
    pub seed: u64,
}

/// What the loop does after a command.
enum Flow {
    Continue,
    /// The session tore itself down (CLOSE or leader GOODBYE).
    Stop,
    /// Forced exit; the request is absent when the exit switch was dropped.
    Exit(Option<ExitRequest>),
}

enum Event {
    Exit(Option<ExitRequest>),
    Command(Option<SessionCommand>),
}

pub(crate) struct SessionActor {
    tag: String,
    state: SessionState,
    leader: String,
    picker: Option<String>,
    roster: Roster,
    words: WordTable,
    source_file: Option<String>,
    round: Round,
    storage: PathBuf,
    rules: GameRules,
    rng: StdRng,
    upload_ack_timeout: Duration,
    directory: DirectoryHandle,
    mailbox: mpsc::Receiver<SessionCommand>,
    exit: oneshot::Receiver<ExitRequest>,
}

/// Spawns a session led by `leader` and returns its handle plus its exit
/// switch. The storage scope must already exist.
pub(crate) fn spawn(
    settings: SessionSettings,
    leader: PlayerAddress,
    directory: DirectoryHandle,
) -> (SessionHandle, SessionExit) {
    let (command_tx, command_rx) = mpsc::channel(settings.mailbox_capacity.max(1));
    let (exit_tx, exit_rx) = oneshot::channel();

    let mut roster = Roster::default();
    let leader_name = leader.name().to_string();
    roster.activate(leader);

    let actor = SessionActor {
        tag: settings.tag.clone(),
        state: SessionState::for_active_count(roster.active_count(), settings.rules),
        leader: leader_name,
        picker: None,
        roster,
        words: WordTable::default(),
        source_file: None,
        round: Round::default(),
        storage: settings.storage,
        rules: settings.rules,
        rng: StdRng::seed_from_u64(settings.seed),
        upload_ack_timeout: settings.upload_ack_timeout,
        directory,
        mailbox: command_rx,
        exit: exit_rx,
    };
    tokio::spawn(actor.run());

    (
        SessionHandle::new(settings.tag.clone(), command_tx),
        SessionExit::new(settings.tag, exit_tx),
    )
}

impl SessionActor {
    async fn run(mut self) {
        info!("🎲 Session {} created by {}", self.tag, self.leader);
        loop {
            let event = tokio::select! {
                biased;
                signal = &mut self.exit => Event::Exit(signal.ok()),
                command = self.mailbox.recv() => Event::Command(command),
            };

            let flow = match event {
                Event::Exit(signal) => Flow::Exit(signal),
                Event::Command(Some(command)) => self.handle(command).await,
                Event::Command(None) => Flow::Exit(None),
            };

            match flow {
                Flow::Continue => {}
                Flow::Stop => break,
                Flow::Exit(signal) => {
                    self.terminate(signal).await;
                    break;
                }
            }
        }
        info!("🏁 Session {} ended", self.tag);
    }

    async fn handle(&mut self, command: SessionCommand) -> Flow {
        match command {
            SessionCommand::Join { player, reply } => self.join(player, reply),
            SessionCommand::Start { name, reply } => self.start(&name, reply),
            SessionCommand::Upload { name, filename, reply } => {
                return self.upload(&name, filename, reply).await;
            }
            SessionCommand::RandomWord { name, word, reply } => self.random_word(&name, word, reply),
            SessionCommand::WordCount { name, guess, reply } => self.word_count(&name, guess, reply),
            SessionCommand::Disconnect { name } => self.disconnect(&name),
            SessionCommand::Reconnect { name, reply } => self.reconnect(&name, reply),
            SessionCommand::Restart { name, reply } => self.restart(&name, reply),
            SessionCommand::Close { name, reply } => return self.close(&name, reply).await,
            SessionCommand::Goodbye { name, reply } => return self.goodbye(&name, reply).await,
        }
        Flow::Continue
    }

    fn view(&self) -> SessionView {
        SessionView {
            state: self.state,
            leader: self.leader.clone(),
        }
    }

    /// Recomputes the count-derived state unless the game is running.
    fn refresh_state(&mut self) {
        if self.state != SessionState::Running {
            self.state = SessionState::for_active_count(self.roster.active_count(), self.rules);
        }
    }

    fn require_leader(&self, name: &str) -> Result<(), SessionError> {
        if name == self.leader {
            Ok(())
        } else {
            Err(SessionError::NotLeader {
                leader: self.leader.clone(),
            })
        }
    }

    fn picker_candidates(&self) -> Vec<String> {
        self.roster
            .active_names()
            .filter(|name| *name != self.leader)
            .map(str::to_string)
            .collect()
    }

    fn join(&mut self, player: PlayerAddress, reply: Reply<SessionView>) {
        let name = player.name().to_string();
        if self.roster.is_active(&name) {
            respond(reply, Err(SessionError::AlreadyJoined));
            return;
        }
        if !self.state.is_joinable() {
            respond(reply, Err(SessionError::NotJoinable { state: self.state }));
            return;
        }

        self.roster.activate(player);
        self.refresh_state();
        respond(reply, Ok(self.view()));
        debug!("➕ {} joined session {} ({})", name, self.tag, self.state);

        if self.roster.active_count() == self.rules.min_players {
            self.roster.notify(&self.leader, Notification::Ready { tag: self.tag.clone() });
        }
    }

    fn start(&mut self, name: &str, reply: Reply<()>) {
        if let Err(err) = self.require_leader(name) {
            respond(reply, Err(err));
            return;
        }
        if self.state == SessionState::Running {
            respond(reply, Err(SessionError::AlreadyStarted));
            return;
        }
        let active = self.roster.active_count();
        if active < self.rules.min_players {
            respond(
                reply,
                Err(SessionError::NotEnoughPlayers {
                    missing: self.rules.min_players - active,
                }),
            );
            return;
        }

        self.state = SessionState::Running;
        respond(reply, Ok(()));
        info!("▶️ Session {} started with {} players", self.tag, active);

        let started = Notification::Started {
            tag: self.tag.clone(),
            leader: self.leader.clone(),
        };
        self.roster.notify_active_except(&self.leader, &started);
    }

    async fn file_exists(&self, filename: &str) -> std::io::Result<bool> {
        let mut entries = tokio::fs::read_dir(&self.storage).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name() == OsStr::new(filename) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn upload(&mut self, name: &str, filename: String, reply: Reply<UploadTicket>) -> Flow {
        if let Err(err) = self.require_leader(name) {
            respond(reply, Err(err));
            return Flow::Continue;
        }
        match self.file_exists(&filename).await {
            Ok(false) => {}
            Ok(true) => {
                respond(reply, Err(SessionError::FileExists { filename }));
                return Flow::Continue;
            }
            Err(err) => {
                error!("💾 Cannot read storage of session {}: {}", self.tag, err);
                respond(reply, Err(SessionError::Storage(err.to_string())));
                return Flow::Continue;
            }
        }
        let candidates = self.picker_candidates();
        if candidates.is_empty() {
            respond(reply, Err(SessionError::NoPickerCandidates));
            return Flow::Continue;
        }

        let path = self.storage.join(&filename);
        let (ticket, completion) = UploadTicket::new(path.clone());
        respond(reply, Ok(ticket));

        // Blocked until the uploader reports the write, the wait times out,
        // or the process shuts down.
        let acknowledged = tokio::select! {
            biased;
            signal = &mut self.exit => Err(signal.ok()),
            outcome = tokio::time::timeout(self.upload_ack_timeout, completion) => Ok(outcome),
        };
        match acknowledged {
            Err(signal) => return Flow::Exit(signal),
            Ok(Ok(Ok(Ok(())))) => {}
            Ok(Ok(Ok(Err(reason)))) => {
                warn!("📤 Upload of {} to session {} failed: {}", filename, self.tag, reason);
                return Flow::Continue;
            }
            Ok(Ok(Err(_))) => {
                warn!("📤 Upload of {} to session {} was abandoned", filename, self.tag);
                return Flow::Continue;
            }
            Ok(Err(_)) => {
                warn!("⏰ Timed out waiting for upload of {} to session {}", filename, self.tag);
                return Flow::Continue;
            }
        }

        let text = match tokio::fs::read(&path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) => {
                error!("💾 Cannot read uploaded file {}: {}", path.display(), err);
                self.roster.notify(
                    &self.leader,
                    Notification::UploadFailed {
                        tag: self.tag.clone(),
                        filename,
                    },
                );
                return Flow::Continue;
            }
        };
        self.words = WordTable::from_text(&text);
        self.round.reset();

        let picker = candidates
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_default();
        info!(
            "📚 Session {} loaded {} ({} distinct words), picker is {}",
            self.tag,
            filename,
            self.words.len(),
            picker
        );

        self.roster.notify(
            &picker,
            Notification::Pick {
                tag: self.tag.clone(),
                filename: filename.clone(),
            },
        );
        self.roster
            .notify_active_except(&picker, &Notification::Uploaded { tag: self.tag.clone() });
        self.picker = Some(picker);
        self.source_file = Some(filename);
        Flow::Continue
    }

    fn random_word(&mut self, name: &str, word: String, reply: Reply<()>) {
        if self.source_file.is_none() {
            respond(
                reply,
                Err(SessionError::NoFileUploaded {
                    leader: self.leader.clone(),
                }),
            );
            return;
        }
        if self.picker.as_deref() != Some(name) {
            respond(
                reply,
                Err(SessionError::NotPicker {
                    picker: self.picker.clone(),
                }),
            );
            return;
        }
        if self.round.target().is_some() {
            respond(reply, Err(SessionError::WordAlreadySelected));
            return;
        }
        if self.words.count(&word).is_none() || self.round.is_used(&word) {
            respond(reply, Err(SessionError::InvalidWord { word }));
            return;
        }

        respond(reply, Ok(()));
        info!("🔤 Session {}: {} picked a word", self.tag, name);
        self.roster.notify_active(&Notification::WordSelected {
            tag: self.tag.clone(),
            word: word.clone(),
        });
        self.round.open(word);
    }

    fn word_count(&mut self, name: &str, guess: i64, reply: Reply<()>) {
        if !self.roster.is_active(name) {
            respond(reply, Err(SessionError::NotMember));
            return;
        }
        if !self.round.guessing_open() {
            respond(reply, Err(SessionError::GuessingClosed));
            return;
        }
        self.round.record(name, guess);
        respond(reply, Ok(()));
        debug!("🔢 {} guessed {} in session {}", name, guess, self.tag);
        self.finish_round_if_complete();
    }

    /// Closes the guessing window once every active player has a guess and
    /// announces the winner.
    fn finish_round_if_complete(&mut self) {
        if !self.round.guessing_open() || self.roster.active_count() == 0 {
            return;
        }
        if !self.roster.active_names().all(|name| self.round.has_guessed(name)) {
            return;
        }

        let actual = self
            .round
            .target()
            .and_then(|word| self.words.count(word))
            .unwrap_or(0);
        self.round.close_window();

        if let Some(winner) = self.round.winner(actual, self.roster.active_names()) {
            info!("🏆 Session {}: {} wins (actual count {})", self.tag, winner, actual);
            self.roster.notify_active(&Notification::Winner {
                tag: self.tag.clone(),
                winner,
            });
        }
    }

    fn disconnect(&mut self, name: &str) {
        if !self.roster.disconnect(name) {
            debug!("🔌 Ignoring disconnect of inactive player {} in session {}", name, self.tag);
            return;
        }
        self.refresh_state();
        debug!("🔌 {} disconnected from session {} ({})", name, self.tag, self.state);

        if name == self.leader {
            if let Some(successor) = self.roster.earliest_active().map(str::to_string) {
                info!("👑 Session {}: leadership passes from {} to {}", self.tag, name, successor);
                self.leader = successor;
                self.roster.notify_active(&Notification::NewLeader {
                    tag: self.tag.clone(),
                    leader: self.leader.clone(),
                });
                // A leader never picks.
                if self.picker.as_deref() == Some(self.leader.as_str())
                    && self.round.target().is_none()
                {
                    self.repick();
                }
            }
        }
        self.finish_round_if_complete();
    }

    fn reconnect(&mut self, name: &str, reply: Reply<SessionView>) {
        if !self.roster.reconnect(name) {
            respond(reply, Err(SessionError::NotDisconnected));
            return;
        }
        self.refresh_state();
        debug!("🔁 {} reconnected to session {} ({})", name, self.tag, self.state);
        respond(reply, Ok(self.view()));
    }

    fn restart(&mut self, name: &str, reply: Reply<()>) {
        if let Err(err) = self.require_leader(name) {
            respond(reply, Err(err));
            return;
        }
        respond(reply, Ok(()));

        self.picker = None;
        self.round.reset();
        self.state = SessionState::for_active_count(self.roster.active_count(), self.rules);
        info!("🔄 Session {} restarted ({})", self.tag, self.state);
        self.roster
            .notify_active(&Notification::Restarted { tag: self.tag.clone() });
    }

    async fn close(&mut self, name: &str, reply: Reply<()>) -> Flow {
        if let Err(err) = self.require_leader(name) {
            respond(reply, Err(err));
            return Flow::Continue;
        }
        self.teardown().await;
        respond(reply, Ok(()));
        info!("🚪 Session {} closed by {}", self.tag, name);
        self.roster
            .notify_active(&Notification::Closed { tag: self.tag.clone() });
        Flow::Stop
    }

    async fn goodbye(&mut self, name: &str, reply: Reply<()>) -> Flow {
        if name == self.leader {
            self.teardown().await;
            respond(reply, Ok(()));
            info!("🚪 Session {} closed: leader {} left", self.tag, name);
            let closed = Notification::Closed { tag: self.tag.clone() };
            self.roster.notify_active_except(&self.leader, &closed);
            self.roster.notify_departed(&closed);
            return Flow::Stop;
        }

        let departed = self.roster.depart(name);
        respond(reply, Ok(()));
        if !departed {
            return Flow::Continue;
        }
        debug!("👋 {} left session {}", name, self.tag);

        if self.state == SessionState::Running {
            if self.picker.as_deref() == Some(name) && self.round.target().is_none() {
                self.repick();
            }
        } else {
            self.refresh_state();
        }
        self.finish_round_if_complete();
        Flow::Continue
    }

    /// Replaces a picker that left or took over leadership before choosing
    /// a word.
    fn repick(&mut self) {
        let candidates = self.picker_candidates();
        self.picker = candidates.choose(&mut self.rng).cloned();
        match (&self.picker, &self.source_file) {
            (Some(picker), Some(filename)) => {
                info!("🎯 Session {}: new picker is {}", self.tag, picker);
                self.roster.notify(
                    picker,
                    Notification::Pick {
                        tag: self.tag.clone(),
                        filename: filename.clone(),
                    },
                );
            }
            (None, _) => warn!("🎯 Session {} has no player left to pick a word", self.tag),
            (Some(_), None) => {}
        }
    }

    async fn remove_storage(&self) {
        match tokio::fs::remove_dir_all(&self.storage).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!("💾 Failed to remove {}: {}", self.storage.display(), err),
        }
    }

    /// Releases storage and deregisters from the Directory.
    async fn teardown(&mut self) {
        self.remove_storage().await;
        if let Err(err) = self.directory.remove_session(&self.tag).await {
            warn!("📇 Could not deregister session {}: {}", self.tag, err);
        }
    }

    /// Forced exit during shutdown: tell every known player, release
    /// storage, then confirm to the shutdown initiator.
    async fn terminate(&mut self, signal: Option<ExitRequest>) {
        let exit = Notification::Exit { tag: self.tag.clone() };
        self.roster.notify_active(&exit);
        self.roster.notify_departed(&exit);
        self.remove_storage().await;
        if let Some(request) = signal {
            let _ = request.confirm.send(());
        }
    }
}
