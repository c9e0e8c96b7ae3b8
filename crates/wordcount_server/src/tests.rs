use crate::connection::response::LeaderAction;
use crate::connection::{ServerMessage, Verb};
use crate::session::SessionState;
use crate::*;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    server: Arc<GameServer>,
    addr: SocketAddr,
    task: JoinHandle<Result<(), ServerError>>,
    storage: PathBuf,
    _root: TempDir,
}

impl Harness {
    async fn stop(&mut self) {
        self.server.shutdown();
        let outcome = tokio::time::timeout(Duration::from_secs(10), &mut self.task)
            .await
            .expect("server did not stop")
            .expect("server task panicked");
        assert!(outcome.is_ok());
    }
}

async fn harness(rules: GameRules) -> Harness {
    harness_with(|config| config.rules = rules).await
}

async fn harness_with(tune: impl FnOnce(&mut ServerConfig)) -> Harness {
    let root = tempfile::tempdir().expect("tempdir");
    let storage = root.path().join("serverStorage");
    let mut config = ServerConfig {
        storage_directory: storage.clone(),
        shutdown_timeout_ms: 2_000,
        picker_seed: Some(7),
        ..Default::default()
    };
    tune(&mut config);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let server = Arc::new(create_server_with_config(config));
    let task = tokio::spawn({
        let server = server.clone();
        async move { server.start_with_listener(listener).await }
    });

    Harness {
        server,
        addr,
        task,
        storage,
        _root: root,
    }
}

fn rules(min_players: usize, max_players: usize) -> GameRules {
    GameRules {
        min_players,
        max_players,
    }
}

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let (read_half, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read_half).lines(),
            writer,
        }
    }

    /// Connects and says HELLO, retrying while a previous connection of the
    /// same player is still being released.
    async fn greet(addr: SocketAddr, name: &str) -> (Self, String) {
        for _ in 0..50 {
            let mut client = Self::connect(addr).await;
            client.send(&format!("HELLO {name}")).await;
            let line = client.line().await;
            let in_use = ServerMessage::PlayerInUse { name: name.into() }.to_string();
            if line != in_use {
                return (client, line);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("player {name} never became available");
    }

    async fn hello(addr: SocketAddr, name: &str) -> Self {
        let (client, line) = Self::greet(addr, name).await;
        assert_eq!(line, ServerMessage::Welcome { name: name.into() }.to_string());
        client
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("write");
    }

    async fn upload(&mut self, tag: &str, filename: &str, payload: &str) {
        self.send(&format!("FILE_UPLOAD {tag} {filename} {} {payload}", payload.len()))
            .await;
    }

    async fn line(&mut self) -> String {
        tokio::time::timeout(READ_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .expect("read failed")
            .expect("connection closed")
    }

    async fn expect(&mut self, message: ServerMessage) {
        assert_eq!(self.line().await, message.to_string());
    }

    async fn expect_closed(&mut self) {
        let next = tokio::time::timeout(READ_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for close");
        assert!(matches!(next, Ok(None) | Err(_)), "unexpected line: {next:?}");
    }
}

fn tag(value: &str) -> String {
    value.to_string()
}

#[tokio::test(flavor = "multi_thread")]
async fn four_players_complete_a_round_and_close() {
    let mut harness = harness(GameRules::default()).await;
    let addr = harness.addr;

    let mut alice = Client::hello(addr, "alice").await;
    alice.send("NEW_GAME G1").await;
    alice.expect(ServerMessage::GameCreated { tag: tag("G1") }).await;

    let mut members = Vec::new();
    for (name, state) in [
        ("bob", SessionState::Waiting),
        ("carol", SessionState::Waiting),
        ("dave", SessionState::Ready),
    ] {
        let mut member = Client::hello(addr, name).await;
        member.send("JOIN_GAME G1").await;
        member.expect(ServerMessage::GameJoined { tag: tag("G1"), state }).await;
        members.push((name, member));
    }
    alice.expect(ServerMessage::GameReady { tag: tag("G1") }).await;

    alice.send("START_GAME G1").await;
    alice.expect(ServerMessage::StartedLeader { tag: tag("G1") }).await;
    for (_, member) in members.iter_mut() {
        member
            .expect(ServerMessage::StartedMember {
                tag: tag("G1"),
                leader: "alice".into(),
            })
            .await;
    }

    alice
        .upload("G1", "words.txt", "thy thy thy thy thy the end")
        .await;
    alice.expect(ServerMessage::UploadedWaiting { tag: tag("G1") }).await;

    let pick = ServerMessage::UploadedPick {
        tag: tag("G1"),
        filename: "words.txt".into(),
    }
    .to_string();
    let waiting = ServerMessage::UploadedWaiting { tag: tag("G1") }.to_string();
    let mut picker = None;
    for (index, (_, member)) in members.iter_mut().enumerate() {
        let line = member.line().await;
        if line == pick {
            assert!(picker.replace(index).is_none(), "two pickers chosen");
        } else {
            assert_eq!(line, waiting);
        }
    }
    let picker = picker.expect("no picker chosen");
    assert_eq!(
        std::fs::read_to_string(harness.storage.join("G1").join("words.txt")).unwrap(),
        "thy thy thy thy thy the end"
    );

    members[picker].1.send("RANDOM_WORD G1 thy").await;
    let selected = ServerMessage::WordSelected {
        tag: tag("G1"),
        word: "thy".into(),
    };
    alice.expect(selected.clone()).await;
    for (_, member) in members.iter_mut() {
        member.expect(selected.clone()).await;
    }

    alice.send("WORD_COUNT G1 9").await;
    for ((_, member), guess) in members.iter_mut().zip([4, 5, 7]) {
        member.send(&format!("WORD_COUNT G1 {guess}")).await;
    }

    alice
        .expect(ServerMessage::Loser {
            tag: tag("G1"),
            winner: "carol".into(),
        })
        .await;
    alice.expect(ServerMessage::RestartOrClose { tag: tag("G1") }).await;
    for (name, member) in members.iter_mut() {
        if *name == "carol" {
            member.expect(ServerMessage::Winner { tag: tag("G1") }).await;
        } else {
            member
                .expect(ServerMessage::Loser {
                    tag: tag("G1"),
                    winner: "carol".into(),
                })
                .await;
        }
    }

    members[0].1.send("CLOSE G1").await;
    members[0]
        .1
        .expect(ServerMessage::NotLeader {
            action: LeaderAction::Close,
            leader: "alice".into(),
        })
        .await;

    alice.send("CLOSE G1").await;
    alice.expect(ServerMessage::Closed { tag: tag("G1") }).await;
    for (_, member) in members.iter_mut() {
        member.expect(ServerMessage::Closed { tag: tag("G1") }).await;
    }
    assert!(!harness.storage.join("G1").exists());

    members[0].1.send("JOIN_GAME G1").await;
    members[0]
        .1
        .expect(ServerMessage::GameNotFound { tag: tag("G1") })
        .await;

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn leader_disconnect_hands_over_and_the_leader_resumes() {
    let mut harness = harness(rules(2, 4)).await;
    let addr = harness.addr;

    let mut alice = Client::hello(addr, "alice").await;
    alice.send("NEW_GAME G1").await;
    alice.expect(ServerMessage::GameCreated { tag: tag("G1") }).await;

    let mut bob = Client::hello(addr, "bob").await;
    bob.send("JOIN_GAME G1").await;
    bob.expect(ServerMessage::GameJoined {
        tag: tag("G1"),
        state: SessionState::Ready,
    })
    .await;
    alice.expect(ServerMessage::GameReady { tag: tag("G1") }).await;

    let mut carol = Client::hello(addr, "carol").await;
    carol.send("JOIN_GAME G1").await;
    carol
        .expect(ServerMessage::GameJoined {
            tag: tag("G1"),
            state: SessionState::Ready,
        })
        .await;

    drop(alice);
    bob.expect(ServerMessage::NewLeaderSelf { tag: tag("G1") }).await;
    carol
        .expect(ServerMessage::NewLeaderOther {
            tag: tag("G1"),
            leader: "bob".into(),
        })
        .await;

    carol.send("START_GAME G1").await;
    carol
        .expect(ServerMessage::NotLeader {
            action: LeaderAction::Start,
            leader: "bob".into(),
        })
        .await;

    bob.send("START_GAME G1").await;
    bob.expect(ServerMessage::StartedLeader { tag: tag("G1") }).await;
    carol
        .expect(ServerMessage::StartedMember {
            tag: tag("G1"),
            leader: "bob".into(),
        })
        .await;

    let (mut alice, line) = Client::greet(addr, "alice").await;
    assert_eq!(
        line,
        ServerMessage::Resumed {
            name: "alice".into(),
            tag: tag("G1"),
            state: SessionState::Running,
        }
        .to_string()
    );

    alice.send("CLOSE G1").await;
    alice
        .expect(ServerMessage::NotLeader {
            action: LeaderAction::Close,
            leader: "bob".into(),
        })
        .await;

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn restart_keeps_a_full_session_and_retires_the_word() {
    let mut harness = harness(rules(2, 2)).await;
    let addr = harness.addr;

    let mut alice = Client::hello(addr, "alice").await;
    alice.send("NEW_GAME G1").await;
    alice.expect(ServerMessage::GameCreated { tag: tag("G1") }).await;
    alice.send("NEW_GAME G1").await;
    alice.expect(ServerMessage::GameExists { tag: tag("G1") }).await;

    let mut bob = Client::hello(addr, "bob").await;
    bob.send("JOIN_GAME G1").await;
    bob.expect(ServerMessage::GameJoined {
        tag: tag("G1"),
        state: SessionState::Full,
    })
    .await;
    alice.expect(ServerMessage::GameReady { tag: tag("G1") }).await;

    let mut carol = Client::hello(addr, "carol").await;
    carol.send("JOIN_GAME G1").await;
    carol.expect(ServerMessage::JoinRefused { tag: tag("G1") }).await;

    alice.send("START_GAME G1").await;
    alice.expect(ServerMessage::StartedLeader { tag: tag("G1") }).await;
    bob.expect(ServerMessage::StartedMember {
        tag: tag("G1"),
        leader: "alice".into(),
    })
    .await;

    alice.upload("G1", "a.txt", "thy thy thy").await;
    alice.expect(ServerMessage::UploadedWaiting { tag: tag("G1") }).await;
    bob.expect(ServerMessage::UploadedPick {
        tag: tag("G1"),
        filename: "a.txt".into(),
    })
    .await;

    bob.send("RANDOM_WORD G1 thy").await;
    let selected = ServerMessage::WordSelected {
        tag: tag("G1"),
        word: "thy".into(),
    };
    alice.expect(selected.clone()).await;
    bob.expect(selected).await;

    alice.send("WORD_COUNT G1 3").await;
    bob.send("WORD_COUNT G1 1").await;
    alice.expect(ServerMessage::Winner { tag: tag("G1") }).await;
    alice.expect(ServerMessage::RestartOrClose { tag: tag("G1") }).await;
    bob.expect(ServerMessage::Loser {
        tag: tag("G1"),
        winner: "alice".into(),
    })
    .await;

    alice.send("RESTART G1").await;
    alice.expect(ServerMessage::Restarted { tag: tag("G1") }).await;
    bob.expect(ServerMessage::Restarted { tag: tag("G1") }).await;

    carol.send("JOIN_GAME G1").await;
    carol.expect(ServerMessage::JoinRefused { tag: tag("G1") }).await;

    alice.upload("G1", "b.txt", "thy art thy").await;
    alice.expect(ServerMessage::UploadedWaiting { tag: tag("G1") }).await;
    bob.expect(ServerMessage::UploadedPick {
        tag: tag("G1"),
        filename: "b.txt".into(),
    })
    .await;
    bob.send("RANDOM_WORD G1 thy").await;
    bob.expect(ServerMessage::InvalidWord { word: "thy".into() })
        .await;

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn protocol_errors_are_reported_without_side_effects() {
    let mut harness = harness(rules(2, 4)).await;
    let addr = harness.addr;

    let mut alice = Client::connect(addr).await;
    alice.send("NEW_GAME G1").await;
    alice.expect(ServerMessage::NoHello).await;
    alice.send("FOO").await;
    alice.expect(ServerMessage::NoHello).await;
    alice.send("HELLO").await;
    alice
        .expect(ServerMessage::InvalidArguments { verb: Verb::Hello })
        .await;
    alice.send("HELLO ").await;
    alice.expect(ServerMessage::InvalidName).await;
    alice.send("").await;
    alice.send("HELLO alice").await;
    alice.expect(ServerMessage::Welcome { name: "alice".into() }).await;

    alice.send("FOO bar").await;
    alice.expect(ServerMessage::InvalidCommand).await;
    alice.send("HELLO alice").await;
    alice.expect(ServerMessage::InvalidCommand).await;
    alice.send("JOIN_GAME").await;
    alice
        .expect(ServerMessage::InvalidArguments { verb: Verb::JoinGame })
        .await;
    alice.send("WORD_COUNT G1 many").await;
    alice
        .expect(ServerMessage::InvalidArguments {
            verb: Verb::WordCount,
        })
        .await;
    alice.send("JOIN_GAME nope").await;
    alice.expect(ServerMessage::GameNotFound { tag: tag("nope") }).await;
    alice.send("START_GAME nope").await;
    alice.expect(ServerMessage::GameNotFound { tag: tag("nope") }).await;

    let mut imposter = Client::connect(addr).await;
    imposter.send("HELLO alice").await;
    imposter
        .expect(ServerMessage::PlayerInUse { name: "alice".into() })
        .await;
    imposter.send("HELLO alina").await;
    imposter
        .expect(ServerMessage::Welcome { name: "alina".into() })
        .await;

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn uploads_are_validated_and_oversized_payloads_skipped() {
    let mut harness = harness_with(|config| {
        config.rules = rules(2, 4);
        config.max_message_size = 64;
    })
    .await;
    let addr = harness.addr;

    let mut alice = Client::hello(addr, "alice").await;
    alice.send("NEW_GAME G1").await;
    alice.expect(ServerMessage::GameCreated { tag: tag("G1") }).await;

    alice.upload("G1", "a.txt", "thy thy").await;
    alice
        .expect(ServerMessage::NoPickerCandidates { tag: tag("G1") })
        .await;

    let mut bob = Client::hello(addr, "bob").await;
    bob.send("JOIN_GAME G1").await;
    bob.expect(ServerMessage::GameJoined {
        tag: tag("G1"),
        state: SessionState::Ready,
    })
    .await;
    alice.expect(ServerMessage::GameReady { tag: tag("G1") }).await;

    bob.send("RANDOM_WORD G1 thy").await;
    bob.expect(ServerMessage::NoFile { leader: "alice".into() }).await;
    bob.upload("G1", "b.txt", "thy").await;
    bob.expect(ServerMessage::NotLeader {
        action: LeaderAction::Upload,
        leader: "alice".into(),
    })
    .await;

    let oversized = vec!["thy thy thy"; 9].join("\n");
    alice.upload("G1", "big.txt", &oversized).await;
    alice.expect(ServerMessage::PayloadTooLarge { limit: 64 }).await;
    assert!(!harness.storage.join("G1").join("big.txt").exists());

    // The header line alone is over the limit; the GOODBYE is file content.
    let long_line = format!("{}\nGOODBYE", "a".repeat(70));
    alice.upload("G1", "long.txt", &long_line).await;
    alice.expect(ServerMessage::PayloadTooLarge { limit: 64 }).await;
    assert!(!harness.storage.join("G1").join("long.txt").exists());

    alice.upload("G1", "a.txt", "thy\nthy thy").await;
    alice.expect(ServerMessage::UploadedWaiting { tag: tag("G1") }).await;
    bob.expect(ServerMessage::UploadedPick {
        tag: tag("G1"),
        filename: "a.txt".into(),
    })
    .await;
    assert_eq!(
        std::fs::read_to_string(harness.storage.join("G1").join("a.txt")).unwrap(),
        "thy\nthy thy"
    );

    alice.upload("G1", "a.txt", "again").await;
    alice
        .expect(ServerMessage::FileExists {
            tag: tag("G1"),
            filename: "a.txt".into(),
        })
        .await;

    bob.send("WORD_COUNT G1 3").await;
    bob.expect(ServerMessage::GuessingClosed { tag: tag("G1") }).await;
    alice.send("RANDOM_WORD G1 thy").await;
    alice
        .expect(ServerMessage::NotPicker {
            picker: Some("bob".into()),
        })
        .await;
    bob.send("RANDOM_WORD G1 nope").await;
    bob.expect(ServerMessage::InvalidWord { word: "nope".into() })
        .await;

    let mut carol = Client::hello(addr, "carol").await;
    carol.send("WORD_COUNT G1 3").await;
    carol.expect(ServerMessage::NotMember { tag: tag("G1") }).await;

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn goodbye_releases_the_player_and_leader_goodbye_closes() {
    let mut harness = harness(rules(2, 4)).await;
    let addr = harness.addr;

    let mut alice = Client::hello(addr, "alice").await;
    alice.send("NEW_GAME G1").await;
    alice.expect(ServerMessage::GameCreated { tag: tag("G1") }).await;

    let mut bob = Client::hello(addr, "bob").await;
    bob.send("JOIN_GAME G1").await;
    bob.expect(ServerMessage::GameJoined {
        tag: tag("G1"),
        state: SessionState::Ready,
    })
    .await;
    alice.expect(ServerMessage::GameReady { tag: tag("G1") }).await;

    alice.send("GOODBYE").await;
    alice.expect(ServerMessage::Bye).await;
    alice.expect_closed().await;
    bob.expect(ServerMessage::Closed { tag: tag("G1") }).await;
    assert!(!harness.storage.join("G1").exists());

    bob.send("JOIN_GAME G1").await;
    bob.expect(ServerMessage::GameNotFound { tag: tag("G1") }).await;
    bob.send("GOODBYE").await;
    bob.expect(ServerMessage::Bye).await;
    bob.expect_closed().await;

    // A returning player starts over with no sessions.
    let mut alice = Client::hello(addr, "alice").await;
    alice.send("NEW_GAME G1").await;
    alice.expect(ServerMessage::GameCreated { tag: tag("G1") }).await;

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn connections_over_the_limit_are_turned_away() {
    let mut harness = harness_with(|config| config.max_connections = 1).await;
    let addr = harness.addr;

    let _alice = Client::hello(addr, "alice").await;
    let mut late = Client::connect(addr).await;
    late.expect(ServerMessage::ServerFull).await;
    late.expect_closed().await;

    harness.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_ends_every_session_and_closes_connections() {
    let mut harness = harness(rules(2, 4)).await;
    let addr = harness.addr;

    let mut alice = Client::hello(addr, "alice").await;
    alice.send("NEW_GAME G1").await;
    alice.expect(ServerMessage::GameCreated { tag: tag("G1") }).await;
    let mut bob = Client::hello(addr, "bob").await;
    bob.send("JOIN_GAME G1").await;
    bob.expect(ServerMessage::GameJoined {
        tag: tag("G1"),
        state: SessionState::Ready,
    })
    .await;
    alice.expect(ServerMessage::GameReady { tag: tag("G1") }).await;

    // A parked player's session is torn down too.
    let mut dave = Client::hello(addr, "dave").await;
    dave.send("NEW_GAME G2").await;
    dave.expect(ServerMessage::GameCreated { tag: tag("G2") }).await;
    drop(dave);

    assert_eq!(harness.server.local_addr(), Some(addr));
    harness.stop().await;

    for client in [&mut alice, &mut bob] {
        client
            .expect(ServerMessage::SessionEnded { tag: tag("G1") })
            .await;
        client.expect_closed().await;
    }
    assert!(harness.storage.exists());
    assert!(!harness.storage.join("G1").exists());
    assert!(!harness.storage.join("G2").exists());
    assert_eq!(harness.server.connection_manager().connection_count().await, 0);
}
