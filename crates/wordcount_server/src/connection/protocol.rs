//! Inbound wire protocol: newline-terminated text commands, with inline
//! file payloads for `FILE_UPLOAD`.
//!
//! [`CommandReader`] owns the read half of a socket and yields one
//! [`Frame`] per command. Protocol errors are frames too, so the connection
//! can report them and keep going; only I/O failures and end-of-stream stop
//! the reader.

use std::fmt;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

/// Protocol verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Hello,
    NewGame,
    JoinGame,
    StartGame,
    FileUpload,
    RandomWord,
    WordCount,
    Restart,
    Close,
    Goodbye,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Hello => "HELLO",
            Verb::NewGame => "NEW_GAME",
            Verb::JoinGame => "JOIN_GAME",
            Verb::StartGame => "START_GAME",
            Verb::FileUpload => "FILE_UPLOAD",
            Verb::RandomWord => "RANDOM_WORD",
            Verb::WordCount => "WORD_COUNT",
            Verb::Restart => "RESTART",
            Verb::Close => "CLOSE",
            Verb::Goodbye => "GOODBYE",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "HELLO" => Verb::Hello,
            "NEW_GAME" => Verb::NewGame,
            "JOIN_GAME" => Verb::JoinGame,
            "START_GAME" => Verb::StartGame,
            "FILE_UPLOAD" => Verb::FileUpload,
            "RANDOM_WORD" => Verb::RandomWord,
            "WORD_COUNT" => Verb::WordCount,
            "RESTART" => Verb::Restart,
            "CLOSE" => Verb::Close,
            "GOODBYE" => Verb::Goodbye,
            _ => return None,
        })
    }

    /// Number of space-separated tokens, verb included.
    fn arity(self) -> usize {
        match self {
            Verb::Goodbye => 1,
            Verb::RandomWord | Verb::WordCount => 3,
            Verb::FileUpload => 4,
            _ => 2,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Hello { name: String },
    NewGame { tag: String },
    JoinGame { tag: String },
    StartGame { tag: String },
    FileUpload { tag: String, filename: String, contents: Vec<u8> },
    RandomWord { tag: String, word: String },
    WordCount { tag: String, guess: i64 },
    Restart { tag: String },
    Close { tag: String },
    Goodbye,
}

impl Command {
    pub fn verb(&self) -> Verb {
        match self {
            Command::Hello { .. } => Verb::Hello,
            Command::NewGame { .. } => Verb::NewGame,
            Command::JoinGame { .. } => Verb::JoinGame,
            Command::StartGame { .. } => Verb::StartGame,
            Command::FileUpload { .. } => Verb::FileUpload,
            Command::RandomWord { .. } => Verb::RandomWord,
            Command::WordCount { .. } => Verb::WordCount,
            Command::Restart { .. } => Verb::Restart,
            Command::Close { .. } => Verb::Close,
            Command::Goodbye => Verb::Goodbye,
        }
    }
}

/// Malformed input. Always local to the connection; never reaches a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown command {verb:?}")]
    UnknownCommand { verb: String },

    #[error("invalid arguments for {verb}")]
    InvalidArguments { verb: Verb },

    #[error("invalid player name")]
    InvalidName,

    #[error("line longer than {limit} bytes")]
    LineTooLong { limit: usize },

    #[error("upload of {declared} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { declared: usize, limit: usize },

    #[error("command is not valid UTF-8")]
    NotUtf8,
}

/// One unit of client input.
pub type Frame = Result<Command, ProtocolError>;

/// True for tokens usable as a session tag or an uploaded file name, both of
/// which become a single path component in storage.
pub fn is_path_component(token: &str) -> bool {
    !token.is_empty()
        && token != "."
        && token != ".."
        && !token.contains(['/', '\\', '\0'])
}

fn tag_argument(token: &str, verb: Verb) -> Result<String, ProtocolError> {
    if is_path_component(token) {
        Ok(token.to_string())
    } else {
        Err(ProtocolError::InvalidArguments { verb })
    }
}

/// Parses a single command line (without its newline). `FILE_UPLOAD` lines
/// need the payload that follows them and are handled by [`CommandReader`].
pub fn parse_command(line: &str) -> Frame {
    let tokens: Vec<&str> = line.split(' ').collect();
    let verb = Verb::parse(tokens[0]).ok_or_else(|| ProtocolError::UnknownCommand {
        verb: tokens[0].to_string(),
    })?;
    if tokens.len() != verb.arity() || verb == Verb::FileUpload {
        return Err(ProtocolError::InvalidArguments { verb });
    }

    Ok(match verb {
        Verb::Hello => {
            if tokens[1].is_empty() {
                return Err(ProtocolError::InvalidName);
            }
            Command::Hello {
                name: tokens[1].to_string(),
            }
        }
        Verb::NewGame => Command::NewGame {
            tag: tag_argument(tokens[1], verb)?,
        },
        Verb::JoinGame => Command::JoinGame {
            tag: tag_argument(tokens[1], verb)?,
        },
        Verb::StartGame => Command::StartGame {
            tag: tag_argument(tokens[1], verb)?,
        },
        Verb::Restart => Command::Restart {
            tag: tag_argument(tokens[1], verb)?,
        },
        Verb::Close => Command::Close {
            tag: tag_argument(tokens[1], verb)?,
        },
        Verb::RandomWord => {
            if tokens[2].is_empty() {
                return Err(ProtocolError::InvalidArguments { verb });
            }
            Command::RandomWord {
                tag: tag_argument(tokens[1], verb)?,
                word: tokens[2].to_string(),
            }
        }
        Verb::WordCount => Command::WordCount {
            tag: tag_argument(tokens[1], verb)?,
            guess: tokens[2]
                .parse()
                .map_err(|_| ProtocolError::InvalidArguments { verb })?,
        },
        Verb::Goodbye => Command::Goodbye,
        Verb::FileUpload => return Err(ProtocolError::InvalidArguments { verb }),
    })
}

fn is_upload_header(line: &[u8]) -> bool {
    let verb = Verb::FileUpload.as_str().as_bytes();
    line.starts_with(verb) && matches!(line.get(verb.len()), None | Some(b' '))
}

/// Reads frames from the client side of a connection.
pub struct CommandReader<R> {
    inner: BufReader<R>,
    max_message_size: usize,
}

impl<R: AsyncRead + Unpin> CommandReader<R> {
    pub fn new(inner: R, max_message_size: usize) -> Self {
        Self {
            inner: BufReader::new(inner),
            max_message_size: max_message_size.max(1),
        }
    }

    /// Reads the next frame. `Ok(None)` means the client closed the stream.
    /// Blank lines are skipped.
    pub async fn next_frame(&mut self) -> std::io::Result<Option<Frame>> {
        loop {
            let line = match self.read_line().await? {
                None => return Ok(None),
                Some(Line::Complete(line)) => line,
                Some(Line::TooLong(prefix)) => {
                    if is_upload_header(&prefix) {
                        return self.read_upload(&prefix, true).await.map(Some);
                    }
                    self.discard_line().await?;
                    return Ok(Some(Err(self.line_too_long())));
                }
            };

            if is_upload_header(&line) {
                return self.read_upload(&line, false).await.map(Some);
            }

            let Ok(text) = std::str::from_utf8(&line) else {
                return Ok(Some(Err(ProtocolError::NotUtf8)));
            };
            let text = text.strip_suffix('\r').unwrap_or(text);
            if text.trim().is_empty() {
                continue;
            }
            return Ok(Some(parse_command(text)));
        }
    }

    fn line_too_long(&self) -> ProtocolError {
        ProtocolError::LineTooLong {
            limit: self.max_message_size,
        }
    }

    /// One line without its newline. An oversized line comes back as its
    /// first `max_message_size + 1` bytes with the rest left unread.
    async fn read_line(&mut self) -> std::io::Result<Option<Line>> {
        let limit = self.max_message_size as u64 + 1;
        let mut line = Vec::new();
        let read = (&mut self.inner)
            .take(limit)
            .read_until(b'\n', &mut line)
            .await?;
        if read == 0 {
            return Ok(None);
        }
        if line.last() == Some(&b'\n') {
            line.pop();
            return Ok(Some(Line::Complete(line)));
        }
        if line.len() as u64 >= limit {
            return Ok(Some(Line::TooLong(line)));
        }
        // Final line without a newline.
        Ok(Some(Line::Complete(line)))
    }

    /// Skips input up to and including the next newline.
    async fn discard_line(&mut self) -> std::io::Result<()> {
        loop {
            let buffer = self.inner.fill_buf().await?;
            if buffer.is_empty() {
                return Ok(());
            }
            match buffer.iter().position(|byte| *byte == b'\n') {
                Some(end) => {
                    self.inner.consume(end + 1);
                    return Ok(());
                }
                None => {
                    let len = buffer.len();
                    self.inner.consume(len);
                }
            }
        }
    }

    /// Reads `count` more payload bytes, appending them to `keep` or dropping
    /// them, then skips the rest of the line unless the payload ended it.
    async fn take_payload(
        &mut self,
        count: usize,
        mut keep: Option<&mut Vec<u8>>,
    ) -> std::io::Result<()> {
        let mut remaining = count;
        let mut last = None;
        while remaining > 0 {
            let buffer = self.inner.fill_buf().await?;
            if buffer.is_empty() {
                return Err(std::io::ErrorKind::UnexpectedEof.into());
            }
            let taken = buffer.len().min(remaining);
            if let Some(keep) = keep.as_deref_mut() {
                keep.extend_from_slice(&buffer[..taken]);
            }
            last = Some(buffer[taken - 1]);
            self.inner.consume(taken);
            remaining -= taken;
        }
        if last != Some(b'\n') {
            self.discard_line().await?;
        }
        Ok(())
    }

    /// `FILE_UPLOAD <tag> <filename> <byteLength> <payload...>`
    ///
    /// The payload starts after the space that follows the length, and the
    /// newline ending the header line is part of it. Whatever follows the
    /// payload on its last line is dropped. `line_open` means `header` is
    /// only the first part of an oversized line whose rest is still unread.
    async fn read_upload(&mut self, header: &[u8], line_open: bool) -> std::io::Result<Frame> {
        let verb = Verb::FileUpload;
        let invalid = ProtocolError::InvalidArguments { verb };

        let mut fields = header.splitn(5, |byte| *byte == b' ');
        let _verb = fields.next();
        let (tag, filename, length, rest) =
            (fields.next(), fields.next(), fields.next(), fields.next());

        // Without the space after the length there is no telling where the
        // payload starts.
        if line_open && rest.is_none() {
            self.discard_line().await?;
            return Ok(Err(self.line_too_long()));
        }
        let (Some(tag), Some(filename), Some(length)) = (tag, filename, length) else {
            return Ok(Err(invalid));
        };

        let Some(declared) = std::str::from_utf8(length)
            .ok()
            .and_then(|length| length.parse::<usize>().ok())
        else {
            if line_open {
                self.discard_line().await?;
            }
            return Ok(Err(invalid));
        };

        let mut contents = rest.map(<[u8]>::to_vec).unwrap_or_default();
        if rest.is_some() && !line_open {
            contents.push(b'\n');
        }

        let too_large = declared > self.max_message_size;
        if declared <= contents.len() {
            contents.truncate(declared);
            if line_open {
                self.discard_line().await?;
            }
        } else {
            let missing = declared - contents.len();
            let keep = if too_large { None } else { Some(&mut contents) };
            self.take_payload(missing, keep).await?;
        }

        if too_large {
            return Ok(Err(ProtocolError::PayloadTooLarge {
                declared,
                limit: self.max_message_size,
            }));
        }

        let tag = std::str::from_utf8(tag).ok().filter(|tag| is_path_component(tag));
        let filename = std::str::from_utf8(filename)
            .ok()
            .filter(|name| is_path_component(name));
        match (tag, filename) {
            (Some(tag), Some(filename)) => Ok(Ok(Command::FileUpload {
                tag: tag.to_string(),
                filename: filename.to_string(),
                contents,
            })),
            _ => Ok(Err(invalid)),
        }
    }
}

/// Raw line as read from the socket.
enum Line {
    Complete(Vec<u8>),
    TooLong(Vec<u8>),
}
