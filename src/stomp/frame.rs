use std::fmt;
use std::str::FromStr;

use crate::core::errors::{FeedError, Result};

/// Header names used by the client
pub mod headers {
    pub const ACCEPT_VERSION: &str = "accept-version";
    pub const HOST: &str = "host";
    pub const HEART_BEAT: &str = "heart-beat";
    pub const VERSION: &str = "version";
    pub const SERVER: &str = "server";
    pub const SESSION: &str = "session";
    pub const DESTINATION: &str = "destination";
    pub const ID: &str = "id";
    pub const ACK: &str = "ack";
    pub const SUBSCRIPTION: &str = "subscription";
    pub const MESSAGE_ID: &str = "message-id";
    pub const RECEIPT: &str = "receipt";
    pub const RECEIPT_ID: &str = "receipt-id";
    pub const CONTENT_TYPE: &str = "content-type";
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const MESSAGE: &str = "message";
}

/// STOMP frame commands, client and server side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StompCommand {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl StompCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            StompCommand::Connect => "CONNECT",
            StompCommand::Stomp => "STOMP",
            StompCommand::Connected => "CONNECTED",
            StompCommand::Send => "SEND",
            StompCommand::Subscribe => "SUBSCRIBE",
            StompCommand::Unsubscribe => "UNSUBSCRIBE",
            StompCommand::Ack => "ACK",
            StompCommand::Nack => "NACK",
            StompCommand::Begin => "BEGIN",
            StompCommand::Commit => "COMMIT",
            StompCommand::Abort => "ABORT",
            StompCommand::Disconnect => "DISCONNECT",
            StompCommand::Message => "MESSAGE",
            StompCommand::Receipt => "RECEIPT",
            StompCommand::Error => "ERROR",
        }
    }

    /// Header values of CONNECT and CONNECTED frames are never escaped,
    /// so that 1.0 peers can read them.
    fn escapes_headers(&self) -> bool {
        !matches!(
            self,
            StompCommand::Connect | StompCommand::Stomp | StompCommand::Connected
        )
    }
}

impl fmt::Display for StompCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StompCommand {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self> {
        let command = match s {
            "CONNECT" => StompCommand::Connect,
            "STOMP" => StompCommand::Stomp,
            "CONNECTED" => StompCommand::Connected,
            "SEND" => StompCommand::Send,
            "SUBSCRIBE" => StompCommand::Subscribe,
            "UNSUBSCRIBE" => StompCommand::Unsubscribe,
            "ACK" => StompCommand::Ack,
            "NACK" => StompCommand::Nack,
            "BEGIN" => StompCommand::Begin,
            "COMMIT" => StompCommand::Commit,
            "ABORT" => StompCommand::Abort,
            "DISCONNECT" => StompCommand::Disconnect,
            "MESSAGE" => StompCommand::Message,
            "RECEIPT" => StompCommand::Receipt,
            "ERROR" => StompCommand::Error,
            other => {
                return Err(FeedError::protocol(format!("Unknown STOMP command: {}", other)))
            }
        };
        Ok(command)
    }
}

/// A single STOMP frame.
///
/// Headers keep their wire order; when a header repeats, the first
/// occurrence is the one [`StompFrame::get_header`] returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: StompCommand,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StompFrame {
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Appends a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Serializes the frame, NUL terminator included.
    ///
    /// A `content-length` header is added for non-empty bodies unless the
    /// caller already set one.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');

        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }

        if !self.body.is_empty() && self.get_header(headers::CONTENT_LENGTH).is_none() {
            out.push_str(headers::CONTENT_LENGTH);
            out.push(':');
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }

        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decodes every frame contained in one transport message.
    ///
    /// Bare EOLs between frames are heart-beats and are skipped, so a
    /// heart-beat-only message decodes to an empty list.
    pub fn decode_all(input: &str) -> Result<Vec<StompFrame>> {
        let (frames, outcome) = Self::decode_prefix(input);
        outcome.map(|()| frames)
    }

    /// Decodes frames up to the first malformed one.
    ///
    /// Returns the frames that precede the failure along with the failure,
    /// so a corrupt trailing frame does not discard the ones before it.
    pub fn decode_prefix(input: &str) -> (Vec<StompFrame>, Result<()>) {
        let bytes = input.as_bytes();
        let mut frames = Vec::new();
        let mut pos = 0;

        loop {
            while pos < bytes.len() && (bytes[pos] == b'\n' || bytes[pos] == b'\r') {
                pos += 1;
            }
            if pos >= bytes.len() {
                return (frames, Ok(()));
            }
            match Self::decode_at(input, pos) {
                Ok((frame, next)) => {
                    frames.push(frame);
                    pos = next;
                }
                Err(e) => return (frames, Err(e)),
            }
        }
    }

    /// Decodes the frame starting at `start`, returning it along with the
    /// position right after its NUL terminator.
    fn decode_at(input: &str, start: usize) -> Result<(StompFrame, usize)> {
        let bytes = input.as_bytes();

        let (line, mut pos) = read_line(input, start)?;
        let command: StompCommand = line.parse()?;
        let escaped = command.escapes_headers();

        let mut frame = StompFrame::new(command);
        loop {
            let (line, next) = read_line(input, pos)?;
            pos = next;
            if line.is_empty() {
                break;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                FeedError::protocol(format!("Malformed header line: {}", line))
            })?;
            if escaped {
                frame
                    .headers
                    .push((unescape_header(name)?, unescape_header(value)?));
            } else {
                frame.headers.push((name.to_string(), value.to_string()));
            }
        }

        let body_end = match frame.get_header(headers::CONTENT_LENGTH) {
            Some(length) => {
                let length: usize = length.trim().parse().map_err(|_| {
                    FeedError::protocol(format!("Invalid content-length: {}", length))
                })?;
                let end = pos.checked_add(length).ok_or_else(|| {
                    FeedError::protocol(format!("Invalid content-length: {}", length))
                })?;
                if end >= bytes.len() || bytes[end] != 0 {
                    return Err(FeedError::protocol(
                        "Frame body does not match content-length",
                    ));
                }
                end
            }
            None => bytes[pos..]
                .iter()
                .position(|b| *b == 0)
                .map(|offset| pos + offset)
                .ok_or_else(|| FeedError::protocol("Frame is missing its NUL terminator"))?,
        };

        frame.body = String::from_utf8(bytes[pos..body_end].to_vec())
            .map_err(|_| FeedError::protocol("Frame body is not valid UTF-8"))?;

        Ok((frame, body_end + 1))
    }
}

/// Reads one EOL-terminated line, accepting both `\n` and `\r\n`.
fn read_line(input: &str, start: usize) -> Result<(&str, usize)> {
    let rest = &input[start..];
    let newline = rest
        .find('\n')
        .ok_or_else(|| FeedError::protocol("Truncated frame"))?;
    let line = rest[..newline].strip_suffix('\r').unwrap_or(&rest[..newline]);
    Ok((line, start + newline + 1))
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(FeedError::protocol(format!(
                    "Undefined escape sequence in header: \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}
