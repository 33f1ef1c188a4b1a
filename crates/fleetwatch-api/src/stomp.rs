//! STOMP 1.2 frame codec.
//!
//! Frames travel as WebSocket text messages:
//!
//! ```text
//! COMMAND\n
//! header:value\n
//! \n
//! body\0
//! ```
//!
//! A text message may carry several NUL-terminated frames, and a lone
//! end-of-line is a heart-beat. Header values are escaped per STOMP 1.2
//! except on `CONNECT`/`CONNECTED`, which STOMP 1.2 leaves unescaped.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Error;

const NUL: char = '\0';

// ── FrameCommand ─────────────────────────────────────────────────────

/// STOMP frame commands used by the client and broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCommand {
    // Client frames
    Connect,
    Stomp,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
    // Server frames
    Connected,
    Message,
    Receipt,
    Error,
}

impl FrameCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Disconnect => "DISCONNECT",
            Self::Connected => "CONNECTED",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// `CONNECT` and `CONNECTED` headers are never escaped.
    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected | Self::Stomp)
    }
}

impl fmt::Display for FrameCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrameCommand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" => Ok(Self::Connect),
            "STOMP" => Ok(Self::Stomp),
            "SEND" => Ok(Self::Send),
            "SUBSCRIBE" => Ok(Self::Subscribe),
            "UNSUBSCRIBE" => Ok(Self::Unsubscribe),
            "DISCONNECT" => Ok(Self::Disconnect),
            "CONNECTED" => Ok(Self::Connected),
            "MESSAGE" => Ok(Self::Message),
            "RECEIPT" => Ok(Self::Receipt),
            "ERROR" => Ok(Self::Error),
            other => Err(Error::Frame(format!("unknown command '{other}'"))),
        }
    }
}

// ── Frame ────────────────────────────────────────────────────────────

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: FrameCommand,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: FrameCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Append a header (builder style).
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the frame body (builder style).
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Look up a header. When repeated, the first occurrence wins.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    // ── Client frame builders ────────────────────────────────────────

    /// `CONNECT` frame with optional bearer token and heart-beat offer.
    pub fn connect(host: &str, token: Option<&str>, heartbeat: Duration) -> Self {
        let hb = heartbeat.as_millis();
        let mut frame = Self::new(FrameCommand::Connect)
            .header("accept-version", "1.2,1.1")
            .header("host", host)
            .header("heart-beat", format!("{hb},{hb}"));
        if let Some(token) = token {
            frame = frame.header("Authorization", format!("Bearer {token}"));
        }
        frame
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(FrameCommand::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Self::new(FrameCommand::Unsubscribe).header("id", id)
    }

    /// `SEND` frame carrying a JSON body.
    pub fn send(destination: &str, body: impl Into<String>) -> Self {
        let body = body.into();
        Self::new(FrameCommand::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .header("content-length", body.len().to_string())
            .with_body(body)
    }

    pub fn disconnect(receipt: &str) -> Self {
        Self::new(FrameCommand::Disconnect).header("receipt", receipt)
    }

    // ── Codec ────────────────────────────────────────────────────────

    /// Serialize to wire text, including the terminating NUL.
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
        out.push('\n');
        out.push_str(&self.body);
        out.push(NUL);
        out
    }

    /// Decode every frame contained in one WebSocket text message.
    ///
    /// Heart-beats (bare EOLs between frames) are skipped, so a message
    /// that is only a heart-beat yields an empty vec.
    pub fn decode_all(raw: &str) -> Result<Vec<Self>, Error> {
        raw.split(NUL)
            .map(|chunk| chunk.trim_start_matches(['\r', '\n']))
            .filter(|chunk| !chunk.is_empty())
            .map(Self::decode_one)
            .collect()
    }

    fn decode_one(chunk: &str) -> Result<Self, Error> {
        let (head, body) = split_head(chunk)
            .ok_or_else(|| Error::Frame("missing blank line after headers".into()))?;

        let mut lines = head.lines();
        let command_line = lines
            .next()
            .ok_or_else(|| Error::Frame("empty frame".into()))?;
        let command: FrameCommand = command_line.trim_end_matches('\r').parse()?;
        let unescape = command.escapes_headers();

        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| Error::Frame(format!("header without ':' in '{line}'")))?;
            if unescape {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_owned(), value.to_owned()));
            }
        }

        let mut frame = Self {
            command,
            headers,
            body: body.to_owned(),
        };

        // Honour content-length when it is shorter than what we received.
        if let Some(len) = frame.get("content-length").and_then(|v| v.parse::<usize>().ok()) {
            if len < frame.body.len() && frame.body.is_char_boundary(len) {
                frame.body.truncate(len);
            }
        }

        Ok(frame)
    }
}

/// Split a frame into header block and body at the first blank line.
fn split_head(chunk: &str) -> Option<(&str, &str)> {
    let lf = chunk.find("\n\n").map(|i| (i, 2));
    let crlf = chunk.find("\r\n\r\n").map(|i| (i, 4));
    let (idx, sep) = match (lf, crlf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        // A frame with no headers and no body: "COMMAND\n"
        (None, None) => return chunk.ends_with('\n').then_some((chunk, "")),
    };
    Some((&chunk[..idx], &chunk[idx + sep..]))
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String, Error> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some(other) => {
                return Err(Error::Frame(format!("invalid escape '\\{other}'")));
            }
            None => return Err(Error::Frame("dangling escape".into())),
        }
    }
    Ok(out)
}

// ── Tests ────────────────────────────────────────────────────────────
