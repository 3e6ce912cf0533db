//! STOMP Frames
//!
//! Codec for the STOMP 1.2 subset spoken over `/ws`. One WebSocket text
//! message carries one frame; a message made only of EOLs is a heartbeat.

/// Frame commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
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

impl Command {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "CONNECT" => Some(Self::Connect),
            "STOMP" => Some(Self::Stomp),
            "SEND" => Some(Self::Send),
            "SUBSCRIBE" => Some(Self::Subscribe),
            "UNSUBSCRIBE" => Some(Self::Unsubscribe),
            "DISCONNECT" => Some(Self::Disconnect),
            "CONNECTED" => Some(Self::Connected),
            "MESSAGE" => Some(Self::Message),
            "RECEIPT" => Some(Self::Receipt),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
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

    /// CONNECT and CONNECTED headers are not escaped
    fn escapes_headers(&self) -> bool {
        !matches!(self, Self::Connect | Self::Stomp | Self::Connected)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Malformed header line: {0}")]
    MalformedHeader(String),

    #[error("Invalid header escape sequence")]
    InvalidEscape,

    #[error("Frame is missing its NULL terminator")]
    Unterminated,

    #[error("Invalid content-length")]
    InvalidContentLength,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header; repeated headers keep the first occurrence
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Decode one frame. `Ok(None)` means the text was a heartbeat.
    pub fn parse(text: &str) -> Result<Option<Frame>, FrameError> {
        let text = text.trim_start_matches(['\r', '\n']);
        if text.is_empty() {
            return Ok(None);
        }

        // Headers end at the first blank line, whichever EOL style it uses
        let (head, rest) = match (text.find("\n\n"), text.find("\r\n\r\n")) {
            (Some(lf), Some(crlf)) if crlf < lf => (&text[..crlf], &text[crlf + 4..]),
            (Some(lf), _) => (&text[..lf], &text[lf + 2..]),
            (None, Some(crlf)) => (&text[..crlf], &text[crlf + 4..]),
            (None, None) => return Err(FrameError::Unterminated),
        };

        let mut lines = head.lines();
        let command_line = lines.next().unwrap_or_default().trim_end_matches('\r');
        let command = Command::from_str(command_line)
            .ok_or_else(|| FrameError::UnknownCommand(command_line.to_string()))?;

        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if command.escapes_headers() {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| v.parse::<usize>().map_err(|_| FrameError::InvalidContentLength))
            .transpose()?;

        let body = match content_length {
            Some(len) => {
                let bytes = rest.as_bytes();
                if bytes.len() < len || bytes.get(len) != Some(&0) {
                    return Err(FrameError::Unterminated);
                }
                String::from_utf8_lossy(&bytes[..len]).into_owned()
            }
            None => {
                let end = rest.find('\0').ok_or(FrameError::Unterminated)?;
                rest[..end].to_string()
            }
        };

        Ok(Some(Frame {
            command,
            headers,
            body,
        }))
    }

    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if self.command.escapes_headers() {
                out.push_str(&escape(name));
                out.push(':');
                out.push_str(&escape(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str("content-length:");
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    // ==========================================================================
    // Server frames
    // ==========================================================================

    pub fn connected(heart_beat_ms: u64, user_name: &str) -> Self {
        Frame::new(Command::Connected)
            .header("version", "1.2")
            .header("heart-beat", format!("{},{}", heart_beat_ms, heart_beat_ms))
            .header("user-name", user_name)
    }

    pub fn message(destination: &str, subscription: &str, message_id: &str, body: String) -> Self {
        Frame::new(Command::Message)
            .header("destination", destination)
            .header("subscription", subscription)
            .header("message-id", message_id)
            .header("content-type", "application/json")
            .body(body)
    }

    pub fn receipt(receipt_id: &str) -> Self {
        Frame::new(Command::Receipt).header("receipt-id", receipt_id)
    }

    pub fn error(message: &str, details: &str) -> Self {
        Frame::new(Command::Error)
            .header("message", message)
            .header("content-type", "text/plain")
            .body(details)
    }
}

/// Outgoing heartbeat
pub const HEARTBEAT: &str = "\n";

/// Client heart-beat header `cx,cy`; absent or invalid means `0,0`
pub fn parse_heart_beat(value: Option<&str>) -> (u64, u64) {
    value
        .and_then(|v| v.split_once(','))
        .and_then(|(cx, cy)| Some((cx.trim().parse().ok()?, cy.trim().parse().ok()?)))
        .unwrap_or((0, 0))
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
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
            _ => return Err(FrameError::InvalidEscape),
        }
    }
    Ok(out)
}
