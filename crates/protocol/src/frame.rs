//! Wire frames exchanged over a terminal session channel.
//!
//! Every frame is a JSON object tagged by `type`. Clients send `input` and
//! `resize`; servers send `output`, `status` and `error`. Anything a server
//! writes that is not a JSON object is treated as raw terminal text.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Terminal width used when the emulator cannot report its geometry.
pub const DEFAULT_COLS: u16 = 80;

/// Terminal height used when the emulator cannot report its geometry.
pub const DEFAULT_ROWS: u16 = 24;

/// Terminal geometry in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TerminalSize {
    /// Number of columns.
    pub cols: u16,
    /// Number of rows.
    pub rows: u16,
}

impl TerminalSize {
    /// Creates a new terminal size.
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self {
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
        }
    }
}

/// Session status reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    /// The remote process attached successfully.
    Connected,
    /// The remote process ended and the server is closing the session.
    Disconnected,
    /// Any status this client does not know about.
    #[serde(other)]
    Other,
}

/// A single message on the session channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// Keystrokes for the remote PTY (client to server).
    Input {
        /// Input text.
        data: String,
    },
    /// PTY output (server to client).
    Output {
        /// Output text.
        data: String,
    },
    /// Terminal geometry change (client to server).
    Resize {
        /// New terminal columns.
        cols: u16,
        /// New terminal rows.
        rows: u16,
    },
    /// Session status notification (server to client).
    Status {
        /// Reported status.
        status: RemoteStatus,
    },
    /// Remote failure, e.g. pod or container not found (server to client).
    Error {
        /// Human-readable error message.
        error: String,
    },
}

impl Frame {
    /// Builds an input frame from raw keystroke bytes.
    ///
    /// Invalid UTF-8 sequences are replaced, since the wire carries strings.
    pub fn input(bytes: &[u8]) -> Self {
        Frame::Input {
            data: String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    /// Builds a resize frame for the given geometry.
    pub fn resize(size: TerminalSize) -> Self {
        Frame::Resize {
            cols: size.cols,
            rows: size.rows,
        }
    }

    /// Returns the frame's `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Input { .. } => "input",
            Frame::Output { .. } => "output",
            Frame::Resize { .. } => "resize",
            Frame::Status { .. } => "status",
            Frame::Error { .. } => "error",
        }
    }

    /// Encodes the frame as JSON text.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Strictly decodes a frame from JSON text.
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Result of leniently decoding a server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A well-formed frame.
    Frame(Frame),
    /// Text that is not a structured message; written to the terminal as-is.
    Raw(String),
    /// A JSON object that does not describe a known frame.
    Unknown(String),
}

/// Decodes text received from the server.
///
/// Text that does not parse as a JSON object degrades to [`Incoming::Raw`]
/// so that plain output from older servers still reaches the terminal.
pub fn decode_incoming(text: &str) -> Incoming {
    let value = match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value @ serde_json::Value::Object(_)) => value,
        _ => return Incoming::Raw(text.to_string()),
    };

    match serde_json::from_value::<Frame>(value) {
        Ok(frame) => Incoming::Frame(frame),
        Err(e) => Incoming::Unknown(e.to_string()),
    }
}
