//! Escape-key handling for the attached terminal.
//!
//! Every keystroke goes to the remote shell except the escape key
//! (Ctrl-]). The byte after it selects a local command. Pressing the
//! escape key twice sends it through.

/// Ctrl-]
pub const ESCAPE_BYTE: u8 = 0x1d;

/// Local commands reachable through the escape key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeCommand {
    /// Leave podterm.
    Quit,
    /// Open a fresh connection.
    Reconnect,
    /// Turn debug mode on or off.
    ToggleDebug,
    /// Switch to the next configured shell.
    CycleShell,
    /// Show the command keys.
    Help,
}

impl EscapeCommand {
    fn from_key(key: u8) -> Option<Self> {
        match key {
            b'q' | b'.' => Some(EscapeCommand::Quit),
            b'r' => Some(EscapeCommand::Reconnect),
            b'd' => Some(EscapeCommand::ToggleDebug),
            b's' => Some(EscapeCommand::CycleShell),
            b'?' | b'h' => Some(EscapeCommand::Help),
            _ => None,
        }
    }
}

/// One decoded piece of keyboard input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    /// Bytes for the remote shell.
    Forward(Vec<u8>),
    /// A local command.
    Command(EscapeCommand),
}

/// Splits raw keyboard input into forwarded bytes and local commands.
///
/// The escape key may arrive at the end of one read and its command key
/// at the start of the next.
#[derive(Debug, Default)]
pub struct EscapeParser {
    armed: bool,
}

impl EscapeParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the escape key was the last byte seen.
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn feed(&mut self, input: &[u8]) -> Vec<KeyAction> {
        let mut actions = Vec::new();
        let mut forward = Vec::new();

        for &byte in input {
            if self.armed {
                self.armed = false;
                if byte == ESCAPE_BYTE {
                    forward.push(ESCAPE_BYTE);
                    continue;
                }
                match EscapeCommand::from_key(byte) {
                    Some(command) => {
                        if !forward.is_empty() {
                            actions.push(KeyAction::Forward(std::mem::take(&mut forward)));
                        }
                        actions.push(KeyAction::Command(command));
                    }
                    None => tracing::debug!(key = byte, "Unknown escape command"),
                }
            } else if byte == ESCAPE_BYTE {
                self.armed = true;
            } else {
                forward.push(byte);
            }
        }

        if !forward.is_empty() {
            actions.push(KeyAction::Forward(forward));
        }
        actions
    }
}
