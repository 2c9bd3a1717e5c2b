//! Terminal emulator collaborator.
//!
//! Rendering and keyboard handling live outside this crate. The session
//! manager only needs somewhere to write output and a way to ask for the
//! current geometry.

use protocol::TerminalSize;

/// The local end of a session.
pub trait TerminalEmulator: Send {
    /// Writes remote output verbatim.
    fn write(&mut self, data: &[u8]);

    /// Current geometry.
    fn size(&self) -> TerminalSize;
}

/// In-memory terminal that records everything written to it.
#[derive(Debug, Clone, Default)]
pub struct BufferTerminal {
    output: Vec<u8>,
    size: TerminalSize,
}

impl BufferTerminal {
    /// Creates a buffer terminal with the given geometry.
    pub fn new(size: TerminalSize) -> Self {
        Self {
            output: Vec::new(),
            size,
        }
    }

    /// Everything written so far.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Everything written so far, as lossy UTF-8.
    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    /// Changes the reported geometry.
    pub fn set_size(&mut self, size: TerminalSize) {
        self.size = size;
    }
}

impl TerminalEmulator for BufferTerminal {
    fn write(&mut self, data: &[u8]) {
        self.output.extend_from_slice(data);
    }

    fn size(&self) -> TerminalSize {
        self.size
    }
}
