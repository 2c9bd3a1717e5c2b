//! Local terminal backed by the process's stdout.

use std::io::{self, Stdout, Write};

use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use protocol::TerminalSize;
use session_client::TerminalEmulator;

/// Puts the controlling terminal in raw mode for as long as it lives.
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    pub fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self { _private: () })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        // Best effort cleanup
        let _ = disable_raw_mode();
    }
}

/// Writes remote output straight to stdout.
pub struct StdoutTerminal {
    stdout: Stdout,
    fallback: TerminalSize,
}

impl StdoutTerminal {
    pub fn new() -> Self {
        Self {
            stdout: io::stdout(),
            fallback: TerminalSize::default(),
        }
    }

    /// Prints a local message on its own line.
    ///
    /// Raw mode disables newline translation, hence the explicit `\r\n`.
    pub fn notice(&mut self, message: &str) {
        let line = format!("\r\n\x1b[2m[podterm] {}\x1b[0m\r\n", message);
        self.write(line.as_bytes());
    }
}

impl Default for StdoutTerminal {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalEmulator for StdoutTerminal {
    fn write(&mut self, data: &[u8]) {
        let mut out = self.stdout.lock();
        if let Err(e) = out.write_all(data).and_then(|_| out.flush()) {
            tracing::warn!(error = %e, "Failed to write to stdout");
        }
    }

    fn size(&self) -> TerminalSize {
        match crossterm::terminal::size() {
            Ok((cols, rows)) if cols > 0 && rows > 0 => TerminalSize::new(cols, rows),
            Ok(_) => self.fallback,
            Err(e) => {
                tracing::debug!(error = %e, "Terminal size unavailable, using default");
                self.fallback
            }
        }
    }
}

/// Terminal resize notifications (`SIGWINCH`).
pub struct WindowChanges {
    #[cfg(unix)]
    signal: tokio::signal::unix::Signal,
}

impl WindowChanges {
    #[cfg(unix)]
    pub fn new() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            signal: signal(SignalKind::window_change())?,
        })
    }

    #[cfg(not(unix))]
    pub fn new() -> io::Result<Self> {
        Ok(Self {})
    }

    /// Waits for the next geometry change.
    pub async fn recv(&mut self) {
        #[cfg(unix)]
        if self.signal.recv().await.is_some() {
            return;
        }
        std::future::pending::<()>().await
    }
}
