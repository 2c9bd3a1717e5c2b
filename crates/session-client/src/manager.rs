//! Session manager.
//!
//! The manager owns one session against one container. It drives the
//! connection state machine, forwards keystrokes and geometry to the
//! remote PTY, writes remote output to the local terminal and runs the
//! shell capability heuristic over that output.
//!
//! ```text
//!            connect()              open                status: disconnected
//!   Idle ─────────────▶ Connecting ─────▶ Connected ─────────────────────▶ Disconnected
//!    ▲                      │                 │                                │
//!    │                      └── error/close ──┴──────────▶ Error ◀─────────────┘
//!    │                                                      │   (error frame)
//!    └──── connect() / config setter from Disconnected or Error re-enters Connecting
//! ```
//!
//! All methods are non-blocking. Transport events arrive on a channel and
//! are applied by [`SessionManager::next`] (or
//! [`SessionManager::process_pending`]); each carries the generation of
//! the transport that produced it and is dropped unless that transport is
//! still the live one.

use std::sync::Arc;
use std::time::Duration;

use protocol::{Frame, RemoteStatus, SessionTarget, TerminalSize};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use uuid::Uuid;

use crate::debug::{DebugAttachCoordinator, DebugChange, DEFAULT_DEBUG_IMAGE};
use crate::detector::{
    ShellCapabilityDetector, ShellFailureTracker, ShellMark, DEFAULT_FAILURE_SIGNATURES,
};
use crate::error::SessionError;
use crate::resize::{ResizeThrottle, DEFAULT_RESIZE_INTERVAL};
use crate::terminal::TerminalEmulator;
use crate::transport::{
    EventSender, Generation, Transport, TransportConnector, TransportEvent, TransportEventKind,
};

/// Shells tried against a container, in order of preference.
pub const DEFAULT_SHELLS: &[&str] = &["/bin/bash", "/bin/sh"];

/// Message attached to a graceful end of session.
pub const SESSION_ENDED_MESSAGE: &str = "Session ended";

/// Buffer size for the event broadcast channel.
const EVENT_BUFFER_SIZE: usize = 64;

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Created, never connected.
    Idle,
    /// Transport opening.
    Connecting,
    /// Transport open; input and resize frames flow.
    Connected,
    /// Session ended normally or was disconnected by the user.
    Disconnected,
    /// Session failed.
    Error,
}

impl ConnectionState {
    /// Whether `connect()` is accepted in this state.
    pub fn can_connect(self) -> bool {
        matches!(
            self,
            ConnectionState::Idle | ConnectionState::Disconnected | ConnectionState::Error
        )
    }

    /// Lowercase name of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Error => "error",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-fatal suggestions for the user. Never acted on automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Advisory {
    /// Every configured shell failed to start; the container is probably
    /// distroless and a debug container may help.
    ShellUnavailable {
        /// Shells that failed, in configured order.
        failed_shells: Vec<String>,
    },
}

/// Events emitted by the session manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SessionEvent {
    /// Connection state changed.
    StateChanged(ConnectionState),
    /// The remote side ended the session normally.
    SessionEnded { message: String },
    /// The session failed; `message` is shown to the user verbatim.
    Error { message: String },
    /// A heuristic suggestion.
    Advisory(Advisory),
    /// A configuration change replaced the connection.
    Reconnecting { reason: String },
}

/// Initial session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Shells the user can pick from. The distroless heuristic counts
    /// failures against this list.
    pub shells: Vec<String>,
    /// Shell for the first connection.
    pub shell: String,
    /// Start in debug mode.
    pub debug_mode: bool,
    /// Image for debug containers.
    pub debug_image: String,
    /// Output fragments that mark a failed shell exec.
    pub failure_signatures: Vec<String>,
    /// Resize coalescing interval.
    pub resize_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        let shells: Vec<String> = DEFAULT_SHELLS.iter().map(|s| s.to_string()).collect();
        Self {
            shell: shells[0].clone(),
            shells,
            debug_mode: false,
            debug_image: DEFAULT_DEBUG_IMAGE.to_string(),
            failure_signatures: DEFAULT_FAILURE_SIGNATURES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            resize_interval: DEFAULT_RESIZE_INTERVAL,
        }
    }
}

/// Interactive session against one container.
pub struct SessionManager<T: TerminalEmulator> {
    /// Identifier used in logs.
    id: Uuid,
    target: SessionTarget,
    shells: Vec<String>,
    shell: String,
    connector: Arc<dyn TransportConnector>,
    terminal: T,
    state: ConnectionState,
    /// The single live transport, if any.
    transport: Option<Box<dyn Transport>>,
    /// Generation of the most recently opened transport.
    generation: Generation,
    events_tx: EventSender,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    /// Start of a UTF-8 sequence split across two `send_input` calls.
    input_tail: Vec<u8>,
    detector: ShellCapabilityDetector,
    tracker: ShellFailureTracker,
    debug: DebugAttachCoordinator,
    /// Last geometry reported by the terminal.
    geometry: TerminalSize,
    resize: ResizeThrottle,
    notify: broadcast::Sender<SessionEvent>,
    shut_down: bool,
}

impl<T: TerminalEmulator> SessionManager<T> {
    /// Creates an idle session. Nothing is connected until [`connect`](Self::connect).
    pub fn new(
        target: SessionTarget,
        options: SessionOptions,
        connector: Arc<dyn TransportConnector>,
        terminal: T,
    ) -> Result<Self, SessionError> {
        let mut shells = Vec::new();
        for shell in options.shells {
            if !shells.contains(&shell) {
                shells.push(shell);
            }
        }
        if shells.is_empty() {
            shells.push(options.shell.clone());
        }
        if !shells.contains(&options.shell) {
            return Err(SessionError::UnknownShell(options.shell));
        }

        let mut debug = DebugAttachCoordinator::new(options.debug_image.clone());
        if options.debug_mode {
            debug.enter_debug_mode(&options.debug_image)?;
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notify, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        let geometry = terminal.size();

        Ok(Self {
            id: Uuid::new_v4(),
            target,
            tracker: ShellFailureTracker::new(shells.iter().cloned()),
            shells,
            shell: options.shell,
            connector,
            terminal,
            state: ConnectionState::Idle,
            transport: None,
            generation: Generation::default(),
            events_tx,
            events_rx,
            input_tail: Vec::new(),
            detector: ShellCapabilityDetector::new(&options.failure_signatures),
            debug,
            geometry,
            resize: ResizeThrottle::new(options.resize_interval),
            notify,
            shut_down: false,
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Identifier used in log records.
    pub fn session_id(&self) -> Uuid {
        self.id
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The container this session attaches to.
    pub fn target(&self) -> &SessionTarget {
        &self.target
    }

    /// Shell used for exec connections.
    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Configured shells.
    pub fn shells(&self) -> &[String] {
        &self.shells
    }

    /// Current configuration, as it would be used for the next connection.
    pub fn options(&self) -> SessionOptions {
        SessionOptions {
            shells: self.shells.clone(),
            shell: self.shell.clone(),
            debug_mode: self.debug.is_enabled(),
            debug_image: self.debug.image().to_string(),
            failure_signatures: self.detector.signatures().to_vec(),
            resize_interval: self.resize.interval(),
        }
    }

    /// Whether connections go through a debug container.
    pub fn is_debug_mode(&self) -> bool {
        self.debug.is_enabled()
    }

    /// Image used for debug containers.
    pub fn debug_image(&self) -> &str {
        self.debug.image()
    }

    /// Generation of the most recently opened transport.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Whether the container has been flagged as having no usable shell.
    pub fn is_distroless(&self) -> bool {
        self.tracker.is_distroless()
    }

    /// Shells that failed against this container.
    pub fn failed_shells(&self) -> Vec<String> {
        self.tracker.failed_shells()
    }

    /// Last known terminal geometry.
    pub fn geometry(&self) -> TerminalSize {
        self.geometry
    }

    /// The local terminal.
    pub fn terminal(&self) -> &T {
        &self.terminal
    }

    /// The local terminal, mutably.
    pub fn terminal_mut(&mut self) -> &mut T {
        &mut self.terminal
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Subscribes to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.notify.subscribe()
    }

    // ------------------------------------------------------------------
    // User operations
    // ------------------------------------------------------------------

    /// Opens a new connection. Valid from idle, disconnected and error.
    pub fn connect(&mut self) -> Result<(), SessionError> {
        self.ensure_live()?;
        if !self.state.can_connect() {
            return Err(SessionError::InvalidTransition {
                op: "connect",
                state: self.state,
            });
        }
        self.open_transport()
    }

    /// The "Reconnect" action offered after an error or a session end.
    pub fn retry(&mut self) -> Result<(), SessionError> {
        self.connect()
    }

    /// Closes the connection at the user's request.
    pub fn disconnect(&mut self) {
        if self.shut_down {
            return;
        }
        self.teardown();
        if self.state != ConnectionState::Idle {
            tracing::info!(session_id = %self.id, "Session disconnected by user");
            self.set_state(ConnectionState::Disconnected);
        }
    }

    /// Forwards keystrokes. Dropped unless connected.
    ///
    /// A multi-byte character cut off at the end of `data` is held back
    /// and sent with the next call. Returns whether the input was taken:
    /// handed to the transport, or held back as such a partial character.
    pub fn send_input(&mut self, data: &[u8]) -> bool {
        if self.state != ConnectionState::Connected || data.is_empty() {
            tracing::trace!(
                session_id = %self.id,
                state = %self.state,
                len = data.len(),
                "Dropping input"
            );
            return false;
        }

        let mut bytes = std::mem::take(&mut self.input_tail);
        bytes.extend_from_slice(data);
        let split = bytes.len() - incomplete_utf8_suffix(&bytes);
        self.input_tail = bytes.split_off(split);
        if bytes.is_empty() {
            return true;
        }

        match self.transport {
            Some(ref transport) => transport.send(&Frame::input(&bytes)),
            None => false,
        }
    }

    /// Records new terminal geometry and forwards it when connected.
    ///
    /// Bursts are coalesced; the latest geometry always wins. While not
    /// connected the geometry is applied when the next connection opens.
    pub fn resize(&mut self, cols: u16, rows: u16) {
        if cols == 0 || rows == 0 {
            tracing::debug!(cols, rows, "Ignoring empty terminal geometry");
            return;
        }
        let size = TerminalSize::new(cols, rows);
        self.geometry = size;

        if self.state != ConnectionState::Connected {
            return;
        }
        if let Some(size) = self.resize.request(size, Instant::now()) {
            self.send_resize(size);
        }
    }

    /// Sends a coalesced geometry whose interval has elapsed.
    pub fn flush_resize(&mut self) {
        if self.state != ConnectionState::Connected {
            return;
        }
        if let Some(size) = self.resize.flush(Instant::now()) {
            self.send_resize(size);
        }
    }

    /// Switches exec sessions to another configured shell.
    pub fn set_shell(&mut self, shell: &str) -> Result<(), SessionError> {
        self.ensure_live()?;
        if !self.shells.iter().any(|s| s == shell) {
            return Err(SessionError::UnknownShell(shell.to_string()));
        }
        if self.shell == shell {
            return Ok(());
        }
        self.shell = shell.to_string();
        self.reconnect("shell changed")
    }

    /// Switches to another container of the same pod.
    ///
    /// Shell failures are a property of the container, so they are
    /// forgotten.
    pub fn set_container(&mut self, container: &str) -> Result<(), SessionError> {
        self.ensure_live()?;
        if self.target.container == container {
            return Ok(());
        }
        self.target = self.target.with_container(container);
        self.tracker.clear();
        self.detector.reset();
        self.reconnect("container changed")
    }

    /// Turns debug mode on or off. `image` overrides the debug image when
    /// turning it on.
    pub fn set_debug_mode(&mut self, enabled: bool, image: Option<&str>) -> Result<(), SessionError> {
        self.ensure_live()?;
        let change = if enabled {
            let image = image.unwrap_or(self.debug.image()).to_string();
            self.debug.enter_debug_mode(&image)?
        } else {
            self.debug.exit_debug_mode()
        };

        if change == DebugChange::Entered {
            // A debug image brings its own shell; the heuristic no longer applies.
            self.tracker.clear();
            self.detector.reset();
        }

        if !change.requires_reconnect() {
            return Ok(());
        }
        let reason = match change {
            DebugChange::Entered => "debug mode enabled",
            DebugChange::Exited => "debug mode disabled",
            _ => "debug image changed",
        };
        self.reconnect(reason)
    }

    /// Changes the debug image, reconnecting if debug mode is on.
    pub fn set_debug_image(&mut self, image: &str) -> Result<(), SessionError> {
        self.ensure_live()?;
        if self.debug.change_debug_image(image)?.requires_reconnect() {
            self.reconnect("debug image changed")
        } else {
            Ok(())
        }
    }

    /// Destroys the session: closes the transport, stops forwarding and
    /// forgets heuristic state. Further calls are no-ops.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.teardown();
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            self.set_state(ConnectionState::Disconnected);
        }
        self.shut_down = true;
        self.detector.reset();
        self.tracker.clear();
        self.resize.reset();
        tracing::info!(session_id = %self.id, target = %self.target, "Session shut down");
    }

    // ------------------------------------------------------------------
    // Event loop
    // ------------------------------------------------------------------

    /// Runs one step of the event loop: waits for the next transport event
    /// or the pending resize deadline and applies it.
    ///
    /// Returns false once the session has been shut down.
    pub async fn next(&mut self) -> bool {
        if self.shut_down {
            return false;
        }

        let deadline = match self.state {
            ConnectionState::Connected => self.resize.deadline(),
            _ => None,
        };
        let resize_due = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            event = self.events_rx.recv() => {
                if let Some(event) = event {
                    self.handle_transport_event(event);
                }
            }
            _ = resize_due => self.flush_resize(),
        }

        !self.shut_down
    }

    /// Applies every transport event already queued, without waiting.
    ///
    /// Returns the number of events taken off the queue.
    pub fn process_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_transport_event(event);
            count += 1;
        }
        count
    }

    /// Applies one transport event.
    ///
    /// Events from any transport other than the live one are discarded
    /// without side effects.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        if self.shut_down {
            return;
        }
        let live = self.transport.as_ref().map(|t| t.generation());
        if live != Some(event.generation) {
            tracing::trace!(
                session_id = %self.id,
                generation = %event.generation,
                current = %self.generation,
                "Discarding stale transport event"
            );
            return;
        }

        match event.kind {
            TransportEventKind::Open => self.on_open(),
            TransportEventKind::Frame(frame) => self.on_frame(frame),
            TransportEventKind::Raw(text) => self.on_output(&text),
            TransportEventKind::Error(message) => {
                tracing::warn!(session_id = %self.id, generation = %event.generation, %message, "Transport error");
                self.fail(message);
            }
            TransportEventKind::Close { code, reason } => self.on_close(code, reason),
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_live(&self) -> Result<(), SessionError> {
        if self.shut_down {
            return Err(SessionError::ShutDown);
        }
        Ok(())
    }

    fn emit(&self, event: SessionEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.notify.send(event);
    }

    fn set_state(&mut self, new_state: ConnectionState) {
        if self.state == new_state {
            return;
        }
        tracing::info!(
            session_id = %self.id,
            generation = %self.generation,
            from = %self.state,
            to = %new_state,
            "Session state changed"
        );
        self.state = new_state;
        self.emit(SessionEvent::StateChanged(new_state));
    }

    /// Closes the live transport, if any. Returns whether one was closed.
    fn teardown(&mut self) -> bool {
        match self.transport.take() {
            Some(mut transport) => {
                transport.close();
                true
            }
            None => false,
        }
    }

    fn open_transport(&mut self) -> Result<(), SessionError> {
        self.teardown();
        if !self.debug.is_enabled() {
            self.detector.reset();
        }
        self.resize.reset();
        self.input_tail.clear();
        self.generation = self.generation.next();

        let params = self.debug.endpoint_params(&self.target, &self.shell);
        tracing::info!(
            session_id = %self.id,
            generation = %self.generation,
            target = %self.target,
            shell = %self.shell,
            debug = params.is_debug(),
            "Connecting session"
        );
        self.set_state(ConnectionState::Connecting);

        match self
            .connector
            .open(&params, self.generation, self.events_tx.clone())
        {
            Ok(transport) => {
                self.transport = Some(transport);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "Failed to open transport");
                self.fail(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Replaces the connection after a configuration change.
    ///
    /// An idle session only records the change.
    fn reconnect(&mut self, reason: &str) -> Result<(), SessionError> {
        if self.state == ConnectionState::Idle {
            return Ok(());
        }
        tracing::info!(session_id = %self.id, %reason, "Reconnecting session");
        self.teardown();
        self.emit(SessionEvent::Reconnecting {
            reason: reason.to_string(),
        });
        self.open_transport()
    }

    fn send_resize(&self, size: TerminalSize) {
        if let Some(ref transport) = self.transport {
            tracing::trace!(cols = size.cols, rows = size.rows, "Sending resize");
            transport.send(&Frame::resize(size));
        }
    }

    fn on_open(&mut self) {
        if self.state != ConnectionState::Connecting {
            tracing::debug!(session_id = %self.id, state = %self.state, "Ignoring open outside connecting");
            return;
        }
        self.set_state(ConnectionState::Connected);
        let size = self.resize.force(self.geometry, Instant::now());
        self.send_resize(size);
    }

    fn on_frame(&mut self, frame: Frame) {
        match frame {
            Frame::Output { data } => self.on_output(&data),
            Frame::Status {
                status: RemoteStatus::Disconnected,
            } => self.on_remote_end(),
            Frame::Status { status } => {
                tracing::debug!(session_id = %self.id, ?status, "Ignoring status frame");
            }
            Frame::Error { error } => {
                tracing::warn!(session_id = %self.id, %error, "Remote error");
                self.fail(error);
            }
            other => {
                tracing::debug!(session_id = %self.id, kind = other.kind(), "Ignoring client frame sent by server");
            }
        }
    }

    fn on_output(&mut self, data: &str) {
        self.terminal.write(data.as_bytes());

        if self.debug.is_enabled() {
            return;
        }
        if self.detector.feed(data) {
            self.record_shell_failure();
        }
    }

    fn record_shell_failure(&mut self) {
        match self.tracker.mark_failed(&self.shell) {
            ShellMark::NewlyFailed { failed, total } => {
                tracing::info!(
                    session_id = %self.id,
                    shell = %self.shell,
                    failed,
                    total,
                    "Shell failed to start"
                );
                if self.tracker.all_failed() && !self.tracker.is_distroless() {
                    self.tracker.set_distroless();
                    let failed_shells = self.tracker.failed_shells();
                    tracing::warn!(
                        session_id = %self.id,
                        target = %self.target,
                        ?failed_shells,
                        "Container appears to have no usable shell"
                    );
                    self.emit(SessionEvent::Advisory(Advisory::ShellUnavailable {
                        failed_shells,
                    }));
                }
            }
            ShellMark::AlreadyFailed => {
                tracing::debug!(session_id = %self.id, shell = %self.shell, "Shell already marked failed");
            }
            ShellMark::Unconfigured => {
                tracing::debug!(session_id = %self.id, shell = %self.shell, "Failed shell is not configured");
            }
        }
    }

    fn on_remote_end(&mut self) {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            return;
        }
        self.teardown();
        self.set_state(ConnectionState::Disconnected);
        self.emit(SessionEvent::SessionEnded {
            message: SESSION_ENDED_MESSAGE.to_string(),
        });
    }

    fn on_close(&mut self, code: Option<u16>, reason: String) {
        let message = match (code, reason.is_empty()) {
            (_, false) => format!("connection closed: {}", reason),
            (Some(code), true) => format!("connection closed (code {})", code),
            (None, true) => "connection closed unexpectedly".to_string(),
        };
        tracing::warn!(session_id = %self.id, ?code, %reason, "Transport closed without session end");
        self.fail(message);
    }

    fn fail(&mut self, message: String) {
        self.teardown();
        self.set_state(ConnectionState::Error);
        self.emit(SessionEvent::Error { message });
    }
}

impl<T: TerminalEmulator> Drop for SessionManager<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Length of a UTF-8 sequence left unfinished at the end of `bytes`.
fn incomplete_utf8_suffix(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if width > back { back } else { 0 };
    }
    0
}
