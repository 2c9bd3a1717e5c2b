//! Session lifecycle tests.
//!
//! These drive a [`SessionManager`] against a scripted connector so every
//! transport event can be injected deterministically:
//! - Connection state transitions
//! - Reconnect on configuration change
//! - Stale generation handling
//! - Distroless detection and debug mode
//! - Input gating and resize coalescing

use std::sync::{Arc, Mutex};

use protocol::error::{ProtocolError, Result};
use protocol::{EndpointParams, Frame, RemoteStatus, SessionTarget, TerminalSize};
use session_client::{
    Advisory, BufferTerminal, ConnectionState, EventSender, Generation, SessionError,
    SessionEvent, SessionManager, SessionOptions, Transport, TransportConnector, TransportEvent,
    TransportEventKind, SESSION_ENDED_MESSAGE,
};
use tokio::sync::broadcast;

// =============================================================================
// Scripted transport
// =============================================================================

#[derive(Default)]
struct Log {
    opened: Vec<(EndpointParams, Generation)>,
    senders: Vec<(Generation, EventSender)>,
    sent: Vec<(Generation, Frame)>,
    closed: Vec<Generation>,
    refuse_next: bool,
}

#[derive(Clone, Default)]
struct MockConnector {
    log: Arc<Mutex<Log>>,
}

impl MockConnector {
    fn opened(&self) -> Vec<(EndpointParams, Generation)> {
        self.log.lock().unwrap().opened.clone()
    }

    fn last_params(&self) -> EndpointParams {
        self.opened().last().expect("nothing opened").0.clone()
    }

    fn sent(&self) -> Vec<Frame> {
        self.log
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|(_, f)| f.clone())
            .collect()
    }

    fn closed(&self) -> Vec<Generation> {
        self.log.lock().unwrap().closed.clone()
    }

    fn refuse_next(&self) {
        self.log.lock().unwrap().refuse_next = true;
    }

    /// Posts an event as the transport of `generation` would.
    fn post(&self, generation: Generation, kind: TransportEventKind) {
        let log = self.log.lock().unwrap();
        let (_, sender) = log
            .senders
            .iter()
            .find(|(g, _)| *g == generation)
            .expect("no transport with that generation");
        sender.send(TransportEvent::new(generation, kind)).unwrap();
    }
}

impl TransportConnector for MockConnector {
    fn open(
        &self,
        params: &EndpointParams,
        generation: Generation,
        events: EventSender,
    ) -> Result<Box<dyn Transport>> {
        let mut log = self.log.lock().unwrap();
        if log.refuse_next {
            log.refuse_next = false;
            return Err(ProtocolError::Transport("connection refused".to_string()));
        }
        log.opened.push((params.clone(), generation));
        log.senders.push((generation, events));
        Ok(Box::new(MockTransport {
            generation,
            log: self.log.clone(),
            closed: false,
        }))
    }
}

struct MockTransport {
    generation: Generation,
    log: Arc<Mutex<Log>>,
    closed: bool,
}

impl Transport for MockTransport {
    fn generation(&self) -> Generation {
        self.generation
    }

    fn is_open(&self) -> bool {
        !self.closed
    }

    fn send(&self, frame: &Frame) -> bool {
        if self.closed {
            return false;
        }
        self.log
            .lock()
            .unwrap()
            .sent
            .push((self.generation, frame.clone()));
        true
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.log.lock().unwrap().closed.push(self.generation);
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

const BASH: &str = "/bin/bash";
const SH: &str = "/bin/sh";
const NOT_FOUND: &str = "OCI runtime exec failed: exec failed: unable to start container process: exec: \"/bin/bash\": stat /bin/bash: no such file or directory: unknown\r\n";

fn target() -> SessionTarget {
    SessionTarget::new("default", "web-0", "app")
}

fn new_session(options: SessionOptions) -> (SessionManager<BufferTerminal>, MockConnector) {
    let connector = MockConnector::default();
    let session = SessionManager::new(
        target(),
        options,
        Arc::new(connector.clone()),
        BufferTerminal::default(),
    )
    .unwrap();
    (session, connector)
}

fn session() -> (SessionManager<BufferTerminal>, MockConnector) {
    new_session(SessionOptions::default())
}

/// Posts an event from the live transport and applies it.
fn deliver(
    session: &mut SessionManager<BufferTerminal>,
    connector: &MockConnector,
    kind: TransportEventKind,
) {
    connector.post(session.generation(), kind);
    session.process_pending();
}

fn output(text: &str) -> TransportEventKind {
    TransportEventKind::Frame(Frame::Output {
        data: text.to_string(),
    })
}

fn open(session: &mut SessionManager<BufferTerminal>, connector: &MockConnector) {
    deliver(session, connector, TransportEventKind::Open);
    assert_eq!(session.state(), ConnectionState::Connected);
}

fn connected() -> (SessionManager<BufferTerminal>, MockConnector) {
    let (mut session, connector) = session();
    session.connect().unwrap();
    open(&mut session, &connector);
    (session, connector)
}

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn advisories(events: &[SessionEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, SessionEvent::Advisory(_)))
        .count()
}

// =============================================================================
// Connection lifecycle
// =============================================================================

#[test]
fn test_new_session_is_idle() {
    let (session, connector) = session();
    assert_eq!(session.state(), ConnectionState::Idle);
    assert_eq!(session.shell(), BASH);
    assert!(!session.is_debug_mode());
    assert!(connector.opened().is_empty());
}

#[test]
fn test_unknown_initial_shell_rejected() {
    let options = SessionOptions {
        shell: "/bin/zsh".to_string(),
        ..SessionOptions::default()
    };
    let result = SessionManager::new(
        target(),
        options,
        Arc::new(MockConnector::default()),
        BufferTerminal::default(),
    );
    assert!(matches!(result, Err(SessionError::UnknownShell(_))));
}

#[test]
fn test_connect_opens_exec_endpoint() {
    let (mut session, connector) = session();
    let mut events = session.subscribe();

    session.connect().unwrap();
    assert_eq!(session.state(), ConnectionState::Connecting);
    assert_eq!(
        connector.opened(),
        vec![(EndpointParams::exec(&target(), BASH), Generation::new(1))]
    );

    open(&mut session, &connector);
    assert_eq!(
        drain(&mut events),
        vec![
            SessionEvent::StateChanged(ConnectionState::Connecting),
            SessionEvent::StateChanged(ConnectionState::Connected),
        ]
    );
}

#[test]
fn test_open_sends_current_geometry() {
    let (_session, connector) = connected();
    assert_eq!(
        connector.sent(),
        vec![Frame::Resize { cols: 80, rows: 24 }]
    );
}

#[test]
fn test_connect_rejected_while_active() {
    let (mut session, connector) = session();
    session.connect().unwrap();
    assert!(matches!(
        session.connect(),
        Err(SessionError::InvalidTransition {
            state: ConnectionState::Connecting,
            ..
        })
    ));

    open(&mut session, &connector);
    assert!(session.connect().is_err());
    assert_eq!(connector.opened().len(), 1);
}

#[test]
fn test_open_failure_enters_error_and_retry_recovers() {
    let (mut session, connector) = session();
    let mut events = session.subscribe();
    connector.refuse_next();

    assert!(matches!(session.connect(), Err(SessionError::Endpoint(_))));
    assert_eq!(session.state(), ConnectionState::Error);
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, SessionEvent::Error { message } if message.contains("connection refused"))));

    session.retry().unwrap();
    assert_eq!(session.state(), ConnectionState::Connecting);
    open(&mut session, &connector);
}

#[test]
fn test_user_disconnect() {
    let (mut session, connector) = connected();
    session.disconnect();

    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(connector.closed(), vec![Generation::new(1)]);

    session.connect().unwrap();
    assert_eq!(session.generation(), Generation::new(2));
}

// =============================================================================
// Remote end of session
// =============================================================================

#[test]
fn test_remote_disconnect_ends_session_gracefully() {
    let (mut session, connector) = connected();
    let mut events = session.subscribe();

    deliver(
        &mut session,
        &connector,
        TransportEventKind::Frame(Frame::Status {
            status: RemoteStatus::Disconnected,
        }),
    );

    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(connector.closed(), vec![Generation::new(1)]);
    assert_eq!(
        drain(&mut events),
        vec![
            SessionEvent::StateChanged(ConnectionState::Disconnected),
            SessionEvent::SessionEnded {
                message: SESSION_ENDED_MESSAGE.to_string(),
            },
        ]
    );

    // The socket closing afterwards belongs to a released transport.
    connector.post(
        Generation::new(1),
        TransportEventKind::Close {
            code: Some(1000),
            reason: String::new(),
        },
    );
    session.process_pending();
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(drain(&mut events).is_empty());
}

#[test]
fn test_connected_status_is_ignored() {
    let (mut session, connector) = connected();
    deliver(
        &mut session,
        &connector,
        TransportEventKind::Frame(Frame::Status {
            status: RemoteStatus::Connected,
        }),
    );
    assert_eq!(session.state(), ConnectionState::Connected);
}

#[test]
fn test_error_frame_message_shown_verbatim() {
    let (mut session, connector) = connected();
    let mut events = session.subscribe();

    deliver(
        &mut session,
        &connector,
        TransportEventKind::Frame(Frame::Error {
            error: "pods \"web-0\" not found".to_string(),
        }),
    );

    assert_eq!(session.state(), ConnectionState::Error);
    assert_eq!(connector.closed(), vec![Generation::new(1)]);
    assert!(drain(&mut events).contains(&SessionEvent::Error {
        message: "pods \"web-0\" not found".to_string(),
    }));
}

#[test]
fn test_unexpected_close_is_an_error() {
    let (mut session, connector) = connected();
    let mut events = session.subscribe();

    deliver(
        &mut session,
        &connector,
        TransportEventKind::Close {
            code: Some(1006),
            reason: String::new(),
        },
    );

    assert_eq!(session.state(), ConnectionState::Error);
    assert!(drain(&mut events).contains(&SessionEvent::Error {
        message: "connection closed (code 1006)".to_string(),
    }));
}

#[test]
fn test_transport_error_while_connecting() {
    let (mut session, connector) = session();
    session.connect().unwrap();

    deliver(
        &mut session,
        &connector,
        TransportEventKind::Error("connection timed out".to_string()),
    );

    assert_eq!(session.state(), ConnectionState::Error);
    assert_eq!(connector.closed(), vec![Generation::new(1)]);
}

// =============================================================================
// Output, input and geometry
// =============================================================================

#[test]
fn test_output_written_to_terminal() {
    let (mut session, connector) = connected();
    deliver(&mut session, &connector, output("hello\r\n"));
    deliver(
        &mut session,
        &connector,
        TransportEventKind::Raw("plain text".to_string()),
    );
    assert_eq!(session.terminal().output_text(), "hello\r\nplain text");
}

#[test]
fn test_input_forwarded_only_when_connected() {
    let (mut session, connector) = session();
    assert!(!session.send_input(b"ls\r"));

    session.connect().unwrap();
    assert!(!session.send_input(b"ls\r"));
    assert!(connector.sent().is_empty());

    open(&mut session, &connector);
    assert!(session.send_input(b"ls\r"));
    assert_eq!(
        connector.sent().last(),
        Some(&Frame::Input {
            data: "ls\r".to_string(),
        })
    );

    session.disconnect();
    assert!(!session.send_input(b"exit\r"));
    assert_eq!(connector.sent().len(), 2);
}

#[test]
fn test_split_multibyte_input_sent_whole() {
    let (mut session, connector) = connected();
    let before = connector.sent().len();

    assert!(session.send_input(&[0xC3]));
    assert_eq!(connector.sent().len(), before);
    assert!(session.send_input(&[0xA9]));
    assert!(session.send_input(&[b'a', 0xE2, 0x82]));
    assert!(session.send_input(&[0xAC]));

    assert_eq!(
        connector.sent()[before..],
        [
            Frame::Input {
                data: "é".to_string(),
            },
            Frame::Input {
                data: "a".to_string(),
            },
            Frame::Input {
                data: "€".to_string(),
            },
        ]
    );
}

#[test]
fn test_partial_input_dropped_on_reconnect() {
    let (mut session, connector) = connected();
    assert!(session.send_input(&[0xC3]));

    session.set_shell(SH).unwrap();
    open(&mut session, &connector);
    assert!(session.send_input(b"x"));
    assert_eq!(
        connector.sent().last(),
        Some(&Frame::Input {
            data: "x".to_string(),
        })
    );
}

#[test]
fn test_resize_while_disconnected_applied_on_open() {
    let (mut session, connector) = session();
    session.resize(120, 40);
    session.resize(132, 43);
    assert!(connector.sent().is_empty());
    assert_eq!(session.geometry(), TerminalSize::new(132, 43));

    session.connect().unwrap();
    open(&mut session, &connector);
    assert_eq!(
        connector.sent(),
        vec![Frame::Resize {
            cols: 132,
            rows: 43
        }]
    );
}

#[test]
fn test_empty_geometry_ignored() {
    let (mut session, _connector) = session();
    session.resize(0, 40);
    assert_eq!(session.geometry(), TerminalSize::default());
}

#[tokio::test(start_paused = true)]
async fn test_resize_burst_coalesced() {
    let (mut session, connector) = connected();

    session.resize(100, 30);
    session.resize(101, 31);
    session.resize(102, 32);
    assert_eq!(connector.sent().len(), 1);

    assert!(session.next().await);
    assert_eq!(
        connector.sent(),
        vec![
            Frame::Resize { cols: 80, rows: 24 },
            Frame::Resize {
                cols: 102,
                rows: 32
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_resize_after_interval_sent_immediately() {
    let (mut session, connector) = connected();

    tokio::time::advance(std::time::Duration::from_millis(100)).await;
    session.resize(100, 30);
    assert_eq!(
        connector.sent().last(),
        Some(&Frame::Resize {
            cols: 100,
            rows: 30
        })
    );
}

// =============================================================================
// Reconnect on configuration change
// =============================================================================

#[test]
fn test_setter_while_connected_reconnects_once() {
    let (mut session, connector) = connected();
    let mut events = session.subscribe();

    session.set_shell(SH).unwrap();

    assert_eq!(connector.closed(), vec![Generation::new(1)]);
    assert_eq!(connector.opened().len(), 2);
    assert_eq!(connector.last_params(), EndpointParams::exec(&target(), SH));
    assert_eq!(session.state(), ConnectionState::Connecting);
    assert_eq!(session.generation(), Generation::new(2));
    assert!(drain(&mut events).contains(&SessionEvent::Reconnecting {
        reason: "shell changed".to_string(),
    }));
}

#[test]
fn test_setter_while_idle_only_records() {
    let (mut session, connector) = session();
    session.set_shell(SH).unwrap();
    session.set_debug_image("alpine:3.20").unwrap();

    assert_eq!(session.state(), ConnectionState::Idle);
    assert!(connector.opened().is_empty());

    session.connect().unwrap();
    assert_eq!(connector.last_params(), EndpointParams::exec(&target(), SH));
}

#[test]
fn test_setter_from_error_reconnects() {
    let (mut session, connector) = connected();
    deliver(
        &mut session,
        &connector,
        TransportEventKind::Error("reset".to_string()),
    );
    assert_eq!(session.state(), ConnectionState::Error);

    session.set_shell(SH).unwrap();
    assert_eq!(session.state(), ConnectionState::Connecting);
    assert_eq!(connector.opened().len(), 2);
}

#[test]
fn test_unchanged_setter_is_noop() {
    let (mut session, connector) = connected();
    session.set_shell(BASH).unwrap();
    session.set_container("app").unwrap();
    session.set_debug_mode(false, None).unwrap();

    assert!(connector.closed().is_empty());
    assert_eq!(connector.opened().len(), 1);
    assert_eq!(session.state(), ConnectionState::Connected);
}

#[test]
fn test_unknown_shell_rejected() {
    let (mut session, connector) = connected();
    assert!(matches!(
        session.set_shell("/bin/fish"),
        Err(SessionError::UnknownShell(_))
    ));
    assert_eq!(connector.opened().len(), 1);
}

#[test]
fn test_set_container_targets_new_container() {
    let (mut session, connector) = connected();
    session.set_container("sidecar").unwrap();

    assert_eq!(connector.closed(), vec![Generation::new(1)]);
    assert_eq!(connector.opened().len(), 2);
    assert_eq!(session.generation(), Generation::new(2));
    assert_eq!(session.target().container, "sidecar");
    assert_eq!(
        connector.last_params(),
        EndpointParams::exec(&target().with_container("sidecar"), BASH)
    );
}

#[test]
fn test_stale_generation_ignored() {
    let (mut session, connector) = connected();
    session.set_shell(SH).unwrap();

    connector.post(Generation::new(1), output("late output"));
    connector.post(Generation::new(1), TransportEventKind::Open);
    connector.post(
        Generation::new(1),
        TransportEventKind::Close {
            code: Some(1006),
            reason: String::new(),
        },
    );
    session.process_pending();

    assert_eq!(session.state(), ConnectionState::Connecting);
    assert_eq!(session.terminal().output_text(), "");

    open(&mut session, &connector);
    deliver(&mut session, &connector, output("$ "));
    assert_eq!(session.terminal().output_text(), "$ ");
}

// =============================================================================
// Shell capability detection
// =============================================================================

#[test]
fn test_command_errors_in_working_shell_ignored() {
    let (mut session, connector) = connected();
    let mut events = session.subscribe();

    deliver(
        &mut session,
        &connector,
        output("root@web-0:/# cat nope\r\ncat: nope: No such file or directory\r\n"),
    );
    session.set_shell(SH).unwrap();
    open(&mut session, &connector);
    deliver(
        &mut session,
        &connector,
        output("# ls /missing\r\nls: /missing: No such file or directory\r\n"),
    );

    assert!(session.failed_shells().is_empty());
    assert!(!session.is_distroless());
    assert_eq!(advisories(&drain(&mut events)), 0);
}

#[test]
fn test_one_failed_shell_is_not_distroless() {
    let (mut session, connector) = connected();
    let mut events = session.subscribe();

    deliver(&mut session, &connector, output(NOT_FOUND));

    assert_eq!(session.failed_shells(), vec![BASH]);
    assert!(!session.is_distroless());
    assert_eq!(advisories(&drain(&mut events)), 0);
    assert!(session.terminal().output_text().contains("no such file"));
}

#[test]
fn test_same_failure_counted_once() {
    let (mut session, connector) = connected();
    deliver(&mut session, &connector, output(NOT_FOUND));
    deliver(&mut session, &connector, output(NOT_FOUND));
    assert_eq!(session.failed_shells(), vec![BASH]);

    // A second attempt with the same shell does not count again.
    session.disconnect();
    session.connect().unwrap();
    open(&mut session, &connector);
    deliver(&mut session, &connector, output(NOT_FOUND));
    assert_eq!(session.failed_shells(), vec![BASH]);
    assert!(!session.is_distroless());
}

#[test]
fn test_signature_split_across_frames() {
    let (mut session, connector) = connected();
    deliver(&mut session, &connector, output("exec: \"/bin/bash\": executable fi"));
    assert!(session.failed_shells().is_empty());
    deliver(&mut session, &connector, output("le not found in $PATH"));
    assert_eq!(session.failed_shells(), vec![BASH]);
}

#[test]
fn test_bash_then_sh_failure_flags_distroless() {
    let (mut session, connector) = connected();
    let mut events = session.subscribe();

    deliver(&mut session, &connector, output(NOT_FOUND));
    session.set_shell(SH).unwrap();
    open(&mut session, &connector);
    deliver(
        &mut session,
        &connector,
        output("command terminated with exit code 127\r\n"),
    );

    assert!(session.is_distroless());
    let events = drain(&mut events);
    assert_eq!(advisories(&events), 1);
    assert!(events.contains(&SessionEvent::Advisory(Advisory::ShellUnavailable {
        failed_shells: vec![BASH.to_string(), SH.to_string()],
    })));

    // Flagging is advisory only; nothing reconnects on its own.
    assert_eq!(connector.opened().len(), 2);
    assert!(!session.is_debug_mode());
}

#[test]
fn test_advisory_emitted_once() {
    let options = SessionOptions {
        shells: vec![SH.to_string()],
        shell: SH.to_string(),
        ..SessionOptions::default()
    };
    let (mut session, connector) = new_session(options);
    let mut events = session.subscribe();

    session.connect().unwrap();
    open(&mut session, &connector);
    deliver(&mut session, &connector, output("exit code 127"));

    session.retry().unwrap_err();
    session.disconnect();
    session.retry().unwrap();
    open(&mut session, &connector);
    deliver(&mut session, &connector, output("exit code 127"));

    assert!(session.is_distroless());
    assert_eq!(advisories(&drain(&mut events)), 1);
}

#[test]
fn test_container_change_clears_failures() {
    let (mut session, connector) = connected();
    deliver(&mut session, &connector, output(NOT_FOUND));
    session.set_shell(SH).unwrap();
    open(&mut session, &connector);
    deliver(&mut session, &connector, output(NOT_FOUND));
    assert!(session.is_distroless());

    session.set_container("sidecar").unwrap();
    assert!(!session.is_distroless());
    assert!(session.failed_shells().is_empty());
}

// =============================================================================
// Debug mode
// =============================================================================

#[test]
fn test_debug_mode_resets_detection() {
    let (mut session, connector) = connected();
    deliver(&mut session, &connector, output(NOT_FOUND));
    session.set_shell(SH).unwrap();
    open(&mut session, &connector);
    deliver(&mut session, &connector, output(NOT_FOUND));
    assert!(session.is_distroless());

    let closed_before = connector.closed().len();
    let opened_before = connector.opened().len();
    session.set_debug_mode(true, None).unwrap();

    assert_eq!(connector.closed().len(), closed_before + 1);
    assert_eq!(connector.opened().len(), opened_before + 1);
    assert!(session.is_debug_mode());
    assert!(!session.is_distroless());
    assert!(session.failed_shells().is_empty());
    assert_eq!(
        connector.last_params(),
        EndpointParams::debug_attach(&target(), "busybox:latest")
    );
}

#[test]
fn test_debug_toggle_replaces_connection_once() {
    let (mut session, connector) = connected();

    session.set_debug_mode(true, None).unwrap();
    assert_eq!(connector.closed(), vec![Generation::new(1)]);
    assert_eq!(connector.opened().len(), 2);
    assert_eq!(session.state(), ConnectionState::Connecting);

    open(&mut session, &connector);
    session.set_debug_mode(false, None).unwrap();
    assert_eq!(
        connector.closed(),
        vec![Generation::new(1), Generation::new(2)]
    );
    assert_eq!(connector.opened().len(), 3);
    assert_eq!(connector.last_params(), EndpointParams::exec(&target(), BASH));
}

#[test]
fn test_debug_output_not_scanned() {
    let (mut session, connector) = connected();
    session.set_debug_mode(true, Some("nicolaka/netshoot")).unwrap();
    open(&mut session, &connector);

    deliver(&mut session, &connector, output(NOT_FOUND));
    assert!(session.failed_shells().is_empty());
    assert_eq!(session.debug_image(), "nicolaka/netshoot");
}

#[test]
fn test_debug_image_change_reconnects_only_in_debug_mode() {
    let (mut session, connector) = connected();

    session.set_debug_image("alpine:3.20").unwrap();
    assert_eq!(connector.opened().len(), 1);

    session.set_debug_mode(true, None).unwrap();
    assert_eq!(
        connector.last_params(),
        EndpointParams::debug_attach(&target(), "alpine:3.20")
    );

    session.set_debug_image("busybox:1.36").unwrap();
    assert_eq!(connector.opened().len(), 3);
    assert_eq!(
        connector.last_params(),
        EndpointParams::debug_attach(&target(), "busybox:1.36")
    );

    session.set_debug_mode(false, None).unwrap();
    assert_eq!(connector.last_params(), EndpointParams::exec(&target(), BASH));
    assert_eq!(connector.closed().len(), 3);
}

#[test]
fn test_empty_debug_image_rejected() {
    let (mut session, connector) = connected();
    assert!(matches!(
        session.set_debug_mode(true, Some("  ")),
        Err(SessionError::InvalidDebugImage(_))
    ));
    assert!(!session.is_debug_mode());
    assert_eq!(connector.opened().len(), 1);
}

#[test]
fn test_start_in_debug_mode() {
    let options = SessionOptions {
        debug_mode: true,
        debug_image: "alpine:3.20".to_string(),
        ..SessionOptions::default()
    };
    let (mut session, connector) = new_session(options);
    session.connect().unwrap();
    assert_eq!(
        connector.last_params(),
        EndpointParams::debug_attach(&target(), "alpine:3.20")
    );
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn test_shutdown_releases_transport() {
    let (mut session, connector) = connected();
    session.shutdown();
    session.shutdown();

    assert_eq!(connector.closed(), vec![Generation::new(1)]);
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(matches!(session.connect(), Err(SessionError::ShutDown)));
    assert!(matches!(session.set_shell(SH), Err(SessionError::ShutDown)));
    assert!(!session.send_input(b"x"));
    assert!(!session.next().await);
}

#[test]
fn test_drop_closes_transport() {
    let (session, connector) = connected();
    drop(session);
    assert_eq!(connector.closed(), vec![Generation::new(1)]);
}
