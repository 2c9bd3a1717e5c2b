//! # Podterm Session Client
//!
//! This crate attaches an interactive terminal to a process running inside
//! a cluster container. It owns the connection lifecycle, forwards input
//! and geometry, and watches output for signs that the container has no
//! usable shell.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  write/size   ┌──────────────────┐  open/send/close  ┌──────────────────┐
//! │   Terminal   │ ◀───────────▶ │  SessionManager  │ ────────────────▶ │    Transport     │
//! │   emulator   │               │                  │ ◀──────────────── │   (WebSocket)    │
//! └──────────────┘               └──────────────────┘  TransportEvent   └──────────────────┘
//!                                   │     │      │      (generation)
//!                     ShellCapabilityDetector   DebugAttachCoordinator
//!                                         ResizeThrottle
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use protocol::SessionTarget;
//! use session_client::{
//!     BufferTerminal, PathEndpointBuilder, SessionManager, SessionOptions, WebSocketConnector,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let builder = PathEndpointBuilder::new("https://dash.example.com")?;
//! let connector = WebSocketConnector::new(Arc::new(builder));
//! let target = SessionTarget::new("default", "web-0", "app");
//!
//! let mut session = SessionManager::new(
//!     target,
//!     SessionOptions::default(),
//!     Arc::new(connector),
//!     BufferTerminal::default(),
//! )?;
//! session.connect()?;
//! while session.next().await {}
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`manager`]: Connection state machine and event routing
//! - [`transport`]: Duplex transport and generation tagging
//! - [`endpoint`]: Endpoint URL construction
//! - [`detector`]: Shell failure heuristic
//! - [`debug`]: Debug-container configuration
//! - [`resize`]: Resize coalescing
//! - [`terminal`]: Terminal emulator collaborator
//! - [`error`]: Error types

pub mod debug;
pub mod detector;
pub mod endpoint;
pub mod error;
pub mod manager;
pub mod resize;
pub mod terminal;
pub mod transport;

pub use debug::{DebugAttachCoordinator, DebugChange, DEFAULT_DEBUG_IMAGE};
pub use detector::{
    ShellCapabilityDetector, ShellFailureTracker, ShellMark, DEFAULT_FAILURE_SIGNATURES,
};
pub use endpoint::{EndpointBuilder, PathEndpointBuilder};
pub use error::SessionError;
pub use manager::{
    Advisory, ConnectionState, SessionEvent, SessionManager, SessionOptions, DEFAULT_SHELLS,
    SESSION_ENDED_MESSAGE,
};
pub use resize::{ResizeThrottle, DEFAULT_RESIZE_INTERVAL};
pub use terminal::{BufferTerminal, TerminalEmulator};
pub use transport::{
    EventSender, Generation, Transport, TransportConnector, TransportEvent, TransportEventKind,
    WebSocketConnector, WebSocketTransport, DEFAULT_CONNECT_TIMEOUT,
};
