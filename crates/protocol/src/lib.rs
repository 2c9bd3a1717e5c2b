//! # Podterm Protocol Library
//!
//! This crate provides the wire format for Podterm terminal sessions: the
//! frames exchanged with the cluster backend over a persistent duplex
//! channel and the parameters that identify which container a session
//! attaches to.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Session Manager (client)         │
//! ├─────────────────────────────────────────┤
//! │      Frames (JSON, tagged by type)      │  input/resize ↑  output/status/error ↓
//! ├─────────────────────────────────────────┤
//! │          WebSocket transport            │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{decode_incoming, Frame, Incoming, TerminalSize};
//!
//! let resize = Frame::resize(TerminalSize::new(120, 40));
//! assert_eq!(resize.encode().unwrap(), r#"{"type":"resize","cols":120,"rows":40}"#);
//!
//! match decode_incoming("plain text from the server") {
//!     Incoming::Raw(text) => assert_eq!(text, "plain text from the server"),
//!     _ => unreachable!(),
//! }
//! ```
//!
//! ## Modules
//!
//! - [`frame`]: Frame definitions and lenient decoding
//! - [`endpoint`]: Session targets and endpoint parameters
//! - [`error`]: Error types

pub mod endpoint;
pub mod error;
pub mod frame;

pub use endpoint::{EndpointParams, SessionTarget};
pub use error::{ProtocolError, Result};
pub use frame::{
    decode_incoming, Frame, Incoming, RemoteStatus, TerminalSize, DEFAULT_COLS, DEFAULT_ROWS,
};
