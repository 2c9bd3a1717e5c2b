//! Error types for session operations.

use protocol::ProtocolError;
use thiserror::Error;

use crate::manager::ConnectionState;

/// Errors that can occur during session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The operation is not valid in the current connection state.
    #[error("cannot {op} while {state}")]
    InvalidTransition {
        /// The rejected operation.
        op: &'static str,
        /// State at the time of the call.
        state: ConnectionState,
    },

    /// The connection target could not be resolved.
    #[error("endpoint error: {0}")]
    Endpoint(#[from] ProtocolError),

    /// The debug image name is unusable.
    #[error("invalid debug image: {0:?}")]
    InvalidDebugImage(String),

    /// A shell that is not in the configured shell list was requested.
    #[error("shell not configured: {0}")]
    UnknownShell(String),

    /// The session has been shut down.
    #[error("session has been shut down")]
    ShutDown,
}
