//! Podterm command-line client.
//!
//! Configuration, local terminal plumbing and escape-key handling for the
//! `podterm` binary. The session logic itself lives in `session_client`.

pub mod config;
pub mod escape;
pub mod terminal;
