//! Shell capability heuristics.
//!
//! Containers built from distroless images have no shell, so an exec
//! session against them fails with one of a handful of runtime messages.
//! [`ShellCapabilityDetector`] scans one connection attempt's output for
//! those messages and [`ShellFailureTracker`] remembers which configured
//! shells have failed. Both are best effort: the result is an advisory,
//! never a verified fact.

use std::collections::HashSet;

/// Output fragments that indicate the requested shell could not be started.
pub const DEFAULT_FAILURE_SIGNATURES: &[&str] = &[
    "executable file not found",
    "OCI runtime exec failed",
    "no such file or directory",
    "exit code 127",
    "command terminated with non-zero exit code",
];

/// Upper bound on buffered output per attempt.
const MAX_BUFFER_BYTES: usize = 16 * 1024;

/// Scans accumulated output of one connection attempt for failure signatures.
#[derive(Debug, Clone)]
pub struct ShellCapabilityDetector {
    /// Non-empty signatures.
    signatures: Vec<String>,
    /// Output seen during the current attempt.
    buffer: String,
    /// Whether this attempt already reported a failure.
    triggered: bool,
    /// Length in bytes of the longest signature.
    longest: usize,
}

impl ShellCapabilityDetector {
    /// Creates a detector for `signatures`.
    ///
    /// Matching is case-sensitive: runtime messages are lowercase, while a
    /// healthy shell prints e.g. `No such file or directory` for a missing
    /// file. Empty signatures are ignored.
    pub fn new<I, S>(signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let signatures: Vec<String> = signatures
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let longest = signatures.iter().map(String::len).max().unwrap_or(0);

        Self {
            signatures,
            buffer: String::new(),
            triggered: false,
            longest,
        }
    }

    /// Feeds output text for the current attempt.
    ///
    /// Returns true the first time a signature is found in the accumulated
    /// output; every later call in the same attempt returns false.
    pub fn feed(&mut self, text: &str) -> bool {
        if self.triggered || self.signatures.is_empty() {
            return false;
        }

        self.buffer.push_str(text);

        if let Some(signature) = self
            .signatures
            .iter()
            .find(|s| self.buffer.contains(s.as_str()))
        {
            tracing::debug!(%signature, "Shell exec failure signature detected");
            self.triggered = true;
            self.buffer.clear();
            return true;
        }

        self.trim();
        false
    }

    /// Starts a new attempt.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.triggered = false;
    }

    /// Whether the current attempt has reported a failure.
    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    /// The configured signatures.
    pub fn signatures(&self) -> &[String] {
        &self.signatures
    }

    /// Keeps only the tail a split signature could still complete.
    fn trim(&mut self) {
        if self.buffer.len() <= MAX_BUFFER_BYTES {
            return;
        }
        let mut start = self.buffer.len() - self.longest;
        while !self.buffer.is_char_boundary(start) {
            start -= 1;
        }
        self.buffer.drain(..start);
    }
}

impl Default for ShellCapabilityDetector {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_SIGNATURES)
    }
}

/// Result of recording a shell failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellMark {
    /// The shell had not failed before.
    NewlyFailed {
        /// Distinct configured shells failed so far.
        failed: usize,
        /// Distinct configured shells.
        total: usize,
    },
    /// The shell was already marked; nothing changed.
    AlreadyFailed,
    /// The shell is not in the configured list and does not count.
    Unconfigured,
}

/// Remembers which configured shells failed against the current container.
#[derive(Debug, Clone, Default)]
pub struct ShellFailureTracker {
    shells: Vec<String>,
    failed: HashSet<String>,
    distroless: bool,
}

impl ShellFailureTracker {
    /// Creates a tracker for the given shell list. Duplicates are collapsed.
    pub fn new<I, S>(shells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tracker = Self::default();
        tracker.set_shells(shells);
        tracker
    }

    /// Replaces the shell list, keeping failures of shells still listed.
    pub fn set_shells<I, S>(&mut self, shells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shells.clear();
        for shell in shells {
            let shell = shell.into();
            if !self.shells.contains(&shell) {
                self.shells.push(shell);
            }
        }
        let shells = &self.shells;
        self.failed.retain(|s| shells.contains(s));
    }

    /// Records that `shell` failed. Repeat failures of the same shell do
    /// not count twice.
    pub fn mark_failed(&mut self, shell: &str) -> ShellMark {
        if !self.shells.iter().any(|s| s == shell) {
            return ShellMark::Unconfigured;
        }
        if !self.failed.insert(shell.to_string()) {
            return ShellMark::AlreadyFailed;
        }
        ShellMark::NewlyFailed {
            failed: self.failed.len(),
            total: self.shells.len(),
        }
    }

    /// Whether every configured shell has failed.
    pub fn all_failed(&self) -> bool {
        !self.shells.is_empty() && self.shells.iter().all(|s| self.failed.contains(s))
    }

    /// Marks the container as shell-less.
    pub fn set_distroless(&mut self) {
        self.distroless = true;
    }

    /// Whether the container has been flagged as shell-less.
    pub fn is_distroless(&self) -> bool {
        self.distroless
    }

    /// Failed shells, in configured order.
    pub fn failed_shells(&self) -> Vec<String> {
        self.shells
            .iter()
            .filter(|s| self.failed.contains(*s))
            .cloned()
            .collect()
    }

    /// The configured shells.
    pub fn shells(&self) -> &[String] {
        &self.shells
    }

    /// Forgets all failures and the distroless flag.
    pub fn clear(&mut self) {
        self.failed.clear();
        self.distroless = false;
    }
}
