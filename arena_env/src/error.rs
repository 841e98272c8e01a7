//! Error types for the arena execution environment.

use thiserror::Error;

/// Errors that can occur while running or talking to isolated work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    /// Work did not finish before its deadline
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// Work returned an error or panicked
    #[error("Task faulted: {0}")]
    Faulted(String),

    /// A confined child process could not be started
    #[error("Spawn error: {0}")]
    Spawn(String),

    /// Reading from or writing to a child failed, or the child hung up
    #[error("Transport error: {0}")]
    Transport(String),

    /// A message could not be encoded or decoded
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl ExecError {
    /// Creates a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a protocol error.
    pub fn protocol(msg: impl std::fmt::Display) -> Self {
        Self::Protocol(msg.to_string())
    }
}
