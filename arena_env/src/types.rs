//! Common types for the arena execution environment.

use crate::error::ExecError;
use std::time::Duration;

/// Outcome of a deadline-bounded unit of work.
///
/// Timeouts and faults are kept apart so callers can attribute them
/// differently (a late answer is not the same diagnostic as a crash).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bounded<T> {
    /// The work finished in time and produced a value
    Completed(T),

    /// The deadline elapsed first; the work was abandoned
    TimedOut {
        /// Deadline that was missed
        deadline: Duration,
    },

    /// The work returned an error or panicked
    Faulted(String),
}

impl<T> Bounded<T> {
    /// Returns true if the deadline elapsed.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Bounded::TimedOut { .. })
    }

    /// Converts into a `Result`, folding both failure kinds into `ExecError`.
    pub fn into_result(self) -> Result<T, ExecError> {
        match self {
            Bounded::Completed(value) => Ok(value),
            Bounded::TimedOut { deadline } => Err(ExecError::Timeout(deadline.as_millis() as u64)),
            Bounded::Faulted(detail) => Err(ExecError::Faulted(detail)),
        }
    }
}
