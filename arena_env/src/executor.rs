//! Deadline-bounded execution backed by Tokio's blocking pool.

use crate::types::Bounded;
use std::any::Any;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tracing::{debug, warn};

/// Runs work with a hard deadline.
///
/// Each unit of work is dispatched to a disposable blocking task so the
/// orchestrating task is never blocked past the deadline. When the deadline
/// elapses the task is **abandoned**, not cancelled: Tokio cannot preempt a
/// blocking closure. Work that must be stoppable (untrusted competitors)
/// should therefore live in an `IsolatedProcess` whose `KillHandle` the
/// caller fires after a timeout.
///
/// Must be used from within a Tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct DeadlineExecutor {
    /// Number of tasks abandoned after missing their deadline
    abandoned: Arc<AtomicU64>,
}

impl DeadlineExecutor {
    /// Creates a new executor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` and waits at most `deadline` for it.
    ///
    /// * `Ok(value)` from the work becomes `Bounded::Completed`
    /// * `Err(e)` becomes `Bounded::Faulted(e.to_string())`
    /// * a panic becomes `Bounded::Faulted("panicked: ...")`
    /// * an overrun becomes `Bounded::TimedOut`, returned immediately
    pub async fn run_bounded<T, E, F>(&self, label: &str, deadline: Duration, work: F) -> Bounded<T>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        debug!("{}: dispatching with {}ms deadline", label, deadline.as_millis());

        let handle = tokio::task::spawn_blocking(work);

        match tokio::time::timeout(deadline, handle).await {
            Ok(Ok(Ok(value))) => Bounded::Completed(value),
            Ok(Ok(Err(error))) => Bounded::Faulted(error.to_string()),
            Ok(Err(join_error)) => Bounded::Faulted(describe_join_error(join_error)),
            Err(_elapsed) => {
                // Dropping the JoinHandle detaches the task.
                let total = self.abandoned.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "{}: missed {}ms deadline, task abandoned ({} abandoned so far)",
                    label,
                    deadline.as_millis(),
                    total
                );
                Bounded::TimedOut { deadline }
            }
        }
    }

    /// Returns how many tasks have been abandoned by this executor (and its clones).
    pub fn abandoned_count(&self) -> u64 {
        self.abandoned.load(Ordering::Relaxed)
    }
}

fn describe_join_error(error: JoinError) -> String {
    if error.is_panic() {
        format!("panicked: {}", panic_message(error.into_panic()))
    } else {
        "task was cancelled".to_string()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_run_bounded_completes() {
        let executor = DeadlineExecutor::new();
        let result = executor
            .run_bounded("sum", Duration::from_secs(1), || Ok::<_, String>(2 + 2))
            .await;

        assert_eq!(result, Bounded::Completed(4));
        assert_eq!(executor.abandoned_count(), 0);
    }

    #[tokio::test]
    async fn test_run_bounded_times_out_without_waiting() {
        let executor = DeadlineExecutor::new();
        let start = Instant::now();

        let result = executor
            .run_bounded("sleepy", Duration::from_millis(50), || {
                std::thread::sleep(Duration::from_millis(400));
                Ok::<_, String>(())
            })
            .await;

        assert!(result.is_timed_out());
        // Returned long before the abandoned work finished
        assert!(start.elapsed() < Duration::from_millis(350));
        assert_eq!(executor.abandoned_count(), 1);
    }

    #[tokio::test]
    async fn test_run_bounded_error_is_fault_not_timeout() {
        let executor = DeadlineExecutor::new();
        let result: Bounded<()> = executor
            .run_bounded("failing", Duration::from_secs(1), || {
                Err("constructor refused".to_string())
            })
            .await;

        assert_eq!(result, Bounded::Faulted("constructor refused".to_string()));
    }

    #[tokio::test]
    async fn test_run_bounded_panic_is_fault() {
        let executor = DeadlineExecutor::new();
        let result: Bounded<()> = executor
            .run_bounded("panicking", Duration::from_secs(1), || -> Result<(), String> {
                panic!("agent exploded")
            })
            .await;

        match result {
            Bounded::Faulted(detail) => {
                assert!(detail.contains("panicked"));
                assert!(detail.contains("agent exploded"));
            }
            other => panic!("expected fault, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_abandoned_count_shared_across_clones() {
        let executor = DeadlineExecutor::new();
        let clone = executor.clone();

        let _ = clone
            .run_bounded("slow", Duration::from_millis(10), || {
                std::thread::sleep(Duration::from_millis(100));
                Ok::<_, String>(())
            })
            .await;

        assert_eq!(executor.abandoned_count(), 1);
    }
}
