//! State-Mutation Guard - the anti-cheat wrapper around every decision.
//!
//! Competitors get the engine's live state, not a copy made for them. The
//! guard keeps a pristine clone, lends the live state (by move) to a
//! deadline-bounded task, and compares the world it gets back against the
//! clone. Any difference is a rule violation.
//!
//! When the call does not come back cleanly the pristine clone becomes the
//! authoritative state. The abandoned task may still hold the lent state,
//! but nothing the engine advances is shared with it.

use crate::competitor::BoxedCompetitor;
use crate::engine::SimulationState;
use crate::types::Player;

use arena_env::{Bounded, DeadlineExecutor};
use std::convert::Infallible;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Diagnostic recorded when a competitor alters the world it was lent.
pub const STATE_MODIFIED: &str = "decide modified the game state";

/// Why a decision was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecisionFault {
    /// The decision missed its deadline
    #[error("Decision timed out after {0}ms")]
    TimedOut(u64),

    /// The competitor altered the world state
    #[error("Rule violation: {0}")]
    RuleViolation(String),

    /// The competitor returned an error or panicked
    #[error("Decision faulted: {0}")]
    Faulted(String),
}

/// Result of one guarded decision.
pub enum GuardOutcome<S: SimulationState> {
    /// A legal, timely action; state and competitor are handed back
    Clean {
        action: S::Action,
        state: S,
        competitor: BoxedCompetitor<S>,
    },

    /// The decision failed; `state` is the pristine pre-call clone
    Fault { fault: DecisionFault, state: S },
}

/// Runs decisions under a deadline and checks them for tampering.
pub struct MutationGuard {
    /// Executor for the decision call
    executor: DeadlineExecutor,

    /// Per-decision deadline
    deadline: Duration,
}

impl MutationGuard {
    /// Creates a guard.
    pub fn new(executor: DeadlineExecutor, deadline: Duration) -> Self {
        Self { executor, deadline }
    }

    /// Asks `competitor` for `player`'s action on `state`.
    pub async fn decide<S: SimulationState>(
        &self,
        mut competitor: BoxedCompetitor<S>,
        player: Player,
        state: S,
    ) -> GuardOutcome<S> {
        let pristine = state.clone();
        let tick = pristine.tick();
        let label = format!("decide {} ({}) tick {}", player, competitor.name(), tick);

        let work = move || -> Result<_, Infallible> {
            let mut live = state;
            let action = competitor.decide(player, &mut live);
            Ok((action, live, competitor))
        };

        match self.executor.run_bounded(&label, self.deadline, work).await {
            Bounded::Completed((Ok(action), live, competitor)) => {
                if live.world() != pristine.world() {
                    warn!("{} altered the world state at tick {}", player, tick);
                    return GuardOutcome::Fault {
                        fault: DecisionFault::RuleViolation(STATE_MODIFIED.to_string()),
                        state: pristine,
                    };
                }
                debug!("{} decided at tick {}", player, tick);
                GuardOutcome::Clean {
                    action,
                    state: live,
                    competitor,
                }
            }
            Bounded::Completed((Err(error), _live, _competitor)) => GuardOutcome::Fault {
                fault: DecisionFault::Faulted(crate::result::render_chain(&error)),
                state: pristine,
            },
            Bounded::TimedOut { deadline } => GuardOutcome::Fault {
                fault: DecisionFault::TimedOut(deadline.as_millis() as u64),
                state: pristine,
            },
            Bounded::Faulted(detail) => GuardOutcome::Fault {
                fault: DecisionFault::Faulted(detail),
                state: pristine,
            },
        }
    }
}
