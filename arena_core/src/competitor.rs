//! The competitor contract and the out-of-process competitor implementation.

use crate::engine::SimulationState;
use crate::protocol::{AgentMessage, HostMessage};
use crate::types::{Budget, Player};

use arena_env::{ExecError, IsolatedProcess, KillHandle, Reaper, SandboxPolicy};
use std::marker::PhantomData;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Errors raised by a competitor while being built or while deciding.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The agent reported a failure of its own
    #[error("Agent error: {0}")]
    Failed(String),

    /// The agent refused the offered constructor
    #[error("Constructor not supported: {0}")]
    Unsupported(String),

    /// Talking to an isolated agent failed
    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl AgentError {
    /// Creates a failure with the given message.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// An untrusted decision-making agent.
///
/// `decide` receives the engine's state by mutable reference so agents
/// can use it without copying it. The world inside it is read-only by
/// contract; the harness checks that contract after every call.
pub trait Competitor<S: SimulationState>: Send + 'static {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Proposes an action for `player` given the current state.
    fn decide(&mut self, player: Player, state: &mut S) -> Result<S::Action, AgentError>;

    /// Returns a handle that can forcibly stop this competitor, if it
    /// runs somewhere that can be stopped.
    fn kill_handle(&self) -> Option<KillHandle> {
        None
    }
}

/// Boxed competitor as handed around by the harness.
pub type BoxedCompetitor<S> = Box<dyn Competitor<S>>;

/// Which constructor a competitor was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstantiationStrategy {
    /// Rules plus a resource budget
    Budgeted,

    /// Rules only
    Basic,
}

/// A competitor running in a confined child process.
///
/// Speaks the JSON-lines protocol from `crate::protocol`.
pub struct ProcessCompetitor<S: SimulationState> {
    /// Display name (entry point @ executable)
    name: String,

    /// The confined child
    process: IsolatedProcess,

    /// Marker for the engine type
    _state: PhantomData<fn() -> S>,
}

impl<S: SimulationState> ProcessCompetitor<S> {
    /// Spawns the executable at `program` and initialises `entry_point`.
    ///
    /// The child is registered with `reaper` before any message is
    /// exchanged. The budgeted handshake is attempted first; an agent that
    /// answers `unsupported` is initialised again without a budget.
    pub fn launch(
        program: &Path,
        entry_point: &str,
        rules: &S::Rules,
        budget: Budget,
        policy: &SandboxPolicy,
        reaper: &Reaper,
    ) -> Result<(Self, InstantiationStrategy), AgentError> {
        let process = IsolatedProcess::spawn(program, &[entry_point.to_string()], policy)?;
        reaper.register(process.kill_handle());
        let mut competitor = Self {
            name: format!("{}@{}", entry_point, program.display()),
            process,
            _state: PhantomData,
        };

        match competitor.handshake(entry_point, rules, Some(budget))? {
            AgentMessage::Ready => Ok((competitor, InstantiationStrategy::Budgeted)),
            AgentMessage::Unsupported { reason } => {
                debug!("{} declined budgeted init ({}), retrying basic", competitor.name, reason);
                match competitor.handshake(entry_point, rules, None)? {
                    AgentMessage::Ready => Ok((competitor, InstantiationStrategy::Basic)),
                    AgentMessage::Unsupported { reason } => Err(AgentError::Unsupported(reason)),
                    AgentMessage::Error { message } => Err(AgentError::Failed(message)),
                    AgentMessage::Action { .. } => Err(unexpected_reply("init")),
                }
            }
            AgentMessage::Error { message } => Err(AgentError::Failed(message)),
            AgentMessage::Action { .. } => Err(unexpected_reply("init")),
        }
    }

    fn handshake(
        &mut self,
        entry_point: &str,
        rules: &S::Rules,
        budget: Option<Budget>,
    ) -> Result<AgentMessage<S::Action>, AgentError> {
        let init: HostMessage<S::Rules, S> = HostMessage::Init {
            entry_point: entry_point.to_string(),
            rules: rules.clone(),
            budget_ms: budget.map(|b| b.millis),
        };
        self.process.send(&init)?;
        Ok(self.process.recv()?)
    }
}

fn unexpected_reply(during: &str) -> AgentError {
    AgentError::Exec(ExecError::Protocol(format!("unexpected reply during {}", during)))
}

impl<S: SimulationState> Competitor<S> for ProcessCompetitor<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn decide(&mut self, player: Player, state: &mut S) -> Result<S::Action, AgentError> {
        let request: HostMessage<S::Rules, S> = HostMessage::Decide {
            player,
            state: state.clone(),
        };
        self.process.send(&request)?;

        match self.process.recv::<AgentMessage<S::Action>>()? {
            AgentMessage::Action { action } => Ok(action),
            AgentMessage::Error { message } => Err(AgentError::Failed(message)),
            AgentMessage::Ready | AgentMessage::Unsupported { .. } => Err(unexpected_reply("decide")),
        }
    }

    fn kill_handle(&self) -> Option<KillHandle> {
        Some(self.process.kill_handle())
    }
}

impl<S: SimulationState> Drop for ProcessCompetitor<S> {
    fn drop(&mut self) {
        // Best effort: a well-behaved agent exits on its own.
        let _ = self.process.send(&HostMessage::<S::Rules, S>::Shutdown);
    }
}
