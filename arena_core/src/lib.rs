//! Arena Core - the judging harness
//!
//! Pits two untrusted competitors against each other inside any engine that
//! implements [`SimulationState`], and attributes every failure to exactly
//! one side.
//!
//! ## Components
//!
//! - **Loader** (`loader`): resolves a competitor descriptor under a
//!   capability token and a load deadline
//! - **Guard** (`guard`): deadline-bounded decisions with tamper detection
//! - **Orchestrator** (`orchestrator`): the `Loading → Playing → Concluded`
//!   state machine
//! - **Recorder** (`trace`, `result`, `recorder`): the per-tick trace, the
//!   outcome record and the zip archive holding both
//!
//! ## Trust boundary
//!
//! Built-in agents (locator `"."`) run in-process with `Capability::Trusted`.
//! Every other locator is an executable started in a confined child process
//! that talks the JSON-lines protocol in `protocol` and can be killed on
//! timeout or at teardown.

pub mod competitor;
pub mod engine;
pub mod guard;
pub mod loader;
pub mod orchestrator;
pub mod protocol;
pub mod recorder;
pub mod result;
pub mod trace;
pub mod types;

#[cfg(test)]
mod testkit;

pub use competitor::{AgentError, BoxedCompetitor, Competitor, InstantiationStrategy, ProcessCompetitor};
pub use engine::{Outcome, SimulationState};
pub use guard::{DecisionFault, GuardOutcome, MutationGuard, STATE_MODIFIED};
pub use loader::{
    AgentRegistry, CompetitorDescriptor, LoadFailure, LoadedCompetitor, SandboxLoader, TRUSTED_LOCATOR,
};
pub use orchestrator::{MatchConfig, MatchPhase, MatchReport, Orchestrator};
pub use protocol::{AgentMessage, HostMessage};
pub use recorder::{read_archive, write_archive, write_archive_file, RecordError, RESULT_ENTRY, TRACE_ENTRY};
pub use result::{render_chain, MatchResult, Winner};
pub use trace::{MatchTrace, Trace, TraceEntry};
pub use types::{Budget, Player};

// Re-export the execution environment types callers need to configure a match
pub use arena_env::{Capability, SandboxPolicy};
