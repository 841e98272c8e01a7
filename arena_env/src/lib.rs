//! Arena Execution Environment
//!
//! This crate owns everything the judge needs to run code it does not trust:
//!
//! - **Deadlines**: every potentially unbounded call runs on a disposable
//!   blocking task and is awaited with a hard timeout (`DeadlineExecutor`)
//! - **Capabilities**: a value-level token says whether code runs in the
//!   host's trusted space or behind the sandbox (`Capability`)
//! - **Isolation**: untrusted competitors live in confined child processes
//!   that can be killed outright (`IsolatedProcess`, `KillHandle`, `Reaper`).
//!   On Linux each child gets its own namespaces and a read-only private
//!   root with no network (`SandboxPolicy`)
//!
//! # Example
//!
//! ```ignore
//! use arena_env::{Bounded, DeadlineExecutor};
//! use std::time::Duration;
//!
//! let executor = DeadlineExecutor::new();
//! match executor.run_bounded("load", Duration::from_secs(1), || build_agent()).await {
//!     Bounded::Completed(agent) => run(agent),
//!     Bounded::TimedOut { deadline } => disqualify(deadline),
//!     Bounded::Faulted(detail) => disqualify_with(detail),
//! }
//! ```

mod error;
mod executor;
#[cfg(target_os = "linux")]
mod jail;
mod process;
mod sandbox;
mod types;

pub use error::ExecError;
pub use executor::DeadlineExecutor;
pub use process::{IsolatedProcess, KillHandle, Reaper};
pub use sandbox::{Capability, SandboxPolicy};
pub use types::Bounded;
