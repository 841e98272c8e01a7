//! Arena Skirmish - reference engine and judge for the arena harness
//!
//! The harness in `arena_core` is generic over any engine. This crate
//! supplies a concrete one so matches can actually be played:
//!
//! - **Engine** (`world`, `units`): a grid battle with simultaneous attacks
//!   and id-ordered moves
//! - **Scenarios** (`scenarios`): named presets or JSON files
//! - **Agents** (`agents`): built-in competitors served from the trusted
//!   locator `"."`
//! - **Judge** (`judge`): scenario → match → archive, used by the
//!   `arena-judge` binary
//!
//! The `arena-agent` binary hosts the same built-in agents as an external
//! process speaking the JSON-lines protocol, so the untrusted path can be
//! exercised end to end.
//!
//! # Usage
//!
//! ```ignore
//! use arena_core::{CompetitorDescriptor, MatchConfig};
//! use arena_sim::judge;
//!
//! let config = MatchConfig::new(
//!     CompetitorDescriptor::trusted("rush"),
//!     CompetitorDescriptor::new("./target/debug/arena-agent", "random"),
//!     "skirmish",
//! );
//! let report = judge(config, Path::new("match.zip")).await?;
//! ```

pub mod agents;
pub mod judge;
pub mod scenarios;
pub mod units;
pub mod world;

pub use agents::{builtin_registry, Passive, RandomAgent, Rush, BUILTIN_AGENTS};
pub use judge::{judge, JudgeError};
pub use scenarios::{Preset, Scenario, ScenarioError, UnitSpawn};
pub use units::{UnitKind, UnitStats, UnitTypeTable};
pub use world::{Battlefield, Command, Direction, Order, Orders, Position, Skirmish, Unit};
