//! The simulation engine contract consumed by the harness.
//!
//! The harness never looks inside the world: it clones it, compares it,
//! serializes it, and asks the engine to move it forward. Everything about
//! maps, units and combat belongs to the engine implementation.

use crate::types::Player;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Terminal status reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The match has not been decided
    Undecided,

    /// The given player won
    Won(Player),

    /// Nobody won
    Draw,
}

/// A mutable, cloneable, turn-based simulation state.
///
/// # Contract
///
/// - `clone()` is an independent deep copy
/// - `world()` is the physical sub-state competitors must not alter;
///   equality is deep equivalence
/// - `submit()` never fails: illegal actions are dropped or corrected by
///   the engine's own validation
/// - `advance()` moves exactly one tick forward and reports whether the
///   match ended naturally
/// - `tick()` is monotone
pub trait SimulationState: Clone + Debug + Send + Serialize + DeserializeOwned + 'static {
    /// Static rules (unit type table) competitors are constructed with
    type Rules: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static;

    /// Physical world snapshot
    type World: Clone + Debug + PartialEq + Send + Serialize + DeserializeOwned + 'static;

    /// One competitor's proposal for one tick
    type Action: Clone + Debug + Default + PartialEq + Send + Serialize + DeserializeOwned + 'static;

    /// Returns the rules this state was built with.
    fn rules(&self) -> &Self::Rules;

    /// Returns the physical world.
    fn world(&self) -> &Self::World;

    /// Returns the current tick.
    fn tick(&self) -> u64;

    /// Queues a player's action for the next advance.
    fn submit(&mut self, player: Player, action: &Self::Action);

    /// Advances one tick. Returns true if the match is over.
    fn advance(&mut self) -> bool;

    /// Returns the current outcome.
    fn outcome(&self) -> Outcome;
}
