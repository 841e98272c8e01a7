//! Per-tick snapshot trace (`trace.json`).

use crate::engine::SimulationState;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single tick of the trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry<W, A> {
    /// Tick the snapshot was taken at
    pub tick: u64,

    /// World snapshot (before the actions were applied)
    pub world: W,

    /// Actions submitted this tick in player order; empty for bracket entries
    #[serde(default = "Vec::new")]
    pub actions: Vec<A>,
}

impl<W, A> TraceEntry<W, A> {
    /// An entry without actions, recorded before and after play.
    pub fn bracket(tick: u64, world: W) -> Self {
        Self {
            tick,
            world,
            actions: Vec::new(),
        }
    }

    /// An entry for a played tick.
    pub fn played(tick: u64, world: W, actions: Vec<A>) -> Self {
        Self {
            tick,
            world,
            actions,
        }
    }

    /// Returns true for bracket entries.
    pub fn is_bracket(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Ordered, append-only record of a match.
///
/// Carries the rules the match was played under, so a replay needs
/// nothing beyond `trace.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace<R, W, A> {
    /// Match identifier
    pub match_id: Uuid,

    /// Scenario reference the match was played on
    pub scenario: String,

    /// Rules in force for the whole match
    pub rules: R,

    /// Entries in tick order
    pub entries: Vec<TraceEntry<W, A>>,
}

/// The trace type for a given engine.
pub type MatchTrace<S> = Trace<
    <S as SimulationState>::Rules,
    <S as SimulationState>::World,
    <S as SimulationState>::Action,
>;

impl<R, W, A> Trace<R, W, A> {
    /// Creates an empty trace.
    pub fn new(match_id: Uuid, scenario: &str, rules: R) -> Self {
        Self {
            match_id,
            scenario: scenario.to_string(),
            rules,
            entries: Vec::new(),
        }
    }

    /// Appends an entry.
    pub fn push(&mut self, entry: TraceEntry<W, A>) {
        self.entries.push(entry);
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entries that carry actions.
    pub fn played(&self) -> impl Iterator<Item = &TraceEntry<W, A>> {
        self.entries.iter().filter(|e| !e.is_bracket())
    }
}
