//! The outcome record of a match (`result.json`).

use crate::engine::Outcome;
use crate::types::Player;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

/// Who won, in the harness's 0/1/2 convention (0 = draw or unresolved).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Winner {
    /// Draw, or the tick cap ended an undecided match
    Draw,

    /// A player won
    Player(Player),
}

impl Winner {
    /// Maps the engine's outcome query to a winner.
    pub fn from_outcome(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Won(player) => Winner::Player(player),
            Outcome::Draw | Outcome::Undecided => Winner::Draw,
        }
    }
}

impl From<Winner> for u8 {
    fn from(winner: Winner) -> u8 {
        match winner {
            Winner::Draw => 0,
            Winner::Player(player) => player.number(),
        }
    }
}

impl TryFrom<u8> for Winner {
    type Error = String;

    fn try_from(number: u8) -> Result<Self, Self::Error> {
        match number {
            0 => Ok(Winner::Draw),
            other => Player::try_from(other).map(Winner::Player),
        }
    }
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Winner::Draw => write!(f, "draw"),
            Winner::Player(player) => write!(f, "{}", player),
        }
    }
}

/// Final record of a match.
///
/// Built only through `decided` / `disqualified`, which keep the
/// invariants: a disqualification always names the opponent as winner, and
/// `duration` is `-1` exactly when play never started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Winning side (0 = draw)
    pub winner: Winner,

    /// Side that broke the rules, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disqualified: Option<Player>,

    /// Human-readable diagnostic for a disqualification
    #[serde(rename = "stackTrace", default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,

    /// Ticks played, or -1 if the match failed before play
    pub duration: i64,
}

impl MatchResult {
    /// Duration recorded when a match fails before tick 0.
    pub const NOT_STARTED: i64 = -1;

    /// A match decided by the engine.
    pub fn decided(outcome: Outcome, ticks: u64) -> Self {
        Self {
            winner: Winner::from_outcome(outcome),
            disqualified: None,
            stack_trace: None,
            duration: ticks as i64,
        }
    }

    /// A match decided against `offender`.
    ///
    /// `ticks` is `None` when the failure happened before play started.
    pub fn disqualified(offender: Player, detail: String, ticks: Option<u64>) -> Self {
        Self {
            winner: Winner::Player(offender.opponent()),
            disqualified: Some(offender),
            stack_trace: Some(detail),
            duration: ticks.map_or(Self::NOT_STARTED, |t| t as i64),
        }
    }

    /// Returns true if a competitor was disqualified.
    pub fn is_disqualification(&self) -> bool {
        self.disqualified.is_some()
    }

    /// Returns true if play never started.
    pub fn never_started(&self) -> bool {
        self.duration == Self::NOT_STARTED
    }
}

/// Renders an error and its `source()` chain as an indented trace.
///
/// ```text
/// Instantiation failed
///   caused by: Spawn error: ./agent: No such file or directory
/// ```
pub fn render_chain(error: &dyn Error) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str("\n  caused by: ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
