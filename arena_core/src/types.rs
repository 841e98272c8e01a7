//! Shared identifiers used across the harness.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two competitors.
///
/// Serialized with the harness's 1/2 convention; `index()` gives the
/// engine's 0/1 convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Player {
    /// Competitor A, always served first
    One,
    /// Competitor B
    Two,
}

impl Player {
    /// Both players in turn order.
    pub const ALL: [Player; 2] = [Player::One, Player::Two];

    /// Engine-side index (0 or 1).
    pub fn index(self) -> usize {
        match self {
            Player::One => 0,
            Player::Two => 1,
        }
    }

    /// Harness-side number (1 or 2).
    pub fn number(self) -> u8 {
        match self {
            Player::One => 1,
            Player::Two => 2,
        }
    }

    /// The other player.
    pub fn opponent(self) -> Player {
        match self {
            Player::One => Player::Two,
            Player::Two => Player::One,
        }
    }

    /// Maps an engine index back to a player.
    pub fn from_index(index: usize) -> Option<Player> {
        match index {
            0 => Some(Player::One),
            1 => Some(Player::Two),
            _ => None,
        }
    }
}

impl From<Player> for u8 {
    fn from(player: Player) -> u8 {
        player.number()
    }
}

impl TryFrom<u8> for Player {
    type Error = String;

    fn try_from(number: u8) -> Result<Self, Self::Error> {
        match number {
            1 => Ok(Player::One),
            2 => Ok(Player::Two),
            other => Err(format!("player must be 1 or 2, got {}", other)),
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player {}", self.number())
    }
}

/// Resource hint handed to competitors that accept one.
///
/// Purely advisory: the decision deadline is what the harness enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    /// Suggested thinking time per decision in milliseconds
    pub millis: u64,
}

impl Budget {
    /// Creates a budget of `millis` milliseconds.
    pub fn from_millis(millis: u64) -> Self {
        Self { millis }
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self { millis: 100 }
    }
}
