//! Unit types of the skirmish engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kinds of unit on the battlefield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Worker,
    Light,
    Heavy,
    Ranged,
}

impl UnitKind {
    /// All kinds in table order.
    pub const ALL: [UnitKind; 4] = [UnitKind::Worker, UnitKind::Light, UnitKind::Heavy, UnitKind::Ranged];

    /// Returns the kind's name.
    pub fn name(&self) -> &'static str {
        match self {
            UnitKind::Worker => "worker",
            UnitKind::Light => "light",
            UnitKind::Heavy => "heavy",
            UnitKind::Ranged => "ranged",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Combat and movement statistics of one unit kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStats {
    /// Hit points at spawn
    pub max_hp: i32,

    /// Damage dealt per attack
    pub damage: i32,

    /// Attack range (Manhattan distance)
    pub attack_range: u32,

    /// The unit may move on ticks divisible by this
    pub move_interval: u64,
}

/// Static rules every competitor is constructed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitTypeTable {
    stats: BTreeMap<UnitKind, UnitStats>,
}

impl UnitTypeTable {
    /// The standard table.
    pub fn standard() -> Self {
        let stats = UnitKind::ALL
            .into_iter()
            .map(|kind| {
                let stats = match kind {
                    UnitKind::Worker => UnitStats {
                        max_hp: 1,
                        damage: 1,
                        attack_range: 1,
                        move_interval: 1,
                    },
                    UnitKind::Light => UnitStats {
                        max_hp: 4,
                        damage: 2,
                        attack_range: 1,
                        move_interval: 1,
                    },
                    UnitKind::Heavy => UnitStats {
                        max_hp: 8,
                        damage: 4,
                        attack_range: 1,
                        move_interval: 2,
                    },
                    UnitKind::Ranged => UnitStats {
                        max_hp: 3,
                        damage: 1,
                        attack_range: 3,
                        move_interval: 1,
                    },
                };
                (kind, stats)
            })
            .collect();
        Self { stats }
    }

    /// Returns the stats of `kind`.
    ///
    /// Tables deserialized from untrusted input may omit kinds; those fall
    /// back to the standard stats.
    pub fn stats(&self, kind: UnitKind) -> UnitStats {
        self.stats
            .get(&kind)
            .copied()
            .unwrap_or_else(|| Self::standard().stats[&kind])
    }
}

impl Default for UnitTypeTable {
    fn default() -> Self {
        Self::standard()
    }
}
