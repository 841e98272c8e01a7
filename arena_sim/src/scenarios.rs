//! Starting positions for skirmish matches.
//!
//! A scenario reference is either a preset name (`duel`, `skirmish`,
//! `standoff`) or a path to a JSON scenario file:
//!
//! ```json
//! {
//!   "name": "corridor",
//!   "width": 10,
//!   "height": 3,
//!   "units": [
//!     { "owner": 1, "kind": "light", "x": 0, "y": 1 },
//!     { "owner": 2, "kind": "heavy", "x": 9, "y": 1 }
//!   ]
//! }
//! ```

use crate::units::{UnitKind, UnitTypeTable};
use crate::world::{Battlefield, Position, Skirmish, Unit};

use arena_core::Player;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

/// Errors resolving or building a scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Unknown scenario: {0} (not a preset and no such file)")]
    Unknown(String),

    #[error("Failed to read scenario {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed scenario file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid scenario: {0}")]
    Invalid(String),
}

/// Built-in starting positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// One light unit each on a small board
    Duel,

    /// Mixed armies on a medium board
    Skirmish,

    /// Heavies far apart; passive agents run into the tick cap
    Standoff,
}

impl Preset {
    /// Returns all presets.
    pub fn all() -> Vec<Preset> {
        vec![Preset::Duel, Preset::Skirmish, Preset::Standoff]
    }

    /// Returns the preset name.
    pub fn name(&self) -> &'static str {
        match self {
            Preset::Duel => "duel",
            Preset::Skirmish => "skirmish",
            Preset::Standoff => "standoff",
        }
    }

    /// Returns the preset's scenario.
    pub fn scenario(&self) -> Scenario {
        let spawn = |owner: u8, kind, x, y| UnitSpawn {
            owner: if owner == 1 { Player::One } else { Player::Two },
            kind,
            x,
            y,
        };

        match self {
            Preset::Duel => Scenario {
                name: self.name().to_string(),
                width: 8,
                height: 8,
                units: vec![spawn(1, UnitKind::Light, 1, 1), spawn(2, UnitKind::Light, 6, 6)],
            },
            Preset::Skirmish => Scenario {
                name: self.name().to_string(),
                width: 12,
                height: 12,
                units: vec![
                    spawn(1, UnitKind::Worker, 1, 1),
                    spawn(1, UnitKind::Light, 2, 1),
                    spawn(1, UnitKind::Heavy, 1, 2),
                    spawn(1, UnitKind::Ranged, 2, 2),
                    spawn(2, UnitKind::Worker, 10, 10),
                    spawn(2, UnitKind::Light, 9, 10),
                    spawn(2, UnitKind::Heavy, 10, 9),
                    spawn(2, UnitKind::Ranged, 9, 9),
                ],
            },
            Preset::Standoff => Scenario {
                name: self.name().to_string(),
                width: 16,
                height: 4,
                units: vec![spawn(1, UnitKind::Heavy, 0, 1), spawn(2, UnitKind::Heavy, 15, 2)],
            },
        }
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "duel" => Ok(Preset::Duel),
            "skirmish" => Ok(Preset::Skirmish),
            "standoff" => Ok(Preset::Standoff),
            _ => Err(format!("Unknown preset: {}", s)),
        }
    }
}

/// A unit placed at the start of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSpawn {
    pub owner: Player,
    pub kind: UnitKind,
    pub x: i32,
    pub y: i32,
}

/// Board size and starting units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub width: i32,
    pub height: i32,
    pub units: Vec<UnitSpawn>,
}

impl Scenario {
    /// Resolves a preset name or a scenario file path.
    pub fn resolve(reference: &str) -> Result<Self, ScenarioError> {
        if let Ok(preset) = reference.parse::<Preset>() {
            return Ok(preset.scenario());
        }

        let path = Path::new(reference);
        if path.is_file() {
            return Self::from_file(path);
        }

        Err(ScenarioError::Unknown(reference.to_string()))
    }

    /// Reads a scenario file.
    pub fn from_file(path: &Path) -> Result<Self, ScenarioError> {
        let text = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let scenario: Scenario = serde_json::from_str(&text)?;
        info!("Loaded scenario '{}' from {}", scenario.name, path.display());
        Ok(scenario)
    }

    /// Builds the tick-0 state, checking the layout.
    pub fn build(&self, rules: UnitTypeTable) -> Result<Skirmish, ScenarioError> {
        if self.width <= 0 || self.height <= 0 {
            return Err(ScenarioError::Invalid(format!(
                "board must be at least 1x1, got {}x{}",
                self.width, self.height
            )));
        }

        let mut taken = HashSet::new();
        let mut units = Vec::with_capacity(self.units.len());
        for (index, spawn) in self.units.iter().enumerate() {
            let position = Position::new(spawn.x, spawn.y);
            if !(0..self.width).contains(&spawn.x) || !(0..self.height).contains(&spawn.y) {
                return Err(ScenarioError::Invalid(format!(
                    "{} at ({}, {}) is off the board",
                    spawn.kind, spawn.x, spawn.y
                )));
            }
            if !taken.insert(position) {
                return Err(ScenarioError::Invalid(format!(
                    "two units share ({}, {})",
                    spawn.x, spawn.y
                )));
            }
            units.push(Unit {
                id: index as u32 + 1,
                owner: spawn.owner,
                kind: spawn.kind,
                hp: rules.stats(spawn.kind).max_hp,
                position,
            });
        }

        for player in Player::ALL {
            if !units.iter().any(|u| u.owner == player) {
                return Err(ScenarioError::Invalid(format!("{} has no units", player)));
            }
        }

        Ok(Skirmish::new(
            rules,
            Battlefield {
                width: self.width,
                height: self.height,
                units,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::SimulationState;
    use std::io::Write;

    #[test]
    fn test_presets_build() {
        for preset in Preset::all() {
            let state = preset.scenario().build(UnitTypeTable::standard()).unwrap();
            assert_eq!(state.tick(), 0);
            assert_eq!(preset.name().parse::<Preset>().unwrap(), preset);
        }
    }

    #[test]
    fn test_resolve_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"name":"corridor","width":10,"height":3,"units":[
                {{"owner":1,"kind":"light","x":0,"y":1}},
                {{"owner":2,"kind":"heavy","x":9,"y":1}}]}}"#
        )
        .unwrap();

        let scenario = Scenario::resolve(file.path().to_str().unwrap()).unwrap();
        assert_eq!(scenario.name, "corridor");
        assert_eq!(scenario.units[1].owner, Player::Two);

        let state = scenario.build(UnitTypeTable::standard()).unwrap();
        assert_eq!(state.world().unit(2).unwrap().hp, 8);
    }

    #[test]
    fn test_bundled_scenario_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios/corridor.json");
        let scenario = Scenario::from_file(&path).unwrap();
        let state = scenario.build(UnitTypeTable::standard()).unwrap();
        assert_eq!(state.world().count(Player::One), 2);
        assert_eq!(state.world().count(Player::Two), 2);
    }

    #[test]
    fn test_unknown_reference() {
        let result = Scenario::resolve("no_such_scenario_anywhere.json");
        assert!(matches!(result, Err(ScenarioError::Unknown(_))));
    }

    #[test]
    fn test_invalid_layouts() {
        let mut scenario = Preset::Duel.scenario();
        scenario.units[1].x = 1;
        scenario.units[1].y = 1;
        assert!(matches!(
            scenario.build(UnitTypeTable::standard()),
            Err(ScenarioError::Invalid(_))
        ));

        let mut scenario = Preset::Duel.scenario();
        scenario.units.pop();
        assert!(matches!(
            scenario.build(UnitTypeTable::standard()),
            Err(ScenarioError::Invalid(_))
        ));
    }
}
