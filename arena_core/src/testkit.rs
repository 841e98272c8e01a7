//! Deterministic engine and scripted competitors for harness tests.

use crate::competitor::{AgentError, BoxedCompetitor, Competitor};
use crate::engine::{Outcome, SimulationState};
use crate::loader::AgentRegistry;
use crate::types::Player;

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Scores accumulated by each side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    pub score: [i64; 2],
}

/// Rule-set number every `Countdown` is played under.
pub const RULESET: u32 = 7;

/// Ends after `ends_at` ticks, or never when `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Countdown {
    ruleset: u32,
    tally: Tally,
    tick: u64,
    pending: [i64; 2],
    ends_at: Option<u64>,
}

impl Countdown {
    pub fn new(ends_at: Option<u64>) -> Self {
        Self {
            ruleset: RULESET,
            tally: Tally { score: [0, 0] },
            tick: 0,
            pending: [0, 0],
            ends_at,
        }
    }

    fn finished(&self) -> bool {
        self.ends_at.is_some_and(|end| self.tick >= end)
    }
}

impl SimulationState for Countdown {
    type Rules = u32;
    type World = Tally;
    type Action = i64;

    fn rules(&self) -> &u32 {
        &self.ruleset
    }

    fn world(&self) -> &Tally {
        &self.tally
    }

    fn tick(&self) -> u64 {
        self.tick
    }

    fn submit(&mut self, player: Player, action: &i64) {
        self.pending[player.index()] = *action;
    }

    fn advance(&mut self) -> bool {
        for (score, pending) in self.tally.score.iter_mut().zip(self.pending) {
            *score += pending;
        }
        self.pending = [0, 0];
        self.tick += 1;
        self.finished()
    }

    fn outcome(&self) -> Outcome {
        if !self.finished() {
            return Outcome::Undecided;
        }
        let [one, two] = self.tally.score;
        match one.cmp(&two) {
            std::cmp::Ordering::Greater => Outcome::Won(Player::One),
            std::cmp::Ordering::Less => Outcome::Won(Player::Two),
            std::cmp::Ordering::Equal => Outcome::Draw,
        }
    }
}

/// What a scripted competitor does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Always plays the value
    Steady(i64),

    /// Sleeps this long at the given tick
    SleepAt(u64, Duration),

    /// Rewrites the world at the given tick
    TamperAt(u64),

    /// Returns an error at the given tick
    FailAt(u64),

    /// Panics at the given tick
    PanicAt(u64),
}

pub struct Scripted {
    script: Script,
}

impl Scripted {
    pub fn boxed(script: Script) -> BoxedCompetitor<Countdown> {
        Box::new(Self { script })
    }
}

impl Competitor<Countdown> for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn decide(&mut self, _player: Player, state: &mut Countdown) -> Result<i64, AgentError> {
        let tick = state.tick();
        match self.script {
            Script::Steady(value) => Ok(value),
            Script::SleepAt(at, nap) if at == tick => {
                std::thread::sleep(nap);
                Ok(1)
            }
            Script::TamperAt(at) if at == tick => {
                state.tally.score[0] += 100;
                Ok(1)
            }
            Script::FailAt(at) if at == tick => Err(AgentError::failed("out of ideas")),
            Script::PanicAt(at) if at == tick => panic!("scripted panic"),
            _ => Ok(1),
        }
    }
}

/// Registry of scripted agents plus a counter of every constructor call.
pub fn registry(scripts: &[(&str, Script)], loads: Arc<AtomicUsize>) -> AgentRegistry<Countdown> {
    let mut registry = AgentRegistry::new();
    for &(name, script) in scripts {
        let loads = Arc::clone(&loads);
        registry.register_basic(name, move |_rules| {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(Scripted::boxed(script))
        });
    }

    registry.register_budgeted("budgeted", |_rules, _budget| Ok(Scripted::boxed(Script::Steady(2))));
    registry.register_basic("broken", |_rules| Err(AgentError::failed("missing weights")));
    registry.register_basic("slow_load", |_rules| {
        std::thread::sleep(Duration::from_millis(500));
        Ok(Scripted::boxed(Script::Steady(1)))
    });
    registry
}
