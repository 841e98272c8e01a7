//! Built-in skirmish agents, available under the trusted locator `"."`.
//!
//! | entry point | constructors       | behaviour                          |
//! |-------------|--------------------|------------------------------------|
//! | `passive`   | basic              | never issues an order              |
//! | `random`    | budgeted, basic    | seeded random moves and attacks    |
//! | `rush`      | budgeted           | closes on the nearest enemy        |

use crate::units::UnitTypeTable;
use crate::world::{Command, Direction, Orders, Skirmish, Unit};

use arena_core::{AgentError, AgentRegistry, Budget, BoxedCompetitor, Competitor, Player, SimulationState};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

/// Seed for the `random` agent; matches replay bit for bit.
pub const RANDOM_AGENT_SEED: u64 = 0x5eed_a4e4a;

/// Entry points registered by `builtin_registry`.
pub const BUILTIN_AGENTS: [&str; 3] = ["passive", "random", "rush"];

/// Returns the trusted code space with every built-in agent.
pub fn builtin_registry() -> AgentRegistry<Skirmish> {
    let mut registry = AgentRegistry::new();
    registry
        .register_basic("passive", |_rules| Ok(Box::new(Passive) as BoxedCompetitor<Skirmish>))
        .register_budgeted("random", |rules, budget| {
            Ok(Box::new(RandomAgent::new(rules, Some(budget))) as BoxedCompetitor<Skirmish>)
        })
        .register_basic("random", |rules| {
            Ok(Box::new(RandomAgent::new(rules, None)) as BoxedCompetitor<Skirmish>)
        })
        .register_budgeted("rush", |rules, budget| {
            Ok(Box::new(Rush::new(rules, budget)?) as BoxedCompetitor<Skirmish>)
        });
    registry
}

/// Never does anything.
pub struct Passive;

impl Competitor<Skirmish> for Passive {
    fn name(&self) -> &str {
        "passive"
    }

    fn decide(&mut self, _player: Player, _state: &mut Skirmish) -> Result<Orders, AgentError> {
        Ok(Orders::idle())
    }
}

/// Attacks a random enemy in range, otherwise moves at random or idles.
pub struct RandomAgent {
    rules: UnitTypeTable,
    rng: ChaCha8Rng,
}

impl RandomAgent {
    pub fn new(rules: &UnitTypeTable, budget: Option<Budget>) -> Self {
        if let Some(budget) = budget {
            debug!("random agent built with a {}ms budget", budget.millis);
        }
        Self {
            rules: rules.clone(),
            rng: ChaCha8Rng::seed_from_u64(RANDOM_AGENT_SEED),
        }
    }
}

impl Competitor<Skirmish> for RandomAgent {
    fn name(&self) -> &str {
        "random"
    }

    fn decide(&mut self, player: Player, state: &mut Skirmish) -> Result<Orders, AgentError> {
        let field = state.world();
        let mut orders = Orders::idle();

        for unit in field.units_of(player) {
            let range = self.rules.stats(unit.kind).attack_range;
            let targets: Vec<u32> = field
                .units_of(player.opponent())
                .filter(|enemy| unit.position.distance(&enemy.position) <= range)
                .map(|enemy| enemy.id)
                .collect();

            if let Some(&target) = targets.choose(&mut self.rng) {
                orders.push(unit.id, Command::Attack { target });
            } else if self.rng.gen_bool(0.75) {
                let direction = Direction::ALL[self.rng.gen_range(0..Direction::ALL.len())];
                orders.push(unit.id, Command::Move { direction });
            }
        }

        Ok(orders)
    }
}

/// Every unit attacks the weakest enemy in range, or steps toward the
/// nearest one.
pub struct Rush {
    rules: UnitTypeTable,
}

impl Rush {
    pub fn new(rules: &UnitTypeTable, budget: Budget) -> Result<Self, AgentError> {
        if budget.millis == 0 {
            return Err(AgentError::failed("rush needs a non-zero budget"));
        }
        Ok(Self { rules: rules.clone() })
    }

    fn step_toward(unit: &Unit, target: &Unit) -> Direction {
        let dx = target.position.x - unit.position.x;
        let dy = target.position.y - unit.position.y;
        if dx.abs() >= dy.abs() {
            if dx > 0 {
                Direction::Right
            } else {
                Direction::Left
            }
        } else if dy > 0 {
            Direction::Down
        } else {
            Direction::Up
        }
    }
}

impl Competitor<Skirmish> for Rush {
    fn name(&self) -> &str {
        "rush"
    }

    fn decide(&mut self, player: Player, state: &mut Skirmish) -> Result<Orders, AgentError> {
        let field = state.world();
        let mut orders = Orders::idle();

        for unit in field.units_of(player) {
            let range = self.rules.stats(unit.kind).attack_range;

            let weakest_in_range = field
                .units_of(player.opponent())
                .filter(|enemy| unit.position.distance(&enemy.position) <= range)
                .min_by_key(|enemy| (enemy.hp, enemy.id));
            if let Some(target) = weakest_in_range {
                orders.push(unit.id, Command::Attack { target: target.id });
                continue;
            }

            let nearest = field
                .units_of(player.opponent())
                .min_by_key(|enemy| (unit.position.distance(&enemy.position), enemy.id));
            if let Some(target) = nearest {
                orders.push(
                    unit.id,
                    Command::Move {
                        direction: Self::step_toward(unit, target),
                    },
                );
            }
        }

        Ok(orders)
    }
}
