//! Skirmish - a small grid battle implementing the harness's engine contract.
//!
//! Each tick resolves in three phases:
//!
//! 1. **Attacks**: every valid attack order deals its damage simultaneously
//! 2. **Casualties**: units at or below zero hit points are removed
//! 3. **Moves**: surviving units move one cell in unit-id order; a move into
//!    an occupied cell is skipped
//!
//! Orders are validated when submitted and illegal ones are dropped.

use crate::units::{UnitKind, UnitTypeTable};

use arena_core::{Outcome, Player, SimulationState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// A grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance.
    pub fn distance(&self, other: &Position) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// The neighbouring cell in `direction`.
    pub fn step(&self, direction: Direction) -> Position {
        let (dx, dy) = direction.delta();
        Position::new(self.x + dx, self.y + dy)
    }
}

/// Compass direction of a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Direction::Up, Direction::Down, Direction::Left, Direction::Right];

    fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

/// A unit on the battlefield.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Unique id; also the move resolution order
    pub id: u32,

    /// Controlling player
    pub owner: Player,

    /// Unit type
    pub kind: UnitKind,

    /// Remaining hit points
    pub hp: i32,

    /// Current cell
    pub position: Position,
}

/// The physical world competitors observe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Battlefield {
    pub width: i32,
    pub height: i32,

    /// Units sorted by id
    pub units: Vec<Unit>,
}

impl Battlefield {
    /// Returns true if `position` lies on the grid.
    pub fn in_bounds(&self, position: Position) -> bool {
        (0..self.width).contains(&position.x) && (0..self.height).contains(&position.y)
    }

    /// Returns the unit with `id`.
    pub fn unit(&self, id: u32) -> Option<&Unit> {
        self.units
            .binary_search_by_key(&id, |u| u.id)
            .ok()
            .map(|index| &self.units[index])
    }

    /// Returns `player`'s units.
    pub fn units_of(&self, player: Player) -> impl Iterator<Item = &Unit> {
        self.units.iter().filter(move |u| u.owner == player)
    }

    /// Returns how many units `player` has left.
    pub fn count(&self, player: Player) -> usize {
        self.units_of(player).count()
    }
}

/// What a single unit should do this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Command {
    Move { direction: Direction },
    Attack { target: u32 },
}

/// A command addressed to one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub unit: u32,
    pub command: Command,
}

/// One player's orders for one tick; units without an order idle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orders {
    pub orders: Vec<Order>,
}

impl Orders {
    /// No orders at all.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Adds an order.
    pub fn push(&mut self, unit: u32, command: Command) {
        self.orders.push(Order { unit, command });
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

/// Full engine state: rules, battlefield, tick and queued orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skirmish {
    rules: UnitTypeTable,
    battlefield: Battlefield,
    tick: u64,

    /// Validated orders waiting for the next advance
    #[serde(skip)]
    pending: [Vec<Order>; 2],
}

impl Skirmish {
    /// Creates a state at tick 0. Units are sorted by id.
    pub fn new(rules: UnitTypeTable, mut battlefield: Battlefield) -> Self {
        battlefield.units.sort_by_key(|u| u.id);
        Self {
            rules,
            battlefield,
            tick: 0,
            pending: Default::default(),
        }
    }

    /// Returns the battlefield.
    pub fn battlefield(&self) -> &Battlefield {
        &self.battlefield
    }

    /// Returns the orders queued for `player`.
    pub fn pending(&self, player: Player) -> &[Order] {
        &self.pending[player.index()]
    }

    fn validate(&self, player: Player, order: &Order) -> Result<(), &'static str> {
        let unit = self.battlefield.unit(order.unit).ok_or("no such unit")?;
        if unit.owner != player {
            return Err("unit belongs to the opponent");
        }
        match order.command {
            Command::Move { direction } => {
                if !self.battlefield.in_bounds(unit.position.step(direction)) {
                    return Err("move leaves the battlefield");
                }
                if self.tick % self.rules.stats(unit.kind).move_interval.max(1) != 0 {
                    return Err("unit cannot move this tick");
                }
            }
            Command::Attack { target } => {
                let victim = self.battlefield.unit(target).ok_or("no such target")?;
                if victim.owner == player {
                    return Err("target is friendly");
                }
                if unit.position.distance(&victim.position) > self.rules.stats(unit.kind).attack_range {
                    return Err("target out of range");
                }
            }
        }
        Ok(())
    }

    fn resolve_attacks(&mut self) {
        let mut damage: BTreeMap<u32, i32> = BTreeMap::new();
        for order in self.pending.iter().flatten() {
            if let Command::Attack { target } = order.command {
                if let Some(attacker) = self.battlefield.unit(order.unit) {
                    *damage.entry(target).or_default() += self.rules.stats(attacker.kind).damage;
                }
            }
        }

        for unit in &mut self.battlefield.units {
            if let Some(dealt) = damage.get(&unit.id) {
                unit.hp -= dealt;
            }
        }

        let before = self.battlefield.units.len();
        self.battlefield.units.retain(|u| u.hp > 0);
        let fallen = before - self.battlefield.units.len();
        if fallen > 0 {
            debug!("Tick {}: {} units fell", self.tick, fallen);
        }
    }

    fn resolve_moves(&mut self) {
        let mut moves: Vec<(u32, Direction)> = self
            .pending
            .iter()
            .flatten()
            .filter_map(|order| match order.command {
                Command::Move { direction } => Some((order.unit, direction)),
                Command::Attack { .. } => None,
            })
            .collect();
        moves.sort_by_key(|(id, _)| *id);

        let mut occupied: HashSet<Position> = self.battlefield.units.iter().map(|u| u.position).collect();
        for (id, direction) in moves {
            let Ok(index) = self.battlefield.units.binary_search_by_key(&id, |u| u.id) else {
                continue; // fell this tick
            };
            let from = self.battlefield.units[index].position;
            let to = from.step(direction);
            if occupied.contains(&to) {
                continue;
            }
            occupied.remove(&from);
            occupied.insert(to);
            self.battlefield.units[index].position = to;
        }
    }

    fn is_over(&self) -> bool {
        Player::ALL.iter().any(|p| self.battlefield.count(*p) == 0)
    }
}

impl SimulationState for Skirmish {
    type Rules = UnitTypeTable;
    type World = Battlefield;
    type Action = Orders;

    fn rules(&self) -> &UnitTypeTable {
        &self.rules
    }

    fn world(&self) -> &Battlefield {
        &self.battlefield
    }

    fn tick(&self) -> u64 {
        self.tick
    }

    fn submit(&mut self, player: Player, action: &Orders) {
        let mut accepted = Vec::with_capacity(action.len());
        let mut ordered: HashSet<u32> = HashSet::new();

        for order in &action.orders {
            if ordered.contains(&order.unit) {
                debug!("{}: dropped second order for unit {}", player, order.unit);
                continue;
            }
            match self.validate(player, order) {
                Ok(()) => {
                    ordered.insert(order.unit);
                    accepted.push(*order);
                }
                Err(reason) => debug!("{}: dropped order {:?}: {}", player, order, reason),
            }
        }

        self.pending[player.index()] = accepted;
    }

    fn advance(&mut self) -> bool {
        self.resolve_attacks();
        self.resolve_moves();
        self.pending = Default::default();
        self.tick += 1;
        self.is_over()
    }

    fn outcome(&self) -> Outcome {
        match (self.battlefield.count(Player::One), self.battlefield.count(Player::Two)) {
            (0, 0) => Outcome::Draw,
            (0, _) => Outcome::Won(Player::Two),
            (_, 0) => Outcome::Won(Player::One),
            _ => Outcome::Undecided,
        }
    }
}
