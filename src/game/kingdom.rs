//! Kingdom registry records.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GameError, GameResult};
use crate::game::{BuildingId, Coord, Cost, FactionId, Resource};

/// Unique identifier for a kingdom.
pub type KingdomId = u8;

/// The human-controlled kingdom.
pub const PLAYER_KINGDOM: KingdomId = 0;

/// Maximum number of kingdoms, player included.
pub const MAX_KINGDOMS: usize = 5;

/// Kind of stockpiled resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Harvested from trees.
    Wood,
    /// Harvested from stone nodes.
    Stone,
    /// Harvested from berries.
    Food,
}

impl From<Resource> for ResourceKind {
    fn from(node: Resource) -> Self {
        match node {
            Resource::Tree => ResourceKind::Wood,
            Resource::Stone => ResourceKind::Stone,
            Resource::Berry => ResourceKind::Food,
        }
    }
}

/// A kingdom treasury. Counters are unsigned and every spend is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Resources {
    /// Wood in stock.
    pub wood: u32,
    /// Stone in stock.
    pub stone: u32,
    /// Food in stock.
    pub food: u32,
}

impl Resources {
    /// Create a treasury.
    #[must_use]
    pub const fn new(wood: u32, stone: u32, food: u32) -> Self {
        Self { wood, stone, food }
    }

    /// Whether the treasury covers `cost`.
    #[must_use]
    pub const fn can_afford(&self, cost: Cost) -> bool {
        self.wood >= cost.wood && self.stone >= cost.stone && self.food >= cost.food
    }

    /// Deduct `cost`, or leave the treasury untouched if it cannot be covered.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InsufficientResources`] without mutating anything.
    pub fn spend(&mut self, cost: Cost) -> GameResult<()> {
        if !self.can_afford(cost) {
            return Err(GameError::InsufficientResources {
                needed: cost,
                available: *self,
            });
        }
        self.wood -= cost.wood;
        self.stone -= cost.stone;
        self.food -= cost.food;
        Ok(())
    }

    /// Add resources, saturating.
    pub fn gain(&mut self, amount: Cost) {
        self.wood = self.wood.saturating_add(amount.wood);
        self.stone = self.stone.saturating_add(amount.stone);
        self.food = self.food.saturating_add(amount.food);
    }

    /// Add `amount` of a single kind.
    pub fn add(&mut self, kind: ResourceKind, amount: u32) {
        let slot = match kind {
            ResourceKind::Wood => &mut self.wood,
            ResourceKind::Stone => &mut self.stone,
            ResourceKind::Food => &mut self.food,
        };
        *slot = slot.saturating_add(amount);
    }

    /// Stock of a single kind.
    #[must_use]
    pub const fn get(&self, kind: ResourceKind) -> u32 {
        match kind {
            ResourceKind::Wood => self.wood,
            ResourceKind::Stone => self.stone,
            ResourceKind::Food => self.food,
        }
    }

    /// Sum of all stock.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.wood
            .saturating_add(self.stone)
            .saturating_add(self.food)
    }

    /// Remove and return half of every counter (rounded down).
    pub fn take_half(&mut self) -> Cost {
        let taken = Cost::new(self.wood / 2, self.stone / 2, self.food / 2);
        self.wood -= taken.wood;
        self.stone -= taken.stone;
        self.food -= taken.food;
        taken
    }
}

impl fmt::Display for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wood {}, stone {}, food {}", self.wood, self.stone, self.food)
    }
}

/// A wall tile destroyed in combat, waiting to be rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallBreach {
    /// Tile the wall stood on.
    pub coord: Coord,
    /// Simulation time of the breach.
    pub broken_at_ms: u64,
}

/// State for a single kingdom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kingdom {
    /// Unique identifier (0 is the player).
    pub id: KingdomId,
    /// Diplomatic identity of the kingdom.
    pub faction: FactionId,
    /// Location of the capital.
    pub capital: Coord,
    /// Treasury.
    pub resources: Resources,
    /// Wall tiles owned by this kingdom. Mirrors `is_wall && territory == id`.
    pub wall_perimeter: BTreeSet<Coord>,
    /// Expansion speed multiplier.
    pub expansion_rate: f64,
    /// Simulation time of the last expansion batch.
    pub last_expansion_ms: u64,
    /// Breached walls awaiting repair, oldest first.
    pub walls_to_repair: Vec<WallBreach>,
    /// Barracks currently training a soldier.
    pub training_in_progress: BTreeSet<BuildingId>,
    /// Whether the kingdom is still in play.
    pub alive: bool,
}

impl Kingdom {
    /// Create a new kingdom with the given id and capital.
    #[must_use]
    pub fn new(id: KingdomId, faction: FactionId, capital: Coord, resources: Resources) -> Self {
        Self {
            id,
            faction,
            capital,
            resources,
            wall_perimeter: BTreeSet::new(),
            expansion_rate: 1.0,
            last_expansion_ms: 0,
            walls_to_repair: Vec::new(),
            training_in_progress: BTreeSet::new(),
            alive: true,
        }
    }

    /// Whether this is the player's kingdom.
    #[must_use]
    pub const fn is_player(&self) -> bool {
        self.id == PLAYER_KINGDOM
    }

    /// Queue a breached wall for repair.
    pub fn record_breach(&mut self, coord: Coord, now_ms: u64) {
        if self.walls_to_repair.iter().any(|b| b.coord == coord) {
            return;
        }
        self.walls_to_repair.push(WallBreach {
            coord,
            broken_at_ms: now_ms,
        });
    }

    /// Remove a breach from the repair queue.
    pub fn clear_breach(&mut self, coord: Coord) {
        self.walls_to_repair.retain(|b| b.coord != coord);
    }

    /// Mark the kingdom as defeated and drop its bookkeeping.
    pub fn eliminate(&mut self) {
        self.alive = false;
        self.wall_perimeter.clear();
        self.walls_to_repair.clear();
        self.training_in_progress.clear();
    }
}
