//! Buildings and their costs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::game::{Coord, KingdomId};

/// Unique identifier for a building.
pub type BuildingId = u32;

/// Kind of structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingType {
    /// Raises the soldier cap by two.
    House,
    /// Trains soldiers.
    Barracks,
    /// Food production site.
    Mill,
    /// Defensive structure.
    Tower,
    /// Territory boundary segment.
    Wall,
}

impl BuildingType {
    /// Construction cost.
    #[must_use]
    pub const fn cost(self) -> Cost {
        match self {
            BuildingType::House | BuildingType::Mill => Cost::new(30, 20, 0),
            BuildingType::Barracks => Cost::new(40, 30, 0),
            BuildingType::Tower => Cost::new(20, 40, 0),
            BuildingType::Wall => Cost::new(2, 3, 0),
        }
    }

    /// Health of a freshly built structure.
    #[must_use]
    pub const fn max_health(self) -> f64 {
        match self {
            BuildingType::House | BuildingType::Mill => 100.0,
            BuildingType::Barracks => 150.0,
            BuildingType::Tower => 200.0,
            BuildingType::Wall => 80.0,
        }
    }

    /// Amount returned to the treasury when the structure is demolished
    /// or pruned: half the cost, rounded down.
    #[must_use]
    pub const fn refund(self) -> Cost {
        let cost = self.cost();
        Cost::new(cost.wood / 2, cost.stone / 2, cost.food / 2)
    }
}

impl fmt::Display for BuildingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildingType::House => "house",
            BuildingType::Barracks => "barracks",
            BuildingType::Mill => "mill",
            BuildingType::Tower => "tower",
            BuildingType::Wall => "wall",
        };
        f.write_str(name)
    }
}

/// Price of an action in wood, stone and food.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Cost {
    /// Wood required.
    pub wood: u32,
    /// Stone required.
    pub stone: u32,
    /// Food required.
    pub food: u32,
}

impl Cost {
    /// Create a cost.
    #[must_use]
    pub const fn new(wood: u32, stone: u32, food: u32) -> Self {
        Self { wood, stone, food }
    }

    /// Cost multiplied by a count, saturating.
    #[must_use]
    pub const fn times(self, count: u32) -> Self {
        Self {
            wood: self.wood.saturating_mul(count),
            stone: self.stone.saturating_mul(count),
            food: self.food.saturating_mul(count),
        }
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wood {}, stone {}, food {}", self.wood, self.stone, self.food)
    }
}

/// A structure standing on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Building {
    /// Unique identifier.
    pub id: BuildingId,
    /// Kind of structure.
    pub kind: BuildingType,
    /// Tile the structure occupies.
    pub position: Coord,
    /// Remaining health. The structure is destroyed at zero.
    pub health: f64,
    /// Kingdom that owns the structure.
    pub owner: KingdomId,
}

impl Building {
    /// Create a building at full health.
    #[must_use]
    pub const fn new(id: BuildingId, kind: BuildingType, position: Coord, owner: KingdomId) -> Self {
        Self {
            id,
            kind,
            position,
            health: kind.max_health(),
            owner,
        }
    }

    /// Whether the building has been reduced to nothing.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.health <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wall_refund_is_half_cost() {
        assert_eq!(BuildingType::Wall.cost(), Cost::new(2, 3, 0));
        assert_eq!(BuildingType::Wall.refund(), Cost::new(1, 1, 0));
        assert_eq!(BuildingType::Barracks.refund(), Cost::new(20, 15, 0));
    }

    #[test]
    fn test_cost_times() {
        assert_eq!(BuildingType::Wall.cost().times(4), Cost::new(8, 12, 0));
        assert_eq!(Cost::new(u32::MAX, 1, 0).times(2).wood, u32::MAX);
    }

    #[test]
    fn test_building_destroyed() {
        let mut b = Building::new(1, BuildingType::House, Coord::new(1, 1), 0);
        assert!(!b.is_destroyed());
        b.health = 0.0;
        assert!(b.is_destroyed());
    }
}
