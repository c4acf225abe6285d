//! Units and the gathering state machine.
//!
//! A gathering trip is a per-unit state machine advanced one step per move:
//! walk to the node, harvest, walk home, idle. Nothing blocks; a trip whose
//! path is obstructed is simply dropped.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::game::{
    Coord, KingdomId, Map, Resource, ResourceKind, Resources, ScheduledEvent, SimulationState,
};

/// Unique identifier for a unit.
pub type UnitId = u32;

/// Resource stock below which a kind counts as scarce.
pub const SCARCITY_THRESHOLD: u32 = 50;

/// Priority weight for scarce resources in the nearest-node search.
const SCARCE_WEIGHT: f64 = 3.0;

/// Maximum distance from the capital a gatherer will travel.
pub const GATHER_RADIUS: f64 = 30.0;

/// Chance a harvest exhausts the node.
const DEPLETE_CHANCE: f64 = 0.3;

/// Chance an arriving gatherer is sent straight back out.
const REDISPATCH_CHANCE: f64 = 0.7;

/// Delay before an arriving gatherer is re-dispatched.
pub const REDISPATCH_DELAY_MS: u64 = 500;

/// Combat role of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitClass {
    /// Civilian worker; gathers resources, fights poorly.
    Peasant,
    /// Melee soldier.
    Warrior,
    /// Ranged soldier.
    Archer,
}

impl UnitClass {
    /// Whether this class is trained by barracks and counts against the
    /// soldier cap.
    #[must_use]
    pub const fn is_soldier(self) -> bool {
        matches!(self, UnitClass::Warrior | UnitClass::Archer)
    }

    /// Starting health.
    #[must_use]
    pub const fn base_health(self) -> f64 {
        match self {
            UnitClass::Peasant => 40.0,
            UnitClass::Warrior => 100.0,
            UnitClass::Archer => 70.0,
        }
    }

    /// Base attack damage.
    #[must_use]
    pub const fn base_attack(self) -> f64 {
        match self {
            UnitClass::Peasant => 4.0,
            UnitClass::Warrior => 12.0,
            UnitClass::Archer => 10.0,
        }
    }

    /// Milliseconds between moves.
    #[must_use]
    pub const fn move_delay_ms(self) -> u64 {
        match self {
            UnitClass::Peasant => 900,
            UnitClass::Warrior => 700,
            UnitClass::Archer => 800,
        }
    }
}

/// What a unit is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    /// Wandering near home.
    Idle,
    /// Pursuing a hostile target.
    Aggressive,
    /// Running from a stronger enemy.
    Fleeing,
    /// Walking to a resource node.
    Gathering,
    /// Carrying a harvest back to the capital.
    ReturningHome,
}

/// Target of an attack approach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackTarget {
    /// March on another kingdom's capital and engage what is found there.
    Kingdom(KingdomId),
    /// Chase the player avatar.
    Player,
}

/// An in-progress gathering trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatherTrip {
    /// Node being harvested.
    pub node: Coord,
    /// Kind of node.
    pub resource: Resource,
    /// Amount carried on the way home.
    pub carried: u32,
}

/// A soldier, worker or raider on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    /// Unique identifier.
    pub id: UnitId,
    /// Current tile.
    pub position: Coord,
    /// Owning kingdom.
    pub kingdom: KingdomId,
    /// Combat role.
    pub class: UnitClass,
    /// Remaining health.
    pub health: f64,
    /// Attack damage before modifiers.
    pub attack: f64,
    /// Current behaviour.
    pub behavior: Behavior,
    /// Normal delay between moves.
    pub move_delay_ms: u64,
    /// Simulation time of the next move.
    pub next_move_at_ms: u64,
    /// Active attack approach, if any.
    pub attack_path: Option<AttackTarget>,
    /// Active gathering trip, if any.
    pub gather: Option<GatherTrip>,
}

impl Unit {
    /// Create a unit with its class's base stats.
    #[must_use]
    pub fn new(id: UnitId, kingdom: KingdomId, class: UnitClass, position: Coord, now_ms: u64) -> Self {
        Self {
            id,
            position,
            kingdom,
            class,
            health: class.base_health(),
            attack: class.base_attack(),
            behavior: Behavior::Idle,
            move_delay_ms: class.move_delay_ms(),
            next_move_at_ms: now_ms + class.move_delay_ms(),
            attack_path: None,
            gather: None,
        }
    }

    /// Whether the unit is on a gathering trip in either direction.
    #[must_use]
    pub const fn is_gathering(&self) -> bool {
        matches!(self.behavior, Behavior::Gathering | Behavior::ReturningHome)
    }

    /// Whether the unit is free to receive an order.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self.behavior, Behavior::Idle) && self.attack_path.is_none()
    }

    /// Whether the unit is dead.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.health <= 0.0
    }

    /// Combat weight used for relative-strength checks.
    #[must_use]
    pub fn strength(&self) -> f64 {
        self.health.max(0.0) * self.attack
    }

    /// Drop any trip or approach and go back to idling.
    pub fn reset(&mut self) {
        self.behavior = Behavior::Idle;
        self.attack_path = None;
        self.gather = None;
    }
}

/// Priority weight for a node kind given the current treasury.
#[must_use]
pub fn scarcity_weight(resources: &Resources, node: Resource) -> f64 {
    if resources.get(ResourceKind::from(node)) < SCARCITY_THRESHOLD {
        SCARCE_WEIGHT
    } else {
        1.0
    }
}

/// Find the best node for a gatherer of `kingdom` standing at `from`.
///
/// Nodes on foreign territory or further than [`GATHER_RADIUS`] from `home`
/// are skipped. Scarce kinds are preferred through
/// `effective_distance = distance / weight`.
#[must_use]
pub fn nearest_resource_node(
    map: &Map,
    from: Coord,
    home: Coord,
    kingdom: KingdomId,
    resources: &Resources,
) -> Option<(Coord, Resource)> {
    let mut best: Option<(f64, Coord, Resource)> = None;
    for (coord, tile) in map.iter() {
        let Some(node) = tile.resource else {
            continue;
        };
        if tile.territory.is_some_and(|owner| owner != kingdom) {
            continue;
        }
        if coord.distance(home) > GATHER_RADIUS {
            continue;
        }
        let effective = from.distance(coord) / scarcity_weight(resources, node);
        if best.is_none_or(|(d, _, _)| effective < d) {
            best = Some((effective, coord, node));
        }
    }
    best.map(|(_, coord, node)| (coord, node))
}

/// Send an idle unit to the best resource node.
///
/// Returns `false` when the unit is missing, busy, or no node is in reach.
pub fn dispatch_gatherer(state: &mut SimulationState, unit_id: UnitId) -> bool {
    let Some(unit) = state.units.get(&unit_id) else {
        return false;
    };
    if !unit.is_idle() {
        return false;
    }
    let Some(kingdom) = state.kingdom(unit.kingdom) else {
        return false;
    };
    let Some((node, resource)) = nearest_resource_node(
        &state.map,
        unit.position,
        kingdom.capital,
        kingdom.id,
        &kingdom.resources,
    ) else {
        return false;
    };

    if let Some(unit) = state.units.get_mut(&unit_id) {
        unit.behavior = Behavior::Gathering;
        unit.gather = Some(GatherTrip {
            node,
            resource,
            carried: 0,
        });
        debug!(unit = unit_id, kingdom = unit.kingdom, ?node, ?resource, "gatherer dispatched");
    }
    true
}

/// Harvest the node at `coord` into `resources`.
///
/// Yields 8 to 15 units; the node is exhausted with a 30% chance.
/// Returns the amount harvested, zero if there was no node.
pub fn harvest_node<R: Rng + ?Sized>(
    map: &mut Map,
    coord: Coord,
    resources: &mut Resources,
    rng: &mut R,
) -> u32 {
    let Some(tile) = map.get_mut(coord) else {
        return 0;
    };
    let Some(node) = tile.resource else {
        return 0;
    };
    let amount = harvest_yield(node, resources, rng);
    if rng.random_bool(DEPLETE_CHANCE) {
        tile.resource = None;
    }
    amount
}

/// Credit one harvest of `node`, 8 to 15 units, without touching the map.
pub fn harvest_yield<R: Rng + ?Sized>(node: Resource, resources: &mut Resources, rng: &mut R) -> u32 {
    let amount = rng.random_range(8..=15);
    resources.add(ResourceKind::from(node), amount);
    amount
}

/// Try to step a unit one tile toward `target`.
///
/// Falls back to single-axis steps when the diagonal is blocked. Returns
/// `false` when no step makes progress.
pub fn step_unit_toward(state: &mut SimulationState, unit_id: UnitId, target: Coord) -> bool {
    let Some(unit) = state.units.get(&unit_id) else {
        return false;
    };
    let from = unit.position;
    let kingdom = unit.kingdom;
    if from == target {
        return true;
    }
    let direct = from.step_toward(target);
    let candidates = [
        direct,
        Coord::new(direct.x, from.y),
        Coord::new(from.x, direct.y),
    ];
    let Some(next) = candidates.into_iter().find(|c| {
        *c != from && state.map.get(*c).is_some_and(|t| t.passable_for(kingdom))
    }) else {
        return false;
    };
    if let Some(unit) = state.units.get_mut(&unit_id) {
        unit.position = next;
    }
    true
}

/// Advance a gathering unit by one move.
pub fn advance_gathering<R: Rng + ?Sized>(state: &mut SimulationState, unit_id: UnitId, rng: &mut R) {
    let Some(unit) = state.units.get(&unit_id) else {
        return;
    };
    let Some(trip) = unit.gather else {
        if let Some(unit) = state.units.get_mut(&unit_id) {
            unit.reset();
        }
        return;
    };
    let kingdom_id = unit.kingdom;
    let position = unit.position;
    let behavior = unit.behavior;
    let Some(home) = state.kingdom(kingdom_id).map(|k| k.capital) else {
        return;
    };

    match behavior {
        Behavior::Gathering => {
            if position == trip.node || position.touches(trip.node) {
                let now = state.now_ms;
                let carried = match state.kingdoms.get_mut(usize::from(kingdom_id)) {
                    Some(kingdom) => {
                        harvest_node(&mut state.map, trip.node, &mut kingdom.resources, rng)
                    }
                    None => 0,
                };
                if let Some(unit) = state.units.get_mut(&unit_id) {
                    unit.behavior = Behavior::ReturningHome;
                    unit.gather = Some(GatherTrip { carried, ..trip });
                }
                debug!(unit = unit_id, kingdom = kingdom_id, carried, now, "harvested");
            } else if !step_unit_toward(state, unit_id, trip.node) {
                if let Some(unit) = state.units.get_mut(&unit_id) {
                    unit.behavior = Behavior::ReturningHome;
                }
            }
        }
        Behavior::ReturningHome => {
            if position.distance(home) <= 1.5 {
                if let Some(unit) = state.units.get_mut(&unit_id) {
                    unit.reset();
                }
                if rng.random_bool(REDISPATCH_CHANCE) {
                    let at = state.now_ms + REDISPATCH_DELAY_MS;
                    state
                        .scheduler
                        .schedule_at(at, ScheduledEvent::RequeueGatherer { unit: unit_id });
                }
            } else if !step_unit_toward(state, unit_id, home) {
                if let Some(unit) = state.units.get_mut(&unit_id) {
                    unit.reset();
                }
            }
        }
        _ => {
            if let Some(unit) = state.units.get_mut(&unit_id) {
                unit.gather = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::game::{Kingdom, Tile};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn state_with_kingdom() -> SimulationState {
        let config = SimulationConfig {
            map_size: 40,
            ..SimulationConfig::default()
        };
        let mut state = SimulationState::new(config).unwrap();
        state
            .kingdoms
            .push(Kingdom::new(0, 0, Coord::new(20, 20), Resources::new(100, 100, 100)));
        state
    }

    fn put_node(state: &mut SimulationState, coord: Coord, node: Resource) {
        let mut tile = Tile::grass();
        tile.resource = Some(node);
        state.map.set(coord, tile);
    }

    #[test]
    fn test_nearest_prefers_scarce_kind() {
        let mut state = state_with_kingdom();
        put_node(&mut state, Coord::new(22, 20), Resource::Tree);
        put_node(&mut state, Coord::new(25, 20), Resource::Stone);

        let plenty = Resources::new(100, 100, 100);
        let found = nearest_resource_node(&state.map, Coord::new(20, 20), Coord::new(20, 20), 0, &plenty);
        assert_eq!(found, Some((Coord::new(22, 20), Resource::Tree)));

        // Stone at distance 5 / 3 beats wood at distance 2 / 1.
        let low_stone = Resources::new(100, 10, 100);
        let found = nearest_resource_node(&state.map, Coord::new(20, 20), Coord::new(20, 20), 0, &low_stone);
        assert_eq!(found, Some((Coord::new(25, 20), Resource::Stone)));
    }

    #[test]
    fn test_nearest_skips_foreign_territory() {
        let mut state = state_with_kingdom();
        put_node(&mut state, Coord::new(21, 20), Resource::Berry);
        state.map.get_mut(Coord::new(21, 20)).unwrap().territory = Some(3);
        let found = nearest_resource_node(
            &state.map,
            Coord::new(20, 20),
            Coord::new(20, 20),
            0,
            &Resources::default(),
        );
        assert_eq!(found, None);
    }

    #[test]
    fn test_gathering_round_trip() {
        let mut state = state_with_kingdom();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        put_node(&mut state, Coord::new(26, 20), Resource::Tree);
        let id = state.spawn_unit(0, UnitClass::Peasant, Coord::new(20, 20));
        assert!(dispatch_gatherer(&mut state, id));
        assert_eq!(state.units[&id].behavior, Behavior::Gathering);

        let wood_before = state.kingdoms[0].resources.wood;
        for _ in 0..30 {
            advance_gathering(&mut state, id, &mut rng);
            if state.units[&id].behavior == Behavior::Idle {
                break;
            }
        }
        let unit = &state.units[&id];
        assert_eq!(unit.behavior, Behavior::Idle);
        assert!(unit.position.distance(Coord::new(20, 20)) <= 1.5);
        let gained = state.kingdoms[0].resources.wood - wood_before;
        assert!((8..=15).contains(&gained));
    }

    #[test]
    fn test_foreign_wall_blocks_step() {
        let mut state = state_with_kingdom();
        let id = state.spawn_unit(0, UnitClass::Warrior, Coord::new(10, 10));
        for c in [Coord::new(11, 11), Coord::new(11, 10), Coord::new(10, 11)] {
            let tile = state.map.get_mut(c).unwrap();
            tile.is_wall = true;
            tile.territory = Some(4);
        }
        assert!(!step_unit_toward(&mut state, id, Coord::new(15, 15)));
        assert_eq!(state.units[&id].position, Coord::new(10, 10));
    }

    #[test]
    fn test_class_stats() {
        assert!(UnitClass::Warrior.is_soldier());
        assert!(!UnitClass::Peasant.is_soldier());
        assert!(UnitClass::Warrior.base_attack() > UnitClass::Peasant.base_attack());
    }
}
