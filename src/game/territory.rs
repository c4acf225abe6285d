//! Wall and territory engine.
//!
//! Walls bound a kingdom's territory. Every wall placement runs an
//! enclosure pass: anything the kingdom's walls cut off from the map edge
//! becomes its territory. Walls left fully inside the territory are
//! redundant and get pruned in small batches for a half refund.
//!
//! Claims are sticky. Removing or losing a wall never un-claims tiles; only
//! conquest moves territory between kingdoms.

use std::collections::VecDeque;
use std::fmt;

use rand::Rng;
use tracing::{debug, info};

use crate::error::{GameError, GameResult};
use crate::game::{
    BuildingId, BuildingType, Coord, Cost, KingdomId, Map, ScheduledEvent, SimEvent,
    SimulationState, diplomacy,
};

/// Maximum walls removed by one pruning pass.
pub const PRUNE_BATCH: usize = 5;

/// Delay before the next pruning pass when candidates remain.
pub const PRUNE_FOLLOWUP_MS: u64 = 500;

/// Stone charged to rebuild a breached wall.
pub const REPAIR_COST: Cost = Cost::new(0, 5, 0);

/// Time a breach must age before it can be repaired.
pub const REPAIR_COOLDOWN_MS: u64 = 5000;

/// Chance of forcing a repair on a tile another kingdom has taken.
pub const CONTEST_CHANCE: f64 = 0.3;

/// Half side of the initial wall ring: the ring spans
/// `capital - 4 ..= capital + 3` on both axes.
const RING_LOW: i32 = -4;
const RING_HIGH: i32 = 3;

/// Finds tiles a kingdom's walls cut off from the map edge.
pub trait EnclosureDetector: fmt::Debug {
    /// Tiles unreachable from any edge tile without crossing one of
    /// `kingdom`'s walls. The kingdom's own wall tiles are never included.
    fn enclosed(&self, map: &Map, kingdom: KingdomId) -> Vec<Coord>;
}

/// Breadth-first fill from every edge tile, O(size²) per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloodFillDetector;

impl EnclosureDetector for FloodFillDetector {
    fn enclosed(&self, map: &Map, kingdom: KingdomId) -> Vec<Coord> {
        let size = map.size();
        let tiles = map.tiles();
        let blocked = |idx: usize| tiles[idx].is_wall_of(kingdom);

        let mut visited = vec![false; tiles.len()];
        let mut queue = VecDeque::new();
        for (idx, seen) in visited.iter_mut().enumerate() {
            let coord = map.coord_at(idx);
            if map.is_edge(coord) && !blocked(idx) {
                *seen = true;
                queue.push_back(coord);
            }
        }

        while let Some(coord) = queue.pop_front() {
            let (adj, count) = coord.adjacent(size);
            for next in &adj[..usize::from(count)] {
                let Some(idx) = map.index(*next) else {
                    continue;
                };
                if !visited[idx] && !blocked(idx) {
                    visited[idx] = true;
                    queue.push_back(*next);
                }
            }
        }

        visited
            .iter()
            .enumerate()
            .filter(|&(idx, seen)| !*seen && !blocked(idx))
            .map(|(idx, _)| map.coord_at(idx))
            .collect()
    }
}

/// Outcome of a successful wall placement or repair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WallPlacement {
    /// Registry id of the new wall.
    pub building: BuildingId,
    /// Tiles newly claimed by the enclosure pass.
    pub claimed: usize,
    /// Redundant walls removed afterwards.
    pub pruned: Vec<Coord>,
}

fn out_of_bounds(coord: Coord) -> GameError {
    GameError::OutOfBounds {
        x: i32::from(coord.x),
        y: i32::from(coord.y),
    }
}

/// Check whether `kingdom` may wall off `coord`, without charging.
///
/// # Errors
///
/// [`GameError::OutOfBounds`] or [`GameError::InvalidPlacement`] naming
/// the first failed condition.
pub fn check_wall_site(map: &Map, kingdom: KingdomId, coord: Coord) -> GameResult<()> {
    let tile = map.get(coord).ok_or_else(|| out_of_bounds(coord))?;
    if tile.is_wall {
        return Err(GameError::placement(coord, "already a wall"));
    }
    if tile.building.is_some() || tile.is_capital {
        return Err(GameError::placement(coord, "tile is occupied"));
    }
    if tile.resource.is_some() {
        return Err(GameError::placement(coord, "resource node in the way"));
    }
    if tile.territory.is_some_and(|owner| owner != kingdom) {
        return Err(GameError::placement(coord, "foreign territory"));
    }
    let connected = tile.territory == Some(kingdom)
        || map.touches_territory(coord, kingdom)
        || map.touches_wall_of(coord, kingdom);
    if !connected {
        return Err(GameError::placement(coord, "not adjacent to own territory"));
    }
    Ok(())
}

/// Place a wall for `kingdom`, claim any enclosure it completes and prune
/// walls left redundant.
///
/// The wall cost is charged only after every check passes.
///
/// # Errors
///
/// [`GameError::InvalidTarget`] for unknown or conquered kingdoms, the
/// errors of [`check_wall_site`], or [`GameError::InsufficientResources`].
pub fn place_wall(
    state: &mut SimulationState,
    detector: &dyn EnclosureDetector,
    kingdom: KingdomId,
    coord: Coord,
) -> GameResult<WallPlacement> {
    state.living_kingdom(kingdom)?;
    check_wall_site(&state.map, kingdom, coord)?;
    if let Some(k) = state.kingdom_mut(kingdom) {
        k.resources.spend(BuildingType::Wall.cost())?;
    }

    let building = state.register_building(BuildingType::Wall, kingdom, coord);
    debug!(kingdom, x = coord.x, y = coord.y, "wall placed");
    Ok(resolve_walls(state, detector, kingdom, building))
}

fn resolve_walls(
    state: &mut SimulationState,
    detector: &dyn EnclosureDetector,
    kingdom: KingdomId,
    building: BuildingId,
) -> WallPlacement {
    let claimed = claim_enclosed(state, detector, kingdom);
    let pruned = prune_redundant_walls(state, kingdom);
    WallPlacement {
        building,
        claimed,
        pruned,
    }
}

/// Claim every enclosed tile that is unowned or already owned by `kingdom`.
///
/// Returns the number of newly claimed tiles.
pub fn claim_enclosed(
    state: &mut SimulationState,
    detector: &dyn EnclosureDetector,
    kingdom: KingdomId,
) -> usize {
    let mut claimed = 0;
    for coord in detector.enclosed(&state.map, kingdom) {
        if let Some(tile) = state.map.get_mut(coord) {
            if tile.territory.is_none() {
                tile.territory = Some(kingdom);
                claimed += 1;
            }
        }
    }
    if claimed > 0 {
        info!(kingdom, tiles = claimed, "enclosure claimed");
        state.emit(SimEvent::TerritoryClaimed {
            kingdom,
            tiles: claimed,
        });
    }
    claimed
}

/// Walls of `kingdom` whose eight neighbours are all out of bounds or its
/// own territory, in ascending coordinate order.
#[must_use]
pub fn redundant_walls(map: &Map, kingdom: KingdomId, perimeter: impl IntoIterator<Item = Coord>) -> Vec<Coord> {
    let size = map.size();
    perimeter
        .into_iter()
        .filter(|coord| {
            let (around, count) = coord.surrounding(size);
            around[..usize::from(count)]
                .iter()
                .all(|c| map.get(*c).is_some_and(|t| t.territory == Some(kingdom)))
        })
        .collect()
}

/// Remove up to [`PRUNE_BATCH`] redundant walls of `kingdom`, refunding half
/// of each wall's cost.
///
/// If more candidates remain, another pass is scheduled
/// [`PRUNE_FOLLOWUP_MS`] later. Returns the removed tiles. A pass with no
/// candidates changes nothing.
pub fn prune_redundant_walls(state: &mut SimulationState, kingdom: KingdomId) -> Vec<Coord> {
    let Some(k) = state.kingdom(kingdom) else {
        return Vec::new();
    };
    if !k.alive {
        return Vec::new();
    }
    let candidates = redundant_walls(&state.map, kingdom, k.wall_perimeter.iter().copied());

    let mut removed = Vec::new();
    for coord in candidates.iter().take(PRUNE_BATCH) {
        let Some(id) = state.map.get(*coord).and_then(|t| t.building).map(|b| b.id) else {
            continue;
        };
        if state.demolish_building(id).is_some() {
            if let Some(k) = state.kingdom_mut(kingdom) {
                k.resources.gain(BuildingType::Wall.refund());
            }
            removed.push(*coord);
        }
    }

    if candidates.len() > PRUNE_BATCH {
        let event = ScheduledEvent::PruneWalls { kingdom };
        if !state.scheduler.contains(&event) {
            let at = state.now_ms + PRUNE_FOLLOWUP_MS;
            state.scheduler.schedule_at(at, event);
        }
    }
    if !removed.is_empty() {
        debug!(kingdom, count = removed.len(), "redundant walls pruned");
        state.emit(SimEvent::WallsPruned {
            kingdom,
            count: removed.len(),
        });
    }
    removed
}

/// Demolish one of the kingdom's walls and refund half its cost.
///
/// The enclosure is not recomputed; claimed tiles stay claimed.
///
/// # Errors
///
/// [`GameError::OutOfBounds`], or [`GameError::InvalidTarget`] if the tile
/// is not a wall of `kingdom`.
pub fn remove_wall(state: &mut SimulationState, kingdom: KingdomId, coord: Coord) -> GameResult<Cost> {
    state.living_kingdom(kingdom)?;
    let tile = state.map.get(coord).ok_or_else(|| out_of_bounds(coord))?;
    if !tile.is_wall_of(kingdom) {
        return Err(GameError::target(format!(
            "no wall of kingdom {kingdom} at ({}, {})",
            coord.x, coord.y
        )));
    }
    let Some(id) = tile.building.map(|b| b.id) else {
        return Err(GameError::target("wall tile has no building record"));
    };
    state.demolish_building(id);
    let refund = BuildingType::Wall.refund();
    if let Some(k) = state.kingdom_mut(kingdom) {
        k.resources.gain(refund);
    }
    debug!(kingdom, x = coord.x, y = coord.y, "wall removed");
    Ok(refund)
}

/// Rebuild a breached wall.
///
/// The breach must be queued on the kingdom and at least
/// [`REPAIR_COOLDOWN_MS`] old. Repair costs [`REPAIR_COST`] instead of the
/// wall cost. A tile taken by another kingdom in the meantime is reclaimed
/// only on a [`CONTEST_CHANCE`] roll.
///
/// # Errors
///
/// - [`GameError::InvalidTarget`] if no breach is queued at `coord` or the
///   contest roll fails (the breach stays queued)
/// - [`GameError::InvalidPlacement`] while the cooldown runs or if the tile
///   is occupied
/// - [`GameError::InsufficientResources`] if stone is short
pub fn repair_wall<R: Rng + ?Sized>(
    state: &mut SimulationState,
    detector: &dyn EnclosureDetector,
    kingdom: KingdomId,
    coord: Coord,
    rng: &mut R,
) -> GameResult<WallPlacement> {
    let k = state.living_kingdom(kingdom)?;
    let Some(breach) = k.walls_to_repair.iter().find(|b| b.coord == coord) else {
        return Err(GameError::target(format!(
            "no breach at ({}, {}) for kingdom {kingdom}",
            coord.x, coord.y
        )));
    };
    if state.now_ms.saturating_sub(breach.broken_at_ms) < REPAIR_COOLDOWN_MS {
        return Err(GameError::placement(coord, "repair cooldown has not elapsed"));
    }
    if !k.resources.can_afford(REPAIR_COST) {
        return Err(GameError::InsufficientResources {
            needed: REPAIR_COST,
            available: k.resources,
        });
    }
    let tile = state.map.get(coord).ok_or_else(|| out_of_bounds(coord))?;
    if tile.is_wall || tile.building.is_some() || tile.is_capital {
        return Err(GameError::placement(coord, "tile is occupied"));
    }
    if tile.territory.is_some_and(|owner| owner != kingdom) && !diplomacy::roll(rng, CONTEST_CHANCE) {
        return Err(GameError::target(format!(
            "tile ({}, {}) is held by another kingdom",
            coord.x, coord.y
        )));
    }

    if let Some(k) = state.kingdom_mut(kingdom) {
        k.resources.spend(REPAIR_COST)?;
        k.clear_breach(coord);
    }
    let building = state.register_building(BuildingType::Wall, kingdom, coord);
    state.emit(SimEvent::WallRepaired { kingdom, coord });
    debug!(kingdom, x = coord.x, y = coord.y, "wall repaired");
    Ok(resolve_walls(state, detector, kingdom, building))
}

/// Build the starting 8×8 wall ring around a kingdom's capital.
///
/// Resources inside the box are cleared, the 28 ring tiles become walls
/// and the 36 interior tiles, capital included, become territory. Tiles
/// that fall off the grid are skipped. Returns the number of walls built.
pub fn generate_initial_walls(state: &mut SimulationState, kingdom: KingdomId) -> usize {
    let Some(capital) = state.kingdom(kingdom).map(|k| k.capital) else {
        return 0;
    };
    let size = state.map.size();
    let mut ring = Vec::new();
    for dy in RING_LOW..=RING_HIGH {
        for dx in RING_LOW..=RING_HIGH {
            let Some(coord) = capital.offset(dx, dy, size) else {
                continue;
            };
            let Some(tile) = state.map.get_mut(coord) else {
                continue;
            };
            tile.resource = None;
            let on_ring = dx == RING_LOW || dx == RING_HIGH || dy == RING_LOW || dy == RING_HIGH;
            if on_ring {
                if tile.building.is_none() {
                    ring.push(coord);
                }
            } else {
                tile.territory = Some(kingdom);
            }
        }
    }
    if let Some(tile) = state.map.get_mut(capital) {
        tile.is_capital = true;
        tile.territory = Some(kingdom);
    }
    for coord in &ring {
        state.register_building(BuildingType::Wall, kingdom, *coord);
    }
    debug!(kingdom, walls = ring.len(), "initial walls generated");
    ring.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::game::{Kingdom, Resource, Resources};
    use rand::SeedableRng;

    fn state_with(size: u16, capital: Coord) -> SimulationState {
        let config = SimulationConfig {
            map_size: size,
            ..SimulationConfig::default()
        };
        let mut state = SimulationState::new(config).unwrap();
        state
            .kingdoms
            .push(Kingdom::new(0, 0, capital, Resources::new(500, 500, 500)));
        state
    }

    #[test]
    fn test_flood_fill_open_map_encloses_nothing() {
        let state = state_with(32, Coord::new(16, 16));
        assert!(FloodFillDetector.enclosed(&state.map, 0).is_empty());
    }

    #[test]
    fn test_flood_fill_finds_ring_interior() {
        let mut state = state_with(32, Coord::new(16, 16));
        // 3x3 ring around (10, 10).
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let c = Coord::new(10, 10).offset(dx, dy, 32).unwrap();
                state.register_building(BuildingType::Wall, 0, c);
            }
        }
        assert_eq!(FloodFillDetector.enclosed(&state.map, 0), vec![Coord::new(10, 10)]);
        // Another kingdom's walls do not enclose anything for kingdom 0's pass.
        assert!(FloodFillDetector.enclosed(&state.map, 3).is_empty());
    }

    #[test]
    fn test_diagonal_gap_does_not_leak() {
        // Flood fill is 4-directional, so a ring closed only diagonally still encloses.
        let mut state = state_with(32, Coord::new(16, 16));
        for c in [Coord::new(5, 4), Coord::new(4, 5), Coord::new(6, 5), Coord::new(5, 6)] {
            state.register_building(BuildingType::Wall, 0, c);
        }
        assert_eq!(FloodFillDetector.enclosed(&state.map, 0), vec![Coord::new(5, 5)]);
    }

    #[test]
    fn test_initial_ring_shape() {
        let mut state = state_with(100, Coord::new(50, 50));
        state.map.get_mut(Coord::new(48, 48)).unwrap().resource = Some(Resource::Tree);
        let walls = generate_initial_walls(&mut state, 0);
        assert_eq!(walls, 28);
        assert_eq!(state.kingdoms[0].wall_perimeter.len(), 28);
        assert_eq!(state.map.count_territory(0), 64);
        let interior = state
            .map
            .tiles_owned_by(0)
            .filter(|(_, t)| !t.is_wall)
            .count();
        assert_eq!(interior, 36);
        assert!(state.map.get(Coord::new(50, 50)).unwrap().is_capital);
        assert!(state.map.get(Coord::new(48, 48)).unwrap().resource.is_none());
        assert!(state.map.get(Coord::new(46, 46)).unwrap().is_wall_of(0));
        assert!(state.map.get(Coord::new(53, 53)).unwrap().is_wall_of(0));
        assert!(!state.map.get(Coord::new(54, 50)).unwrap().is_wall);
    }

    #[test]
    fn test_place_wall_rejects_disconnected_tile() {
        let mut state = state_with(40, Coord::new(20, 20));
        generate_initial_walls(&mut state, 0);
        let before = state.kingdoms[0].resources;
        let err = place_wall(&mut state, &FloodFillDetector, 0, Coord::new(2, 2)).unwrap_err();
        assert!(matches!(err, GameError::InvalidPlacement { .. }));
        assert_eq!(state.kingdoms[0].resources, before);
    }

    #[test]
    fn test_place_wall_charges_cost() {
        let mut state = state_with(40, Coord::new(20, 20));
        generate_initial_walls(&mut state, 0);
        let before = state.kingdoms[0].resources;
        let placed = place_wall(&mut state, &FloodFillDetector, 0, Coord::new(15, 20)).unwrap();
        assert_eq!(placed.claimed, 0);
        assert_eq!(state.kingdoms[0].resources.wood, before.wood - 2);
        assert_eq!(state.kingdoms[0].resources.stone, before.stone - 3);
        assert!(state.kingdoms[0].wall_perimeter.contains(&Coord::new(15, 20)));
    }

    #[test]
    fn test_place_wall_rejects_resource_and_foreign_tiles() {
        let mut state = state_with(40, Coord::new(20, 20));
        generate_initial_walls(&mut state, 0);
        state.map.get_mut(Coord::new(15, 20)).unwrap().resource = Some(Resource::Stone);
        state.map.get_mut(Coord::new(15, 21)).unwrap().territory = Some(2);
        for c in [Coord::new(15, 20), Coord::new(15, 21)] {
            let err = place_wall(&mut state, &FloodFillDetector, 0, c).unwrap_err();
            assert!(matches!(err, GameError::InvalidPlacement { .. }));
        }
        assert!(matches!(
            place_wall(&mut state, &FloodFillDetector, 9, Coord::new(15, 20)),
            Err(GameError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_outer_ring_prunes_inner_ring() {
        let mut state = state_with(40, Coord::new(20, 20));
        generate_initial_walls(&mut state, 0);
        // Wrap the 8x8 ring (16..=23) in a 10x10 ring (15..=24).
        let mut outer = Vec::new();
        for i in 15..=24u16 {
            outer.push(Coord::new(i, 15));
            outer.push(Coord::new(i, 24));
        }
        for i in 16..=23u16 {
            outer.push(Coord::new(15, i));
            outer.push(Coord::new(24, i));
        }
        for c in &outer {
            let placed = place_wall(&mut state, &FloodFillDetector, 0, *c).unwrap();
            assert!(placed.pruned.len() <= PRUNE_BATCH);
        }
        while !prune_redundant_walls(&mut state, 0).is_empty() {}

        assert_eq!(state.kingdoms[0].wall_perimeter.len(), outer.len());
        assert_eq!(state.map.count_territory(0), 100);
        // Pruned tiles keep their territory.
        assert_eq!(state.map.get(Coord::new(16, 16)).unwrap().territory, Some(0));
        assert!(!state.map.get(Coord::new(16, 16)).unwrap().is_wall);
    }

    #[test]
    fn test_prune_refunds_half_and_is_idempotent() {
        let mut state = state_with(40, Coord::new(20, 20));
        // A lone wall inside own territory.
        for y in 9..=11 {
            for x in 9..=11 {
                state.map.get_mut(Coord::new(x, y)).unwrap().territory = Some(0);
            }
        }
        state.register_building(BuildingType::Wall, 0, Coord::new(10, 10));
        let before = state.kingdoms[0].resources;

        assert_eq!(prune_redundant_walls(&mut state, 0), vec![Coord::new(10, 10)]);
        assert_eq!(state.kingdoms[0].resources.wood, before.wood + 1);
        assert_eq!(state.kingdoms[0].resources.stone, before.stone + 1);
        assert!(state.buildings.is_empty());

        let snapshot = state.kingdoms[0].clone();
        assert!(prune_redundant_walls(&mut state, 0).is_empty());
        assert_eq!(state.kingdoms[0], snapshot);
    }

    #[test]
    fn test_remove_wall_keeps_territory() {
        let mut state = state_with(40, Coord::new(20, 20));
        generate_initial_walls(&mut state, 0);
        let before = state.kingdoms[0].resources;
        let refund = remove_wall(&mut state, 0, Coord::new(16, 20)).unwrap();
        assert_eq!(refund, Cost::new(1, 1, 0));
        assert_eq!(state.kingdoms[0].resources.wood, before.wood + 1);
        let tile = state.map.get(Coord::new(16, 20)).unwrap();
        assert!(!tile.is_wall);
        assert_eq!(tile.territory, Some(0));
        assert!(!state.kingdoms[0].wall_perimeter.contains(&Coord::new(16, 20)));
        assert!(remove_wall(&mut state, 0, Coord::new(20, 20)).is_err());
    }

    #[test]
    fn test_repair_wall_cooldown_and_cost() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
        let mut state = state_with(40, Coord::new(20, 20));
        generate_initial_walls(&mut state, 0);
        let coord = Coord::new(16, 20);
        let id = state.map.get(coord).unwrap().building.unwrap().id;
        state.demolish_building(id);
        state.kingdoms[0].record_breach(coord, 0);

        state.now_ms = 1000;
        let err = repair_wall(&mut state, &FloodFillDetector, 0, coord, &mut rng).unwrap_err();
        assert!(matches!(err, GameError::InvalidPlacement { .. }));

        state.now_ms = 6000;
        let stone = state.kingdoms[0].resources.stone;
        repair_wall(&mut state, &FloodFillDetector, 0, coord, &mut rng).unwrap();
        assert_eq!(state.kingdoms[0].resources.stone, stone - 5);
        assert!(state.kingdoms[0].walls_to_repair.is_empty());
        assert!(state.map.get(coord).unwrap().is_wall_of(0));
        assert!(state.kingdoms[0].wall_perimeter.contains(&coord));

        let err = repair_wall(&mut state, &FloodFillDetector, 0, coord, &mut rng).unwrap_err();
        assert!(matches!(err, GameError::InvalidTarget(_)));
    }
}
