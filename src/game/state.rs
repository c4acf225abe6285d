//! Simulation state and the tick loop.
//!
//! [`SimulationState`] is the single owner of every mutable piece of the
//! world. Components are free functions that borrow it; nothing reaches for
//! global state. [`Simulation`] bundles the state with the random source and
//! enclosure detector and drives the fixed tick order:
//!
//! 1. due scheduled events
//! 2. the AI loop, once per simulated second (walls resolve synchronously)
//! 3. unit movement and combat
//! 4. treaty decay at each in-game year boundary

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SimulationConfig;
use crate::error::{GameError, GameResult, SimError};
use crate::game::{
    BuildingId, BuildingType, Building, Coord, Diplomacy, DiplomacyEvent, EnclosureDetector,
    FloodFillDetector, Kingdom, KingdomId, Map, PLAYER_KINGDOM, ScheduledEvent, Scheduler,
    TileBuilding, Unit, UnitClass, UnitId, ai, combat, territory, unit,
};

/// Starting health of the player avatar.
const PLAYER_HEALTH: f64 = 150.0;

/// Attack damage of the player avatar.
const PLAYER_ATTACK: f64 = 15.0;

/// Interval between AI kingdom ticks.
pub const AI_TICK_MS: u64 = 1000;

/// The player's on-map avatar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerAvatar {
    /// Current tile.
    pub position: Coord,
    /// Remaining health.
    pub health: f64,
    /// Attack damage.
    pub attack: f64,
    /// Whether the avatar is still alive.
    pub alive: bool,
}

impl PlayerAvatar {
    /// Fresh avatar at `position`.
    #[must_use]
    pub const fn new(position: Coord) -> Self {
        Self {
            position,
            health: PLAYER_HEALTH,
            attack: PLAYER_ATTACK,
            alive: true,
        }
    }

    /// Combat weight used for relative-strength checks.
    #[must_use]
    pub fn strength(&self) -> f64 {
        if self.alive {
            self.health.max(0.0) * self.attack
        } else {
            0.0
        }
    }
}

/// Notable things that happened during a tick, for reports and viewers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SimEvent {
    /// Enclosed tiles were claimed.
    TerritoryClaimed {
        /// Claiming kingdom.
        kingdom: KingdomId,
        /// Number of newly owned tiles.
        tiles: usize,
    },
    /// Redundant interior walls were removed.
    WallsPruned {
        /// Owner of the walls.
        kingdom: KingdomId,
        /// Number removed.
        count: usize,
    },
    /// A wall was destroyed in combat.
    WallBreached {
        /// Owner of the wall.
        kingdom: KingdomId,
        /// Tile of the wall.
        coord: Coord,
    },
    /// A breached wall was rebuilt.
    WallRepaired {
        /// Owner of the wall.
        kingdom: KingdomId,
        /// Tile of the wall.
        coord: Coord,
    },
    /// A structure was built.
    BuildingPlaced {
        /// Builder.
        kingdom: KingdomId,
        /// Kind of structure.
        kind: BuildingType,
        /// Tile of the structure.
        coord: Coord,
    },
    /// A structure was destroyed in combat.
    BuildingDestroyed {
        /// Former owner.
        kingdom: KingdomId,
        /// Kind of structure.
        kind: BuildingType,
        /// Tile of the structure.
        coord: Coord,
    },
    /// A barracks finished training.
    SoldierTrained {
        /// Training kingdom.
        kingdom: KingdomId,
        /// New unit.
        unit: UnitId,
    },
    /// A unit died.
    UnitKilled {
        /// Owner of the unit.
        kingdom: KingdomId,
        /// Dead unit.
        unit: UnitId,
    },
    /// Soldiers set out to attack another kingdom.
    RaidLaunched {
        /// Attacker.
        kingdom: KingdomId,
        /// Target kingdom.
        target: KingdomId,
        /// Number of soldiers sent.
        soldiers: usize,
    },
    /// A kingdom lost its last unit and was absorbed.
    KingdomConquered {
        /// Defeated kingdom.
        kingdom: KingdomId,
        /// Conqueror.
        by: KingdomId,
        /// Tiles transferred.
        tiles: usize,
    },
    /// The player avatar died.
    PlayerDefeated,
    /// Diplomatic change from treaty decay or an action.
    Diplomacy(DiplomacyEvent),
}

/// All mutable world state.
#[derive(Debug, Clone)]
pub struct SimulationState {
    /// Parameters the world was built with.
    pub config: SimulationConfig,
    /// The grid.
    pub map: Map,
    /// Kingdom registry, indexed by kingdom id.
    pub kingdoms: Vec<Kingdom>,
    /// Building registry for every kingdom, walls included.
    pub buildings: BTreeMap<BuildingId, Building>,
    /// Every living unit.
    pub units: BTreeMap<UnitId, Unit>,
    /// The player avatar.
    pub player: PlayerAvatar,
    /// Factions and treaties.
    pub diplomacy: Diplomacy,
    /// Deferred actions.
    pub scheduler: Scheduler,
    /// Simulation clock.
    pub now_ms: u64,
    /// In-game years already processed by treaty decay.
    pub years_elapsed: u64,
    /// Id for the next building.
    pub next_building_id: BuildingId,
    /// Id for the next unit.
    pub next_unit_id: UnitId,
    /// Events produced since the last drain.
    pub events: Vec<SimEvent>,
}

impl SimulationState {
    /// Create an empty world: a grass grid with no kingdoms.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidConfig`] if the config does not validate.
    pub fn new(config: SimulationConfig) -> Result<Self, SimError> {
        config.validate()?;
        let map = Map::new(config.map_size)
            .ok_or_else(|| SimError::InvalidConfig("map_size must be positive".to_string()))?;
        let center = map.center();
        Ok(Self {
            config,
            map,
            kingdoms: Vec::new(),
            buildings: BTreeMap::new(),
            units: BTreeMap::new(),
            player: PlayerAvatar::new(center),
            diplomacy: Diplomacy::new(),
            scheduler: Scheduler::new(),
            now_ms: 0,
            years_elapsed: 0,
            next_building_id: 1,
            next_unit_id: 1,
            events: Vec::new(),
        })
    }

    /// Get a kingdom by id.
    #[must_use]
    pub fn kingdom(&self, id: KingdomId) -> Option<&Kingdom> {
        self.kingdoms.get(usize::from(id)).filter(|k| k.id == id)
    }

    /// Get a mutable kingdom by id.
    #[must_use]
    pub fn kingdom_mut(&mut self, id: KingdomId) -> Option<&mut Kingdom> {
        self.kingdoms.get_mut(usize::from(id)).filter(|k| k.id == id)
    }

    /// Get a living kingdom, or an [`GameError::InvalidTarget`].
    ///
    /// # Errors
    ///
    /// Fails if the kingdom is unknown or has been conquered.
    pub fn living_kingdom(&self, id: KingdomId) -> GameResult<&Kingdom> {
        match self.kingdom(id) {
            Some(k) if k.alive => Ok(k),
            Some(_) => Err(GameError::target(format!("kingdom {id} has been conquered"))),
            None => Err(GameError::target(format!("no kingdom {id}"))),
        }
    }

    /// Ids of every kingdom still in play.
    #[must_use]
    pub fn living_kingdom_ids(&self) -> Vec<KingdomId> {
        self.kingdoms.iter().filter(|k| k.alive).map(|k| k.id).collect()
    }

    /// Record an event for the current tick.
    pub fn emit(&mut self, event: SimEvent) {
        self.events.push(event);
    }

    /// Take every event recorded since the last call.
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }

    /// Whole in-game years elapsed.
    #[must_use]
    pub const fn game_years(&self) -> u64 {
        self.now_ms / self.config.year_ms
    }

    /// Simulated minutes elapsed.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn elapsed_minutes(&self) -> f64 {
        self.now_ms as f64 / 60_000.0
    }

    /// Record a building in the registry and on its tile.
    ///
    /// Walls also set the tile's wall flag, territory and the owner's
    /// perimeter in the same step. No checks are performed.
    pub fn register_building(&mut self, kind: BuildingType, owner: KingdomId, coord: Coord) -> BuildingId {
        let id = self.next_building_id;
        self.next_building_id += 1;
        self.buildings.insert(id, Building::new(id, kind, coord, owner));
        if let Some(tile) = self.map.get_mut(coord) {
            tile.building = Some(TileBuilding { id, kind });
            if kind == BuildingType::Wall {
                tile.is_wall = true;
                tile.territory = Some(owner);
                tile.resource = None;
            }
        }
        if kind == BuildingType::Wall {
            if let Some(kingdom) = self.kingdom_mut(owner) {
                kingdom.wall_perimeter.insert(coord);
            }
        }
        id
    }

    /// Remove a building from the registry, its tile and, for walls, the
    /// owner's perimeter. Territory stays with the owner.
    pub fn demolish_building(&mut self, id: BuildingId) -> Option<Building> {
        let building = self.buildings.remove(&id)?;
        if let Some(tile) = self.map.get_mut(building.position) {
            if tile.building.is_some_and(|b| b.id == id) {
                tile.building = None;
            }
            if building.kind == BuildingType::Wall {
                tile.is_wall = false;
            }
        }
        if let Some(kingdom) = self.kingdom_mut(building.owner) {
            if building.kind == BuildingType::Wall {
                kingdom.wall_perimeter.remove(&building.position);
            }
            kingdom.training_in_progress.remove(&id);
        }
        Some(building)
    }

    /// Building standing on `coord`, if any.
    #[must_use]
    pub fn building_at(&self, coord: Coord) -> Option<&Building> {
        let id = self.map.get(coord)?.building?.id;
        self.buildings.get(&id)
    }

    /// Place a non-wall structure on a free tile of the kingdom's territory.
    ///
    /// # Errors
    ///
    /// - [`GameError::OutOfBounds`] for tiles off the grid
    /// - [`GameError::InvalidPlacement`] for walls (use the wall engine),
    ///   occupied tiles and tiles outside the kingdom's territory
    /// - [`GameError::InsufficientResources`] if the cost cannot be paid
    ///
    /// Nothing is charged unless the structure is placed.
    pub fn construct(&mut self, kingdom: KingdomId, kind: BuildingType, coord: Coord) -> GameResult<BuildingId> {
        self.living_kingdom(kingdom)?;
        if kind == BuildingType::Wall {
            return Err(GameError::placement(coord, "walls are placed through the wall engine"));
        }
        let tile = self.map.get(coord).ok_or(GameError::OutOfBounds {
            x: i32::from(coord.x),
            y: i32::from(coord.y),
        })?;
        if tile.territory != Some(kingdom) {
            return Err(GameError::placement(coord, "outside own territory"));
        }
        if !tile.is_clear() || tile.is_capital {
            return Err(GameError::placement(coord, "tile is occupied"));
        }
        if let Some(k) = self.kingdom_mut(kingdom) {
            k.resources.spend(kind.cost())?;
        }
        let id = self.register_building(kind, kingdom, coord);
        debug!(kingdom, %kind, x = coord.x, y = coord.y, "building placed");
        self.emit(SimEvent::BuildingPlaced { kingdom, kind, coord });
        Ok(id)
    }

    /// Add a unit with base stats for its class.
    pub fn spawn_unit(&mut self, kingdom: KingdomId, class: UnitClass, position: Coord) -> UnitId {
        let id = self.next_unit_id;
        self.next_unit_id += 1;
        self.units
            .insert(id, Unit::new(id, kingdom, class, position, self.now_ms));
        id
    }

    /// Ids of units belonging to `kingdom`, in id order.
    #[must_use]
    pub fn units_of(&self, kingdom: KingdomId) -> Vec<UnitId> {
        self.units
            .values()
            .filter(|u| u.kingdom == kingdom)
            .map(|u| u.id)
            .collect()
    }

    /// Soldiers (warriors and archers) of a kingdom.
    #[must_use]
    pub fn soldier_count(&self, kingdom: KingdomId) -> usize {
        self.units
            .values()
            .filter(|u| u.kingdom == kingdom && u.class.is_soldier())
            .count()
    }

    /// Structures of one kind owned by a kingdom.
    #[must_use]
    pub fn building_count(&self, kingdom: KingdomId, kind: BuildingType) -> usize {
        self.buildings
            .values()
            .filter(|b| b.owner == kingdom && b.kind == kind)
            .count()
    }

    /// Maximum soldiers a kingdom may field: `5 + 2 × houses`.
    #[must_use]
    pub fn soldier_cap(&self, kingdom: KingdomId) -> usize {
        5 + 2 * self.building_count(kingdom, BuildingType::House)
    }

    /// Total combat weight of a kingdom's units, plus the avatar for the
    /// player kingdom.
    #[must_use]
    pub fn military_strength(&self, kingdom: KingdomId) -> f64 {
        let units: f64 = self
            .units
            .values()
            .filter(|u| u.kingdom == kingdom)
            .map(Unit::strength)
            .sum();
        if kingdom == PLAYER_KINGDOM {
            units + self.player.strength()
        } else {
            units
        }
    }

    /// First passable tile around `center` for a unit of `kingdom`,
    /// falling back to `center` itself.
    #[must_use]
    pub fn free_tile_near(&self, center: Coord, kingdom: KingdomId) -> Coord {
        let (around, count) = center.surrounding(self.map.size());
        around[..usize::from(count)]
            .iter()
            .copied()
            .find(|c| {
                self.map.get(*c).is_some_and(|t| t.passable_for(kingdom))
                    && !self.units.values().any(|u| u.position == *c)
            })
            .unwrap_or(center)
    }

    /// Whether the run is over: the avatar died or at most one kingdom
    /// remains.
    #[must_use]
    pub fn is_game_over(&self) -> bool {
        !self.player.alive || self.kingdoms.iter().filter(|k| k.alive).count() <= 1
    }
}

/// Owner of a running simulation: state, random source and enclosure
/// detector.
#[derive(Debug)]
pub struct Simulation<R = ChaCha8Rng> {
    /// World state.
    pub state: SimulationState,
    /// Source of every probability roll.
    pub rng: R,
    detector: Box<dyn EnclosureDetector>,
}

impl Simulation<ChaCha8Rng> {
    /// Wrap a state with a seeded ChaCha RNG and the flood-fill detector.
    #[must_use]
    pub fn seeded(state: SimulationState, seed: u64) -> Self {
        Self::new(state, ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R: Rng> Simulation<R> {
    /// Wrap a state with the given RNG and the flood-fill detector.
    #[must_use]
    pub fn new(state: SimulationState, rng: R) -> Self {
        Self::with_detector(state, rng, Box::new(FloodFillDetector))
    }

    /// Wrap a state with a custom enclosure detector.
    #[must_use]
    pub fn with_detector(state: SimulationState, rng: R, detector: Box<dyn EnclosureDetector>) -> Self {
        Self { state, rng, detector }
    }

    /// Enclosure detector used for every claim.
    #[must_use]
    pub fn detector(&self) -> &dyn EnclosureDetector {
        self.detector.as_ref()
    }

    /// Split borrows of state, detector and RNG for component calls.
    pub fn parts(&mut self) -> (&mut SimulationState, &dyn EnclosureDetector, &mut R) {
        (&mut self.state, self.detector.as_ref(), &mut self.rng)
    }

    /// Advance the clock by one tick and return what happened.
    pub fn step(&mut self) -> Vec<SimEvent> {
        let (state, detector, rng) = (&mut self.state, self.detector.as_ref(), &mut self.rng);
        state.now_ms += state.config.tick_ms;
        let now = state.now_ms;

        for event in state.scheduler.drain_due(now) {
            match event {
                ScheduledEvent::TrainSoldier { kingdom, building } => {
                    ai::complete_training(state, kingdom, building, rng);
                }
                ScheduledEvent::RequeueGatherer { unit } => {
                    unit::dispatch_gatherer(state, unit);
                }
                ScheduledEvent::PruneWalls { kingdom } => {
                    territory::prune_redundant_walls(state, kingdom);
                }
            }
        }

        if now % AI_TICK_MS == 0 {
            for kingdom in state.living_kingdom_ids() {
                if kingdom != PLAYER_KINGDOM {
                    ai::run_kingdom_tick(state, detector, kingdom, rng);
                }
            }
        }

        combat::advance_units(state, rng);

        while state.years_elapsed < state.game_years() {
            state.years_elapsed += 1;
            let report = state.diplomacy.advance_year();
            if let Some(player) = state.kingdom_mut(PLAYER_KINGDOM) {
                player.resources.gain(report.income);
            }
            state
                .events
                .extend(report.events.into_iter().map(SimEvent::Diplomacy));
        }

        #[cfg(debug_assertions)]
        crate::game::assert_invariants(state);

        state.drain_events()
    }

    /// Step until `duration_ms` has elapsed or the game is over.
    pub fn run_for(&mut self, duration_ms: u64) -> Vec<SimEvent> {
        let end = self.state.now_ms.saturating_add(duration_ms);
        let mut events = Vec::new();
        while self.state.now_ms < end && !self.state.is_game_over() {
            events.extend(self.step());
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Resources, Tile};

    fn small_state() -> SimulationState {
        let config = SimulationConfig {
            map_size: 40,
            ..SimulationConfig::default()
        };
        let mut state = SimulationState::new(config).unwrap();
        state
            .kingdoms
            .push(Kingdom::new(0, 0, Coord::new(10, 10), Resources::new(100, 100, 100)));
        state
            .kingdoms
            .push(Kingdom::new(1, 1, Coord::new(30, 30), Resources::new(25, 15, 0)));
        state
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = SimulationConfig {
            map_size: 4,
            ..SimulationConfig::default()
        };
        assert!(SimulationState::new(config).is_err());
    }

    #[test]
    fn test_register_and_demolish_wall_keeps_perimeter_in_sync() {
        let mut state = small_state();
        let coord = Coord::new(5, 5);
        let id = state.register_building(BuildingType::Wall, 0, coord);
        assert!(state.map.get(coord).unwrap().is_wall_of(0));
        assert!(state.kingdoms[0].wall_perimeter.contains(&coord));

        let removed = state.demolish_building(id).unwrap();
        assert_eq!(removed.kind, BuildingType::Wall);
        let tile = state.map.get(coord).unwrap();
        assert!(!tile.is_wall);
        assert!(tile.building.is_none());
        assert_eq!(tile.territory, Some(0));
        assert!(state.kingdoms[0].wall_perimeter.is_empty());
    }

    #[test]
    fn test_construct_unaffordable_changes_nothing() {
        let mut state = small_state();
        let coord = Coord::new(30, 31);
        let mut tile = Tile::grass();
        tile.territory = Some(1);
        state.map.set(coord, tile);

        let err = state.construct(1, BuildingType::House, coord).unwrap_err();
        assert!(matches!(err, GameError::InsufficientResources { .. }));
        assert_eq!(state.kingdoms[1].resources, Resources::new(25, 15, 0));
        assert!(state.map.get(coord).unwrap().building.is_none());
        assert!(state.buildings.is_empty());
    }

    #[test]
    fn test_construct_outside_territory() {
        let mut state = small_state();
        let err = state
            .construct(0, BuildingType::House, Coord::new(20, 20))
            .unwrap_err();
        assert!(matches!(err, GameError::InvalidPlacement { .. }));
        assert_eq!(state.kingdoms[0].resources, Resources::new(100, 100, 100));
    }

    #[test]
    fn test_soldier_cap_grows_with_houses() {
        let mut state = small_state();
        assert_eq!(state.soldier_cap(0), 5);
        state.register_building(BuildingType::House, 0, Coord::new(11, 11));
        state.register_building(BuildingType::House, 0, Coord::new(12, 11));
        assert_eq!(state.soldier_cap(0), 9);
        assert_eq!(state.soldier_cap(1), 5);
    }

    #[test]
    fn test_year_boundary_pays_trade_income() {
        let mut state = small_state();
        state.config.year_ms = 1000;
        state.diplomacy.add_faction(crate::game::Faction::new(1, "north", 50));
        state
            .diplomacy
            .sign(crate::game::TreatyType::TradeAgreement, 0, 1, 5);
        let mut sim = Simulation::seeded(state, 1);
        let before = sim.state.kingdoms[0].resources;
        sim.run_for(1000);
        assert_eq!(sim.state.years_elapsed, 1);
        assert_eq!(sim.state.kingdoms[0].resources.wood, before.wood + 5);
    }
}
