//! Serializable world snapshots.
//!
//! A snapshot is the render feed and the save format at once: the grid,
//! the kingdom registry, the building and unit lists, the avatar and the
//! diplomatic state. Only minimal data is stored. Wall flags, tile building
//! references and every kingdom's wall perimeter are rebuilt from the
//! building list on restore, so they cannot drift apart across a save.
//!
//! Restoring never aborts on malformed content. Missing capitals, missing
//! resource counters, bad expansion rates and out-of-range records are
//! repaired with defaults and reported.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::SimulationConfig;
use crate::error::SnapshotError;
use crate::game::{
    Building, BuildingId, BuildingType, Coord, Diplomacy, FactionId, Kingdom, KingdomId,
    MAX_KINGDOMS, PLAYER_KINGDOM, PlayerAvatar, Resource, Resources, SimulationState, Terrain,
    TileBuilding, Unit, UnitClass, UnitId, WallBreach, unit,
};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

const fn yes() -> bool {
    true
}

/// One grid cell. Walls and buildings come from the building list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRecord {
    /// Terrain type.
    pub terrain: Terrain,
    /// Resource node, if any.
    #[serde(default)]
    pub resource: Option<Resource>,
    /// Owning kingdom, if any.
    #[serde(default)]
    pub territory: Option<KingdomId>,
    /// Whether a capital stands here.
    #[serde(default)]
    pub capital: bool,
}

/// Treasury with every counter optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Wood in stock.
    #[serde(default)]
    pub wood: Option<u32>,
    /// Stone in stock.
    #[serde(default)]
    pub stone: Option<u32>,
    /// Food in stock.
    #[serde(default)]
    pub food: Option<u32>,
}

/// Kingdom registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KingdomRecord {
    /// Kingdom id.
    pub id: KingdomId,
    /// Bound faction; defaults to the kingdom id.
    #[serde(default)]
    pub faction: Option<FactionId>,
    /// Capital column.
    #[serde(default)]
    pub capital_x: Option<u16>,
    /// Capital row.
    #[serde(default)]
    pub capital_y: Option<u16>,
    /// Treasury.
    #[serde(default)]
    pub resources: Option<ResourceRecord>,
    /// Saved perimeter, checked against the wall buildings on restore.
    #[serde(default)]
    pub wall_perimeter: Vec<Coord>,
    /// Expansion speed multiplier.
    #[serde(default)]
    pub expansion_rate: Option<f64>,
    /// Simulation time of the last expansion batch.
    #[serde(default)]
    pub last_expansion_ms: u64,
    /// Breaches awaiting repair.
    #[serde(default)]
    pub walls_to_repair: Vec<WallBreach>,
    /// Whether the kingdom is still in play.
    #[serde(default = "yes")]
    pub alive: bool,
}

/// Building list entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BuildingRecord {
    /// Registry id.
    pub id: BuildingId,
    /// Kind of structure.
    pub kind: BuildingType,
    /// Column.
    pub x: u16,
    /// Row.
    pub y: u16,
    /// Remaining health; full health when missing.
    #[serde(default)]
    pub health: Option<f64>,
    /// Owning kingdom.
    pub owner: KingdomId,
}

/// Unit list entry. Units restore idle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    /// Unit id.
    pub id: UnitId,
    /// Combat role.
    pub class: UnitClass,
    /// Column.
    pub x: u16,
    /// Row.
    pub y: u16,
    /// Remaining health; base health when missing.
    #[serde(default)]
    pub health: Option<f64>,
    /// Owning kingdom.
    pub kingdom: KingdomId,
}

/// Player avatar entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// Column.
    pub x: u16,
    /// Row.
    pub y: u16,
    /// Remaining health.
    pub health: f64,
}

/// A complete, versioned world snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Format version.
    pub version: u32,
    /// Side length of the grid.
    pub map_size: u16,
    /// Simulation clock.
    pub now_ms: u64,
    /// In-game years already processed.
    #[serde(default)]
    pub years_elapsed: Option<u64>,
    /// Parameters of the run.
    #[serde(default)]
    pub config: SimulationConfig,
    /// Row-major tiles.
    pub tiles: Vec<TileRecord>,
    /// Kingdom registry.
    pub kingdoms: Vec<KingdomRecord>,
    /// Every structure, walls included.
    #[serde(default)]
    pub buildings: Vec<BuildingRecord>,
    /// Every living unit.
    #[serde(default)]
    pub units: Vec<UnitRecord>,
    /// The avatar.
    #[serde(default)]
    pub player: Option<PlayerRecord>,
    /// Factions and treaties.
    #[serde(default)]
    pub diplomacy: Diplomacy,
    /// Id for the next building.
    #[serde(default)]
    pub next_building_id: BuildingId,
    /// Id for the next unit.
    #[serde(default)]
    pub next_unit_id: UnitId,
}

/// A restored state and what had to be fixed to get it.
#[derive(Debug, Clone)]
pub struct Restored {
    /// The rebuilt world.
    pub state: SimulationState,
    /// Human-readable description of each repair, in order.
    pub repairs: Vec<String>,
}

struct Repairs(Vec<String>);

impl Repairs {
    fn note(&mut self, message: String) {
        warn!(%message, "snapshot repaired");
        self.0.push(message);
    }
}

impl Snapshot {
    /// Capture the persistent parts of a state.
    #[must_use]
    pub fn capture(state: &SimulationState) -> Self {
        let tiles = state
            .map
            .tiles()
            .iter()
            .map(|t| TileRecord {
                terrain: t.terrain,
                resource: t.resource,
                territory: t.territory,
                capital: t.is_capital,
            })
            .collect();
        let kingdoms = state
            .kingdoms
            .iter()
            .map(|k| KingdomRecord {
                id: k.id,
                faction: Some(k.faction),
                capital_x: Some(k.capital.x),
                capital_y: Some(k.capital.y),
                resources: Some(ResourceRecord {
                    wood: Some(k.resources.wood),
                    stone: Some(k.resources.stone),
                    food: Some(k.resources.food),
                }),
                wall_perimeter: k.wall_perimeter.iter().copied().collect(),
                expansion_rate: Some(k.expansion_rate),
                last_expansion_ms: k.last_expansion_ms,
                walls_to_repair: k.walls_to_repair.clone(),
                alive: k.alive,
            })
            .collect();
        let buildings = state
            .buildings
            .values()
            .map(|b| BuildingRecord {
                id: b.id,
                kind: b.kind,
                x: b.position.x,
                y: b.position.y,
                health: Some(b.health),
                owner: b.owner,
            })
            .collect();
        let units = state
            .units
            .values()
            .map(|u| UnitRecord {
                id: u.id,
                class: u.class,
                x: u.position.x,
                y: u.position.y,
                health: Some(u.health),
                kingdom: u.kingdom,
            })
            .collect();
        Self {
            version: SNAPSHOT_VERSION,
            map_size: state.map.size(),
            now_ms: state.now_ms,
            years_elapsed: Some(state.years_elapsed),
            config: state.config,
            tiles,
            kingdoms,
            buildings,
            units,
            player: Some(PlayerRecord {
                x: state.player.position.x,
                y: state.player.position.y,
                health: state.player.health,
            }),
            diplomacy: state.diplomacy.clone(),
            next_building_id: state.next_building_id,
            next_unit_id: state.next_unit_id,
        }
    }

    /// Serialize to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a snapshot document.
    pub fn from_json(text: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Save to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Load from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Rebuild a state, repairing whatever is malformed.
    ///
    /// # Errors
    ///
    /// [`SnapshotError::UnsupportedVersion`] for unknown versions and
    /// [`SnapshotError::InvalidMapSize`] when no valid config can hold the
    /// grid. Everything else is repaired.
    pub fn restore(&self) -> Result<Restored, SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        let mut repairs = Repairs(Vec::new());
        let mut state = self.empty_state(&mut repairs)?;

        self.restore_tiles(&mut state, &mut repairs);
        self.restore_kingdoms(&mut state, &mut repairs);
        self.restore_buildings(&mut state, &mut repairs);
        rebuild_perimeters(&mut state, &self.kingdoms, &mut repairs);
        clear_fallen_territory(&mut state, &mut repairs);
        self.restore_units(&mut state, &mut repairs);
        self.restore_player(&mut state, &mut repairs);

        state.diplomacy = self.diplomacy.clone();
        state.now_ms = self.now_ms - self.now_ms % state.config.tick_ms;
        if state.now_ms != self.now_ms {
            repairs.note(format!("clock {} snapped to the tick grid", self.now_ms));
        }
        state.years_elapsed = self.years_elapsed.unwrap_or_else(|| state.game_years());
        let highest = state.buildings.keys().next_back().copied();
        state.next_building_id = next_id(self.next_building_id, highest, "building", &mut repairs);
        let highest = state.units.keys().next_back().copied();
        state.next_unit_id = next_id(self.next_unit_id, highest, "unit", &mut repairs);

        for id in state.units_of(PLAYER_KINGDOM) {
            unit::dispatch_gatherer(&mut state, id);
        }
        Ok(Restored {
            state,
            repairs: repairs.0,
        })
    }

    fn empty_state(&self, repairs: &mut Repairs) -> Result<SimulationState, SnapshotError> {
        if self.map_size == 0 {
            return Err(SnapshotError::InvalidMapSize(self.map_size));
        }
        let config = SimulationConfig {
            map_size: self.map_size,
            ..self.config
        };
        if let Ok(state) = SimulationState::new(config) {
            return Ok(state);
        }
        repairs.note("config out of range, defaults used".to_string());
        let config = SimulationConfig {
            map_size: self.map_size,
            ..SimulationConfig::default()
        };
        SimulationState::new(config).map_err(|_| SnapshotError::InvalidMapSize(self.map_size))
    }

    fn restore_tiles(&self, state: &mut SimulationState, repairs: &mut Repairs) {
        let expected = usize::from(self.map_size) * usize::from(self.map_size);
        if self.tiles.len() != expected {
            repairs.note(format!(
                "expected {expected} tiles, found {}; grid reset to grass",
                self.tiles.len()
            ));
            return;
        }
        for (idx, record) in self.tiles.iter().enumerate() {
            let coord = state.map.coord_at(idx);
            if let Some(tile) = state.map.get_mut(coord) {
                tile.terrain = record.terrain;
                tile.resource = record.resource;
                tile.territory = record.territory;
                tile.is_capital = record.capital;
            }
        }
    }

    fn restore_kingdoms(&self, state: &mut SimulationState, repairs: &mut Repairs) {
        let mut records: Vec<&KingdomRecord> = self.kingdoms.iter().collect();
        records.sort_by_key(|k| k.id);
        for record in records {
            let expected = state.kingdoms.len();
            if usize::from(record.id) != expected || expected >= MAX_KINGDOMS {
                repairs.note(format!("kingdom {} dropped: ids must run 0..{MAX_KINGDOMS}", record.id));
                continue;
            }
            state.kingdoms.push(restore_kingdom(state, record, repairs));
        }
        if state.kingdoms.is_empty() {
            repairs.note("no kingdoms; player kingdom recreated".to_string());
            let center = state.map.center();
            let resources = state.config.player_resources;
            state
                .kingdoms
                .push(Kingdom::new(PLAYER_KINGDOM, PLAYER_KINGDOM, center, resources));
        }

        let count = state.kingdoms.len();
        let mut orphaned = 0;
        for (_, tile) in state.map.iter() {
            if tile.territory.is_some_and(|k| usize::from(k) >= count) {
                orphaned += 1;
            }
        }
        if orphaned > 0 {
            repairs.note(format!("{orphaned} tiles owned by unknown kingdoms released"));
            let size = state.map.size();
            for y in 0..size {
                for x in 0..size {
                    if let Some(tile) = state.map.get_mut(Coord::new(x, y)) {
                        if tile.territory.is_some_and(|k| usize::from(k) >= count) {
                            tile.territory = None;
                        }
                    }
                }
            }
        }
        let capitals: Vec<Coord> = state.kingdoms.iter().filter(|k| k.alive).map(|k| k.capital).collect();
        for capital in capitals {
            if let Some(tile) = state.map.get_mut(capital) {
                tile.is_capital = true;
            }
        }
    }

    fn restore_buildings(&self, state: &mut SimulationState, repairs: &mut Repairs) {
        for record in &self.buildings {
            if record.id == BuildingId::MAX {
                repairs.note(format!("building id {} out of range, dropped", record.id));
                continue;
            }
            let coord = Coord::new(record.x, record.y);
            if !state.map.in_bounds(coord) {
                repairs.note(format!("building {} off the grid dropped", record.id));
                continue;
            }
            if state.kingdom(record.owner).is_none_or(|k| !k.alive) {
                repairs.note(format!("building {} of missing kingdom {} dropped", record.id, record.owner));
                continue;
            }
            if state.buildings.contains_key(&record.id) {
                repairs.note(format!("duplicate building id {} dropped", record.id));
                continue;
            }
            let occupied = state.map.get(coord).is_some_and(|t| t.building.is_some());
            if occupied {
                repairs.note(format!("building {} stacked on an occupied tile dropped", record.id));
                continue;
            }
            let max = record.kind.max_health();
            let health = match record.health {
                Some(h) if h.is_finite() && h > 0.0 => h.min(max),
                Some(_) => {
                    repairs.note(format!("building {} health reset", record.id));
                    max
                }
                None => max,
            };
            let mut building = Building::new(record.id, record.kind, coord, record.owner);
            building.health = health;
            state.buildings.insert(record.id, building);
            if let Some(tile) = state.map.get_mut(coord) {
                tile.building = Some(TileBuilding {
                    id: record.id,
                    kind: record.kind,
                });
                if record.kind == BuildingType::Wall {
                    tile.is_wall = true;
                    tile.territory = Some(record.owner);
                    tile.resource = None;
                }
            }
        }
    }

    fn restore_units(&self, state: &mut SimulationState, repairs: &mut Repairs) {
        for record in &self.units {
            if record.id == UnitId::MAX {
                repairs.note(format!("unit id {} out of range, dropped", record.id));
                continue;
            }
            let coord = Coord::new(record.x, record.y);
            if !state.map.in_bounds(coord) {
                repairs.note(format!("unit {} off the grid dropped", record.id));
                continue;
            }
            if state.kingdom(record.kingdom).is_none_or(|k| !k.alive) {
                repairs.note(format!("unit {} of missing kingdom {} dropped", record.id, record.kingdom));
                continue;
            }
            if state.units.contains_key(&record.id) {
                repairs.note(format!("duplicate unit id {} dropped", record.id));
                continue;
            }
            let mut unit = Unit::new(record.id, record.kingdom, record.class, coord, self.now_ms);
            match record.health {
                Some(h) if h.is_finite() && h > 0.0 => unit.health = h,
                Some(_) => {
                    repairs.note(format!("unit {} was dead and is dropped", record.id));
                    continue;
                }
                None => {}
            }
            state.units.insert(record.id, unit);
        }
    }

    fn restore_player(&self, state: &mut SimulationState, repairs: &mut Repairs) {
        let center = state.map.center();
        let Some(record) = self.player else {
            repairs.note("player avatar missing, placed at the centre".to_string());
            state.player = PlayerAvatar::new(center);
            return;
        };
        let mut position = Coord::new(record.x, record.y);
        if !state.map.in_bounds(position) {
            repairs.note("player avatar off the grid, moved to the centre".to_string());
            position = center;
        }
        let mut player = PlayerAvatar::new(position);
        if record.health.is_finite() {
            player.health = record.health.max(0.0);
            player.alive = record.health > 0.0;
        } else {
            repairs.note("player health reset".to_string());
        }
        state.player = player;
    }
}

fn restore_kingdom(state: &SimulationState, record: &KingdomRecord, repairs: &mut Repairs) -> Kingdom {
    let id = record.id;
    let capital = match (record.capital_x, record.capital_y) {
        (Some(x), Some(y)) if state.map.in_bounds(Coord::new(x, y)) => Coord::new(x, y),
        _ => {
            let fallback = state
                .map
                .tiles_owned_by(id)
                .map(|(c, _)| c)
                .find(|c| state.map.get(*c).is_some_and(|t| t.is_capital))
                .or_else(|| state.map.tiles_owned_by(id).map(|(c, _)| c).next())
                .unwrap_or_else(|| state.map.center());
            repairs.note(format!(
                "kingdom {id} capital missing, using ({}, {})",
                fallback.x, fallback.y
            ));
            fallback
        }
    };

    let defaults = if id == PLAYER_KINGDOM {
        state.config.player_resources
    } else {
        state.config.ai_resources
    };
    let saved = record.resources.unwrap_or_default();
    if saved.wood.is_none() || saved.stone.is_none() || saved.food.is_none() {
        repairs.note(format!("kingdom {id} resources incomplete, defaults filled in"));
    }
    let resources = Resources::new(
        saved.wood.unwrap_or(defaults.wood),
        saved.stone.unwrap_or(defaults.stone),
        saved.food.unwrap_or(defaults.food),
    );

    let mut kingdom = Kingdom::new(id, record.faction.unwrap_or(id), capital, resources);
    kingdom.expansion_rate = match record.expansion_rate {
        Some(rate) if rate.is_finite() && rate > 0.0 => rate,
        Some(_) => {
            repairs.note(format!("kingdom {id} expansion rate reset"));
            1.0
        }
        None => 1.0,
    };
    kingdom.last_expansion_ms = record.last_expansion_ms;
    kingdom.walls_to_repair = record
        .walls_to_repair
        .iter()
        .copied()
        .filter(|b| state.map.in_bounds(b.coord))
        .collect();
    kingdom.alive = record.alive;
    kingdom
}

/// Next free id: past every restored id and never the reserved maximum.
fn next_id(saved: u32, highest: Option<u32>, what: &str, repairs: &mut Repairs) -> u32 {
    // Restored ids are below `u32::MAX`, so this cannot overflow.
    let floor = highest.map_or(1, |id| id + 1);
    if saved == u32::MAX {
        repairs.note(format!("next {what} id out of range, reset to {floor}"));
        return floor;
    }
    saved.max(floor)
}

/// Derive each perimeter from the wall tiles and report saved perimeters
/// that disagreed.
fn rebuild_perimeters(state: &mut SimulationState, records: &[KingdomRecord], repairs: &mut Repairs) {
    for kingdom in &mut state.kingdoms {
        let derived: BTreeSet<Coord> = state
            .map
            .iter()
            .filter(|(_, t)| t.is_wall_of(kingdom.id))
            .map(|(c, _)| c)
            .collect();
        let saved: Option<BTreeSet<Coord>> = records
            .iter()
            .find(|r| r.id == kingdom.id)
            .map(|r| r.wall_perimeter.iter().copied().collect());
        if saved.is_some_and(|s| s != derived) {
            repairs.note(format!(
                "kingdom {} perimeter disagreed with its walls and was rebuilt",
                kingdom.id
            ));
        }
        kingdom.wall_perimeter = derived;
    }
}

fn clear_fallen_territory(state: &mut SimulationState, repairs: &mut Repairs) {
    let fallen: Vec<KingdomId> = state.kingdoms.iter().filter(|k| !k.alive).map(|k| k.id).collect();
    for id in fallen {
        let owned: Vec<Coord> = state.map.tiles_owned_by(id).map(|(c, _)| c).collect();
        if owned.is_empty() {
            continue;
        }
        repairs.note(format!("fallen kingdom {id} released {} tiles", owned.len()));
        for coord in owned {
            if let Some(tile) = state.map.get_mut(coord) {
                tile.territory = None;
            }
        }
        if let Some(k) = state.kingdom_mut(id) {
            k.eliminate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::check_invariants;
    use crate::sim::new_simulation;

    fn small_config() -> SimulationConfig {
        SimulationConfig {
            map_size: 64,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn test_capture_restore_preserves_world() {
        let mut sim = new_simulation(5, &small_config()).unwrap();
        sim.run_for(3_000);
        let snapshot = Snapshot::capture(&sim.state);
        let restored = Snapshot::from_json(&snapshot.to_json().unwrap())
            .unwrap()
            .restore()
            .unwrap();
        assert!(restored.repairs.is_empty(), "{:?}", restored.repairs);
        let state = restored.state;
        assert_eq!(state.map, sim.state.map);
        assert_eq!(state.buildings, sim.state.buildings);
        assert_eq!(state.now_ms, sim.state.now_ms);
        assert_eq!(state.diplomacy, sim.state.diplomacy);
        for (a, b) in state.kingdoms.iter().zip(&sim.state.kingdoms) {
            assert_eq!(a.capital, b.capital);
            assert_eq!(a.resources, b.resources);
            assert_eq!(a.wall_perimeter, b.wall_perimeter);
        }
        assert_eq!(state.units.len(), sim.state.units.len());
        assert!(check_invariants(&state).is_empty());
    }

    #[test]
    fn test_unsupported_version() {
        let sim = new_simulation(1, &small_config()).unwrap();
        let mut snapshot = Snapshot::capture(&sim.state);
        snapshot.version = 7;
        assert!(matches!(
            snapshot.restore(),
            Err(SnapshotError::UnsupportedVersion(7))
        ));
    }

    #[test]
    fn test_missing_capital_and_resources_repaired() {
        let sim = new_simulation(2, &small_config()).unwrap();
        let mut snapshot = Snapshot::capture(&sim.state);
        let capital = sim.state.kingdoms[1].capital;
        snapshot.kingdoms[1].capital_x = None;
        snapshot.kingdoms[1].resources = Some(ResourceRecord {
            wood: Some(7),
            stone: None,
            food: None,
        });
        snapshot.kingdoms[1].expansion_rate = Some(f64::NAN);

        let restored = snapshot.restore().unwrap();
        assert_eq!(restored.repairs.len(), 3);
        let kingdom = &restored.state.kingdoms[1];
        assert_eq!(kingdom.capital, capital);
        assert_eq!(kingdom.resources, Resources::new(7, 100, 100));
        assert!((kingdom.expansion_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_out_of_range_ids_are_dropped() {
        let sim = new_simulation(4, &small_config()).unwrap();
        let mut snapshot = Snapshot::capture(&sim.state);
        snapshot.buildings[0].id = BuildingId::MAX;
        snapshot.units[0].id = UnitId::MAX;
        snapshot.next_building_id = BuildingId::MAX;
        snapshot.next_unit_id = UnitId::MAX;

        let restored = snapshot.restore().unwrap();
        let state = &restored.state;
        assert!(!state.buildings.contains_key(&BuildingId::MAX));
        assert!(!state.units.contains_key(&UnitId::MAX));
        assert_eq!(state.buildings.len(), sim.state.buildings.len() - 1);
        assert_eq!(state.units.len(), sim.state.units.len() - 1);
        assert!(state.buildings.keys().all(|id| *id < state.next_building_id));
        assert!(state.units.keys().all(|id| *id < state.next_unit_id));
        assert!(state.next_building_id < BuildingId::MAX);
        assert!(state.next_unit_id < UnitId::MAX);
        let out_of_range = restored.repairs.iter().filter(|r| r.contains("out of range")).count();
        assert_eq!(out_of_range, 4);
        assert!(check_invariants(state).is_empty());
    }

    #[test]
    fn test_clock_off_the_tick_grid_is_snapped() {
        let sim = new_simulation(6, &small_config()).unwrap();
        let mut snapshot = Snapshot::capture(&sim.state);
        snapshot.now_ms = 12_345;

        let restored = snapshot.restore().unwrap();
        assert_eq!(restored.state.now_ms, 12_300);
        assert_eq!(restored.repairs.len(), 1);

        // The resumed clock lands on whole seconds again, so the AI keeps ticking.
        let mut resumed = crate::game::Simulation::seeded(restored.state, 6);
        resumed.run_for(700);
        assert_eq!(resumed.state.now_ms, 13_000);
        assert_eq!(resumed.state.now_ms % crate::game::AI_TICK_MS, 0);
    }

    #[test]
    fn test_stale_perimeter_is_rebuilt() {
        let sim = new_simulation(3, &small_config()).unwrap();
        let mut snapshot = Snapshot::capture(&sim.state);
        snapshot.kingdoms[0].wall_perimeter.truncate(3);
        snapshot.kingdoms[0].wall_perimeter.push(Coord::new(1, 1));

        let restored = snapshot.restore().unwrap();
        assert_eq!(restored.repairs.len(), 1);
        assert_eq!(
            restored.state.kingdoms[0].wall_perimeter,
            sim.state.kingdoms[0].wall_perimeter
        );
        assert!(check_invariants(&restored.state).is_empty());
    }

    #[test]
    fn test_sparse_json_loads_with_defaults() {
        let size = 32usize;
        let tiles = vec![r#"{"terrain":"grass"}"#; size * size].join(",");
        let text = format!(
            r#"{{"version":1,"map_size":{size},"now_ms":0,"tiles":[{tiles}],
                "kingdoms":[{{"id":0}}],
                "buildings":[{{"id":4,"kind":"wall","x":99,"y":1,"owner":0}}]}}"#
        );
        let restored = Snapshot::from_json(&text).unwrap().restore().unwrap();
        let state = restored.state;
        assert_eq!(state.kingdoms.len(), 1);
        assert_eq!(state.kingdoms[0].capital, state.map.center());
        assert_eq!(state.kingdoms[0].resources, Resources::new(200, 200, 200));
        assert!(state.buildings.is_empty());
        assert!(restored.repairs.iter().any(|r| r.contains("off the grid")));
        assert!(restored.repairs.iter().any(|r| r.contains("avatar missing")));
        assert!(check_invariants(&state).is_empty());
    }

    #[test]
    fn test_save_and_load_file() {
        let sim = new_simulation(4, &small_config()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.json");
        Snapshot::capture(&sim.state).save(&path).unwrap();
        let loaded = Snapshot::load(&path).unwrap();
        assert_eq!(loaded, Snapshot::capture(&sim.state));
    }
}
