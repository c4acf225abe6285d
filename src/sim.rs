//! Headless simulation runner.
//!
//! Provides a pure function interface: `(seed, config) -> SimulationReport`
//!
//! The runner handles:
//! - Deterministic world generation and kingdom placement
//! - Stepping the simulation for the configured duration
//! - Tallying events and summarising every kingdom at the end

mod mapgen;

pub use mapgen::{
    FACTION_NAMES, MIN_AI_DISTANCE, MIN_PLAYER_DISTANCE, find_capital_site, generate_world,
    initialize_kingdoms,
};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::info;

use crate::config::SimulationConfig;
use crate::error::SimError;
use crate::game::{
    BuildingType, KingdomId, Resources, SimEvent, Simulation, SimulationState,
};

/// Build a ready-to-run simulation: world, kingdoms and a ChaCha RNG
/// seeded with `seed`.
///
/// # Errors
///
/// Returns [`SimError::InvalidConfig`] if the config does not validate.
pub fn new_simulation(seed: u64, config: &SimulationConfig) -> Result<Simulation, SimError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut state = generate_world(config, &mut rng)?;
    initialize_kingdoms(&mut state, &mut rng);
    Ok(Simulation::new(state, rng))
}

/// Counts of notable events over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventTally {
    /// Tiles claimed through enclosure.
    pub tiles_claimed: usize,
    /// Redundant walls pruned.
    pub walls_pruned: usize,
    /// Walls destroyed in combat.
    pub walls_breached: usize,
    /// Breaches rebuilt.
    pub walls_repaired: usize,
    /// Non-wall structures built.
    pub buildings_placed: usize,
    /// Soldiers trained.
    pub soldiers_trained: usize,
    /// Units killed.
    pub units_killed: usize,
    /// Raids launched.
    pub raids: usize,
    /// Kingdoms conquered.
    pub conquests: usize,
    /// Diplomacy events, treaty expiries included.
    pub diplomacy: usize,
}

impl EventTally {
    /// Fold one event into the tally.
    pub fn record(&mut self, event: &SimEvent) {
        match event {
            SimEvent::TerritoryClaimed { tiles, .. } => self.tiles_claimed += *tiles,
            SimEvent::WallsPruned { count, .. } => self.walls_pruned += *count,
            SimEvent::WallBreached { .. } => self.walls_breached += 1,
            SimEvent::WallRepaired { .. } => self.walls_repaired += 1,
            SimEvent::BuildingPlaced { .. } => self.buildings_placed += 1,
            SimEvent::BuildingDestroyed { .. } | SimEvent::PlayerDefeated => {}
            SimEvent::SoldierTrained { .. } => self.soldiers_trained += 1,
            SimEvent::UnitKilled { .. } => self.units_killed += 1,
            SimEvent::RaidLaunched { .. } => self.raids += 1,
            SimEvent::KingdomConquered { .. } => self.conquests += 1,
            SimEvent::Diplomacy(_) => self.diplomacy += 1,
        }
    }

    /// Add another tally into this one.
    pub fn merge(&mut self, other: &EventTally) {
        self.tiles_claimed += other.tiles_claimed;
        self.walls_pruned += other.walls_pruned;
        self.walls_breached += other.walls_breached;
        self.walls_repaired += other.walls_repaired;
        self.buildings_placed += other.buildings_placed;
        self.soldiers_trained += other.soldiers_trained;
        self.units_killed += other.units_killed;
        self.raids += other.raids;
        self.conquests += other.conquests;
        self.diplomacy += other.diplomacy;
    }
}

/// End-of-run summary for one kingdom.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KingdomReport {
    /// Kingdom id (0 is the player).
    pub id: KingdomId,
    /// Faction name.
    pub name: String,
    /// Whether the kingdom survived.
    pub alive: bool,
    /// Territory tiles, walls included.
    pub territory: usize,
    /// Wall tiles.
    pub walls: usize,
    /// Non-wall structures.
    pub buildings: usize,
    /// Living soldiers.
    pub soldiers: usize,
    /// Living units of every class.
    pub units: usize,
    /// Treasury at the end.
    pub resources: Resources,
}

impl KingdomReport {
    /// Summarise a kingdom of `state`.
    #[must_use]
    pub fn from_state(state: &SimulationState, id: KingdomId) -> Option<Self> {
        let kingdom = state.kingdom(id)?;
        let name = state
            .diplomacy
            .factions
            .get(&kingdom.faction)
            .map(|f| f.name.clone())
            .or_else(|| FACTION_NAMES.get(usize::from(kingdom.faction)).map(|n| (*n).to_string()))
            .unwrap_or_default();
        let buildings = state
            .buildings
            .values()
            .filter(|b| b.owner == id && b.kind != BuildingType::Wall)
            .count();
        Some(Self {
            id,
            name,
            alive: kingdom.alive,
            territory: state.map.count_territory(id),
            walls: kingdom.wall_perimeter.len(),
            buildings,
            soldiers: state.soldier_count(id),
            units: state.units_of(id).len(),
            resources: kingdom.resources,
        })
    }
}

/// Final result of a headless run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    /// The seed used for this run.
    pub seed: u64,
    /// Simulated time when the run stopped.
    pub elapsed_ms: u64,
    /// In-game years elapsed.
    pub years: u64,
    /// Whether the player avatar survived.
    pub player_alive: bool,
    /// Largest surviving kingdom by territory, if any survived.
    pub leader: Option<KingdomId>,
    /// Per-kingdom summaries, by id.
    pub kingdoms: Vec<KingdomReport>,
    /// Event counts.
    pub events: EventTally,
}

impl SimulationReport {
    /// Summarise a state after a run.
    #[must_use]
    pub fn from_state(seed: u64, state: &SimulationState, events: EventTally) -> Self {
        let kingdoms: Vec<KingdomReport> = state
            .kingdoms
            .iter()
            .filter_map(|k| KingdomReport::from_state(state, k.id))
            .collect();
        let leader = kingdoms
            .iter()
            .filter(|k| k.alive)
            .max_by(|a, b| a.territory.cmp(&b.territory).then(b.id.cmp(&a.id)))
            .map(|k| k.id);
        Self {
            seed,
            elapsed_ms: state.now_ms,
            years: state.game_years(),
            player_alive: state.player.alive,
            leader,
            kingdoms,
            events,
        }
    }
}

/// Drive a simulation to the end of `duration_ms` or game over, tallying
/// events as they are produced.
pub fn drive(sim: &mut Simulation, duration_ms: u64) -> EventTally {
    let end = sim.state.now_ms.saturating_add(duration_ms);
    let mut tally = EventTally::default();
    while sim.state.now_ms < end && !sim.state.is_game_over() {
        for event in sim.step() {
            tally.record(&event);
        }
    }
    tally
}

/// Run one seeded simulation for `config.duration_ms`.
///
/// # Errors
///
/// Returns [`SimError::InvalidConfig`] if the config does not validate.
pub fn run_simulation(seed: u64, config: &SimulationConfig) -> Result<SimulationReport, SimError> {
    let mut sim = new_simulation(seed, config)?;
    let tally = drive(&mut sim, config.duration_ms);
    let report = SimulationReport::from_state(seed, &sim.state, tally);
    info!(
        seed,
        elapsed_ms = report.elapsed_ms,
        leader = ?report.leader,
        "simulation finished"
    );
    Ok(report)
}
