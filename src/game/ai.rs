//! AI kingdom loop.
//!
//! Once per simulated second each AI kingdom runs, in priority order:
//! repair, gather, build, expand. Each category sits behind its own chance
//! gate, and every gate opens wider as the treasury runs dry. Barracks
//! training and the +1 trickle run every tick regardless.

use rand::Rng;
use tracing::debug;

use crate::error::GameError;
use crate::game::{
    AttackTarget, Behavior, BuildingId, BuildingType, Coord, Cost, EnclosureDetector, KingdomId,
    ResourceKind, ScheduledEvent, SimEvent, SimulationState, Unit, UnitClass, UnitId, diplomacy,
    territory, unit,
};

/// Total stock at which scarcity reaches zero.
const SCARCITY_SCALE: f64 = 300.0;

/// Stone needed before a repair is attempted.
const REPAIR_STONE_FLOOR: u32 = 5;

/// Wood and stone floor for building and expanding.
const BUILD_FLOOR: Cost = Cost::new(30, 20, 0);

/// Food below which mills are preferred.
pub const FOOD_LOW: u32 = 40;

/// Maximum distance from the capital for new buildings.
const BUILD_RADIUS: f64 = 20.0;

/// Maximum distance from the capital for new walls.
const EXPANSION_RADIUS: f64 = 45.0;

/// Base expansion cooldown, divided by the kingdom's expansion rate.
const EXPANSION_COOLDOWN_MS: f64 = 3000.0;

/// Largest expansion batch.
const MAX_EXPANSION_BATCH: f64 = 10.0;

/// Share of a kingdom's units kept gathering, and the cap on gatherers.
const GATHER_SHARE: f64 = 0.4;
const MAX_GATHERERS: usize = 3;

/// Houses built before anything else.
const MIN_HOUSES: usize = 3;

/// Time a barracks needs to train one soldier.
pub const TRAINING_MS: u64 = 10_000;

/// Food charged when a soldier completes training.
pub const SOLDIER_FOOD: Cost = Cost::new(0, 0, 10);

/// Idle soldiers needed before a raid is considered.
const RAID_MIN_SOLDIERS: usize = 4;

/// Per-tick chance of launching a raid.
const RAID_CHANCE: f64 = 0.05;

/// Passive income per tick.
const TRICKLE: Cost = Cost::new(1, 1, 1);

/// A gated category of the AI tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Rebuild the oldest breach.
    Repair,
    /// Top up gatherers.
    Gather,
    /// Raise one building.
    Build,
    /// Push the wall line outward.
    Expand,
}

impl Stage {
    /// Chance that the stage runs this tick at scarcity `s`.
    ///
    /// Repair `0.6 + 0.3s`, gather `0.5 + 0.4s`, build `0.35 + 0.25s`,
    /// expand `0.4 + 0.3s`.
    #[must_use]
    pub fn chance(self, s: f64) -> f64 {
        let (base, bonus) = match self {
            Self::Repair => (0.6, 0.3),
            Self::Gather => (0.5, 0.4),
            Self::Build => (0.35, 0.25),
            Self::Expand => (0.4, 0.3),
        };
        (base + bonus * s.clamp(0.0, 1.0)).min(1.0)
    }
}

/// Scarcity in `[0, 1]`: `1 - min(total / 300, 1)`.
#[must_use]
pub fn scarcity(total: u32) -> f64 {
    1.0 - (f64::from(total) / SCARCITY_SCALE).min(1.0)
}

/// Number of walls in one expansion batch:
/// `clamp(round((2 + minutes) × rate), 1, 10)`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn expansion_batch(elapsed_minutes: f64, expansion_rate: f64) -> usize {
    ((2.0 + elapsed_minutes) * expansion_rate)
        .round()
        .clamp(1.0, MAX_EXPANSION_BATCH) as usize
}

/// Run one AI tick for `kingdom`.
pub fn run_kingdom_tick<R: Rng + ?Sized>(
    state: &mut SimulationState,
    detector: &dyn EnclosureDetector,
    kingdom: KingdomId,
    rng: &mut R,
) {
    let Some(k) = state.kingdom(kingdom) else {
        return;
    };
    if !k.alive || k.is_player() {
        return;
    }
    let s = scarcity(k.resources.total());

    if !k.walls_to_repair.is_empty() && rng.random_bool(Stage::Repair.chance(s)) {
        try_repair(state, detector, kingdom, rng);
    }
    if rng.random_bool(Stage::Gather.chance(s)) {
        assign_gatherers(state, kingdom);
    }
    if rng.random_bool(Stage::Build.chance(s)) {
        try_build(state, kingdom, rng);
    }
    if rng.random_bool(Stage::Expand.chance(s)) {
        try_expand(state, detector, kingdom, rng);
    }

    start_training(state, kingdom);
    maybe_raid(state, kingdom, rng);

    if let Some(k) = state.kingdom_mut(kingdom) {
        k.resources.gain(TRICKLE);
    }
}

/// Repair the oldest breach whose cooldown has elapsed, if stone allows.
fn try_repair<R: Rng + ?Sized>(
    state: &mut SimulationState,
    detector: &dyn EnclosureDetector,
    kingdom: KingdomId,
    rng: &mut R,
) {
    let now = state.now_ms;
    let Some(coord) = state.kingdom(kingdom).and_then(|k| {
        if k.resources.stone < REPAIR_STONE_FLOOR {
            return None;
        }
        k.walls_to_repair
            .iter()
            .filter(|b| now.saturating_sub(b.broken_at_ms) >= territory::REPAIR_COOLDOWN_MS)
            .min_by_key(|b| b.broken_at_ms)
            .map(|b| b.coord)
    }) else {
        return;
    };
    match territory::repair_wall(state, detector, kingdom, coord, rng) {
        Ok(_) => {}
        // Something else now stands there; give up on this breach.
        Err(GameError::InvalidPlacement { .. } | GameError::OutOfBounds { .. }) => {
            if let Some(k) = state.kingdom_mut(kingdom) {
                k.clear_breach(coord);
            }
        }
        Err(err) => debug!(kingdom, %err, "repair deferred"),
    }
}

/// Top up gatherers to about 40% of the kingdom's units, at most three.
fn assign_gatherers(state: &mut SimulationState, kingdom: KingdomId) {
    let units = state.units_of(kingdom);
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let desired = ((units.len() as f64 * GATHER_SHARE).round() as usize).min(MAX_GATHERERS);
    let active = units
        .iter()
        .filter(|id| state.units.get(id).is_some_and(Unit::is_gathering))
        .count();
    if active >= desired {
        return;
    }

    // Peasants first, then soldiers.
    let mut idle: Vec<_> = units
        .iter()
        .filter_map(|id| state.units.get(id))
        .filter(|u| u.is_idle())
        .map(|u| (u.class.is_soldier(), u.id))
        .collect();
    idle.sort_unstable();

    let mut deficit = desired - active;
    for (_, id) in idle {
        if deficit == 0 {
            break;
        }
        if unit::dispatch_gatherer(state, id) {
            deficit -= 1;
        }
    }
}

/// Pick the next building by need.
///
/// Houses until three stand, then one barracks, then mills while food is
/// low, then houses again when soldiers near the cap, otherwise a weighted
/// draw.
pub fn choose_building<R: Rng + ?Sized>(state: &SimulationState, kingdom: KingdomId, rng: &mut R) -> BuildingType {
    let houses = state.building_count(kingdom, BuildingType::House);
    let barracks = state.building_count(kingdom, BuildingType::Barracks);
    let food = state
        .kingdom(kingdom)
        .map_or(0, |k| k.resources.get(ResourceKind::Food));

    if houses < MIN_HOUSES {
        BuildingType::House
    } else if barracks == 0 {
        BuildingType::Barracks
    } else if food < FOOD_LOW {
        BuildingType::Mill
    } else if state.soldier_count(kingdom) + 1 >= state.soldier_cap(kingdom) {
        BuildingType::House
    } else {
        match rng.random_range(0..10) {
            0..4 => BuildingType::House,
            4..7 => BuildingType::Barracks,
            _ => BuildingType::Mill,
        }
    }
}

/// Best building site: a free own-territory tile within 20 tiles of the
/// capital and next to more territory, closest to the capital first.
#[must_use]
pub fn building_site(state: &SimulationState, kingdom: KingdomId) -> Option<Coord> {
    let capital = state.kingdom(kingdom)?.capital;
    state
        .map
        .tiles_owned_by(kingdom)
        .filter(|(coord, tile)| {
            tile.is_clear()
                && !tile.is_capital
                && coord.distance(capital) <= BUILD_RADIUS
                && state.map.touches_territory(*coord, kingdom)
        })
        .map(|(coord, _)| coord)
        .min_by(|a, b| {
            a.distance(capital)
                .total_cmp(&b.distance(capital))
                .then_with(|| a.cmp(b))
        })
}

fn try_build<R: Rng + ?Sized>(state: &mut SimulationState, kingdom: KingdomId, rng: &mut R) {
    let affordable = state
        .kingdom(kingdom)
        .is_some_and(|k| k.resources.can_afford(BUILD_FLOOR));
    if !affordable {
        return;
    }
    let kind = choose_building(state, kingdom, rng);
    let Some(site) = building_site(state, kingdom) else {
        return;
    };
    if let Err(err) = state.construct(kingdom, kind, site) {
        debug!(kingdom, %kind, %err, "build skipped");
    }
}

/// Wall sites for the next expansion batch, closest to the capital first.
#[must_use]
pub fn expansion_candidates(state: &SimulationState, kingdom: KingdomId) -> Vec<Coord> {
    let Some(capital) = state.kingdom(kingdom).map(|k| k.capital) else {
        return Vec::new();
    };
    let mut candidates: Vec<Coord> = state
        .map
        .iter()
        .filter(|(coord, tile)| {
            tile.territory.is_none()
                && !tile.is_wall
                && tile.building.is_none()
                && !tile.is_capital
                && coord.distance(capital) <= EXPANSION_RADIUS
                && state.map.touches_territory(*coord, kingdom)
        })
        .map(|(coord, _)| coord)
        .collect();
    candidates.sort_by(|a, b| {
        a.distance(capital)
            .total_cmp(&b.distance(capital))
            .then_with(|| a.cmp(b))
    });
    candidates
}

fn try_expand<R: Rng + ?Sized>(
    state: &mut SimulationState,
    detector: &dyn EnclosureDetector,
    kingdom: KingdomId,
    rng: &mut R,
) {
    let now = state.now_ms;
    let Some(k) = state.kingdom(kingdom) else {
        return;
    };
    let rate = k.expansion_rate;
    #[allow(clippy::cast_precision_loss)]
    let since = now.saturating_sub(k.last_expansion_ms) as f64;
    if since < EXPANSION_COOLDOWN_MS / rate || !k.resources.can_afford(BUILD_FLOOR) {
        return;
    }

    let batch = expansion_batch(state.elapsed_minutes(), rate);
    let mut placed = 0;
    for coord in expansion_candidates(state, kingdom) {
        if placed == batch {
            break;
        }
        // Lift any node in the way; it is harvested only once the wall stands.
        let node = state.map.get_mut(coord).and_then(|t| t.resource.take());
        match territory::place_wall(state, detector, kingdom, coord) {
            Ok(_) => {
                placed += 1;
                if let (Some(node), Some(k)) = (node, state.kingdoms.get_mut(usize::from(kingdom))) {
                    unit::harvest_yield(node, &mut k.resources, rng);
                }
            }
            Err(err) => {
                if let Some(tile) = state.map.get_mut(coord) {
                    tile.resource = node;
                }
                if matches!(err, GameError::InsufficientResources { .. }) {
                    break;
                }
            }
        }
    }
    if let Some(k) = state.kingdom_mut(kingdom) {
        k.last_expansion_ms = now;
    }
    debug!(kingdom, placed, batch, "expansion batch");
}

/// Start training at every idle barracks while below the soldier cap.
pub fn start_training(state: &mut SimulationState, kingdom: KingdomId) {
    let Some(k) = state.kingdom(kingdom) else {
        return;
    };
    let mut pending = state.soldier_count(kingdom) + k.training_in_progress.len();
    let cap = state.soldier_cap(kingdom);
    let idle_barracks: Vec<BuildingId> = state
        .buildings
        .values()
        .filter(|b| b.owner == kingdom && b.kind == BuildingType::Barracks)
        .filter(|b| !k.training_in_progress.contains(&b.id))
        .map(|b| b.id)
        .collect();

    let at = state.now_ms + TRAINING_MS;
    for building in idle_barracks {
        if pending >= cap {
            break;
        }
        if let Some(k) = state.kingdom_mut(kingdom) {
            k.training_in_progress.insert(building);
        }
        state
            .scheduler
            .schedule_at(at, ScheduledEvent::TrainSoldier { kingdom, building });
        pending += 1;
    }
}

/// Finish a training run: spawn a warrior or archer next to the barracks
/// if the barracks still stands, the cap allows it and food covers the cost.
pub fn complete_training<R: Rng + ?Sized>(
    state: &mut SimulationState,
    kingdom: KingdomId,
    building: BuildingId,
    rng: &mut R,
) {
    let Some(k) = state.kingdom_mut(kingdom) else {
        return;
    };
    if !k.training_in_progress.remove(&building) || !k.alive {
        return;
    }
    let Some(position) = state
        .buildings
        .get(&building)
        .filter(|b| b.owner == kingdom)
        .map(|b| b.position)
    else {
        return;
    };
    if state.soldier_count(kingdom) >= state.soldier_cap(kingdom) {
        return;
    }
    let paid = state
        .kingdom_mut(kingdom)
        .is_some_and(|k| k.resources.spend(SOLDIER_FOOD).is_ok());
    if !paid {
        return;
    }
    let class = if rng.random_bool(0.5) {
        UnitClass::Warrior
    } else {
        UnitClass::Archer
    };
    let spot = state.free_tile_near(position, kingdom);
    let unit = state.spawn_unit(kingdom, class, spot);
    debug!(kingdom, unit, ?class, "soldier trained");
    state.emit(SimEvent::SoldierTrained { kingdom, unit });
}

/// Nearest living kingdom, by capital distance, that a hostility roll marks
/// as an enemy of `kingdom`.
pub fn nearest_hostile_kingdom<R: Rng + ?Sized>(
    state: &SimulationState,
    kingdom: KingdomId,
    rng: &mut R,
) -> Option<KingdomId> {
    let capital = state.kingdom(kingdom)?.capital;
    let mut others: Vec<(f64, KingdomId)> = state
        .kingdoms
        .iter()
        .filter(|k| k.alive && k.id != kingdom)
        .map(|k| (k.capital.distance(capital), k.id))
        .collect();
    others.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    others
        .into_iter()
        .map(|(_, id)| id)
        .find(|other| diplomacy::are_kingdoms_hostile(state, kingdom, *other, rng))
}

/// Send `soldiers` on attack paths against `target`.
pub fn send_attack(state: &mut SimulationState, soldiers: &[UnitId], target: KingdomId) {
    for id in soldiers {
        if let Some(u) = state.units.get_mut(id) {
            u.reset();
            u.behavior = Behavior::Aggressive;
            u.attack_path = Some(AttackTarget::Kingdom(target));
        }
    }
}

/// Idle soldiers of a kingdom, in id order.
#[must_use]
pub fn idle_soldiers(state: &SimulationState, kingdom: KingdomId) -> Vec<UnitId> {
    state
        .units
        .values()
        .filter(|u| u.kingdom == kingdom && u.class.is_soldier() && u.is_idle())
        .map(|u| u.id)
        .collect()
}

fn maybe_raid<R: Rng + ?Sized>(state: &mut SimulationState, kingdom: KingdomId, rng: &mut R) {
    let idle = idle_soldiers(state, kingdom);
    if idle.len() < RAID_MIN_SOLDIERS || !rng.random_bool(RAID_CHANCE) {
        return;
    }
    let Some(target) = nearest_hostile_kingdom(state, kingdom, rng) else {
        return;
    };
    let party = &idle[..idle.len() / 2];
    send_attack(state, party, target);
    debug!(kingdom, target, soldiers = party.len(), "raid launched");
    state.emit(SimEvent::RaidLaunched {
        kingdom,
        target,
        soldiers: party.len(),
    });
}
