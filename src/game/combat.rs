//! Unit movement and combat resolution.
//!
//! Every unit moves once per its own delay. On each move it does exactly
//! one of:
//!
//! - run its gathering trip
//! - follow an attack path toward another kingdom's capital
//! - chase the player avatar
//! - look around: pursue a hostile target in range, flee a stronger one,
//!   or wander near home
//!
//! Hostility is rolled on every encounter through the diplomacy resolver.

use rand::Rng;
use tracing::{debug, info};

use crate::game::{
    AttackTarget, Behavior, BuildingId, BuildingType, Coord, Cost, KingdomId, PLAYER_FACTION,
    PLAYER_KINGDOM, ScheduledEvent, SimEvent, SimulationState, UnitClass, UnitId, diplomacy,
    territory, unit,
};

/// Aggression radius before bonuses.
pub const BASE_AGGRESSION: f64 = 25.0;

/// Largest time-based aggression bonus.
pub const MAX_TIME_AGGRESSION: f64 = 15.0;

/// Extra aggression radius for soldiers.
pub const SOLDIER_AGGRESSION: f64 = 15.0;

/// Radius for counting friends and foes in strength checks.
pub const STRENGTH_RADIUS: f64 = 10.0;

/// Relative strength below which a unit flees.
pub const FLEE_THRESHOLD: f64 = 0.6;

/// Simulated time at which damage reaches its 2× ceiling.
pub const DAMAGE_RAMP_MS: f64 = 1_200_000.0;

const DAMAGE_VARIANCE: f64 = 0.3;
const DEFENDER_REDUCTION: f64 = 0.05;
const MAX_DEFENDER_REDUCTION: f64 = 0.7;
const CRIT_CHANCE: f64 = 0.15;
const CRIT_MULTIPLIER: f64 = 1.5;

/// Flat multiplier for attacks on buildings.
pub const BUILDING_DAMAGE_MULTIPLIER: f64 = 1.5;

const BURST_CHANCE: f64 = 0.25;
const BURST_FACTOR: f64 = 0.6;
const WANDER_CHANCE: f64 = 0.7;

/// Bonus granted on top of half the defeated treasury.
pub const PLUNDER_BONUS: Cost = Cost::new(50, 50, 50);

/// Chance a conquered wall is kept rather than torn down.
pub const WALL_CONVERSION_CHANCE: f64 = 0.5;

/// Radius within which a unit notices targets.
///
/// `25 + min(years / 10, 15) + 15` for soldiers.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn aggression_distance(game_years: u64, class: UnitClass) -> f64 {
    let time_bonus = (game_years as f64 / 10.0).min(MAX_TIME_AGGRESSION);
    let class_bonus = if class.is_soldier() {
        SOLDIER_AGGRESSION
    } else {
        0.0
    };
    BASE_AGGRESSION + time_bonus + class_bonus
}

/// Damage ramp: `1 + min(elapsed / 20 min, 1)`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn time_multiplier(now_ms: u64) -> f64 {
    1.0 + (now_ms as f64 / DAMAGE_RAMP_MS).min(1.0)
}

/// Damage of one unit-on-unit hit.
///
/// The base attack is scaled by the time ramp and ±30% variance, reduced
/// 5% per adjacent defender (at most 70%), with a 15% chance of a 1.5×
/// critical.
pub fn compute_damage<R: Rng + ?Sized>(base: f64, now_ms: u64, defenders: usize, rng: &mut R) -> f64 {
    let variance = rng.random_range(1.0 - DAMAGE_VARIANCE..=1.0 + DAMAGE_VARIANCE);
    #[allow(clippy::cast_precision_loss)]
    let reduction = (defenders as f64 * DEFENDER_REDUCTION).min(MAX_DEFENDER_REDUCTION);
    let mut damage = base * time_multiplier(now_ms) * variance * (1.0 - reduction);
    if rng.random_bool(CRIT_CHANCE) {
        damage *= CRIT_MULTIPLIER;
    }
    damage
}

/// Damage of one hit against a building.
#[must_use]
pub fn building_damage(base: f64) -> f64 {
    base * BUILDING_DAMAGE_MULTIPLIER
}

/// Units of `kingdom` standing next to `at`, excluding `except`.
#[must_use]
pub fn adjacent_defenders(state: &SimulationState, at: Coord, kingdom: KingdomId, except: Option<UnitId>) -> usize {
    state
        .units
        .values()
        .filter(|u| u.kingdom == kingdom && Some(u.id) != except && u.position.touches(at))
        .count()
}

/// Friendly over hostile combat weight within [`STRENGTH_RADIUS`] of a unit.
///
/// Foreign units count as hostile unless their kingdom can never fight this
/// one. Returns infinity when no hostile weight is nearby.
#[must_use]
pub fn relative_strength(state: &SimulationState, unit_id: UnitId) -> f64 {
    let Some(me) = state.units.get(&unit_id) else {
        return 0.0;
    };
    let mut friendly = 0.0;
    let mut hostile = 0.0;
    for other in state.units.values() {
        if other.position.distance(me.position) > STRENGTH_RADIUS {
            continue;
        }
        if other.kingdom == me.kingdom {
            friendly += other.strength();
        } else if diplomacy::hostility_chance(state, me.kingdom, other.kingdom) > 0.0 {
            hostile += other.strength();
        }
    }
    if state.player.alive && state.player.position.distance(me.position) <= STRENGTH_RADIUS {
        if me.kingdom == PLAYER_KINGDOM {
            friendly += state.player.strength();
        } else if diplomacy::hostility_chance(state, me.kingdom, PLAYER_KINGDOM) > 0.0 {
            hostile += state.player.strength();
        }
    }
    if hostile <= 0.0 {
        f64::INFINITY
    } else {
        friendly / hostile
    }
}

/// Apply `damage` to a unit. Returns `true` if it died.
///
/// A non-player kingdom that loses its last unit this way is conquered by
/// `attacker`.
pub fn damage_unit<R: Rng + ?Sized>(
    state: &mut SimulationState,
    attacker: KingdomId,
    target: UnitId,
    damage: f64,
    rng: &mut R,
) -> bool {
    let Some(u) = state.units.get_mut(&target) else {
        return false;
    };
    u.health -= damage;
    if !u.is_dead() {
        return false;
    }
    let kingdom = u.kingdom;
    state.units.remove(&target);
    state.emit(SimEvent::UnitKilled {
        kingdom,
        unit: target,
    });

    let wiped_out = kingdom != PLAYER_KINGDOM
        && kingdom != attacker
        && state.kingdom(kingdom).is_some_and(|k| k.alive)
        && !state.units.values().any(|u| u.kingdom == kingdom);
    if wiped_out {
        claim_enemy_kingdom_territory(state, attacker, kingdom, rng);
    }
    true
}

/// Apply `damage` to the player avatar.
pub fn damage_player(state: &mut SimulationState, damage: f64) {
    if !state.player.alive {
        return;
    }
    state.player.health -= damage;
    if state.player.health <= 0.0 {
        state.player.health = 0.0;
        state.player.alive = false;
        info!(now_ms = state.now_ms, "player defeated");
        state.emit(SimEvent::PlayerDefeated);
    }
}

/// Apply `damage` to a building. Returns `true` if it was destroyed.
///
/// A destroyed wall leaves a breach on its owner's repair queue.
pub fn damage_building(state: &mut SimulationState, building: BuildingId, damage: f64) -> bool {
    let Some(b) = state.buildings.get_mut(&building) else {
        return false;
    };
    b.health -= damage;
    if !b.is_destroyed() {
        return false;
    }
    let Some(b) = state.demolish_building(building) else {
        return false;
    };
    let now = state.now_ms;
    if b.kind == BuildingType::Wall {
        if let Some(owner) = state.kingdom_mut(b.owner) {
            owner.record_breach(b.position, now);
        }
        state.emit(SimEvent::WallBreached {
            kingdom: b.owner,
            coord: b.position,
        });
    } else {
        state.emit(SimEvent::BuildingDestroyed {
            kingdom: b.owner,
            kind: b.kind,
            coord: b.position,
        });
    }
    debug!(owner = b.owner, kind = %b.kind, x = b.position.x, y = b.position.y, "building destroyed");
    true
}

/// Hand everything `defeated` owns to `conqueror`.
///
/// Every tile changes hands. Non-wall buildings transfer, walls are kept
/// with a 50% chance and torn down otherwise. The conqueror takes half the
/// defeated treasury plus [`PLUNDER_BONUS`]. Returns the number of tiles
/// transferred.
pub fn claim_enemy_kingdom_territory<R: Rng + ?Sized>(
    state: &mut SimulationState,
    conqueror: KingdomId,
    defeated: KingdomId,
    rng: &mut R,
) -> usize {
    if conqueror == defeated || state.kingdom(conqueror).is_none_or(|k| !k.alive) {
        return 0;
    }
    let Some(loser) = state.kingdom(defeated).filter(|k| k.alive) else {
        return 0;
    };
    let old_capital = loser.capital;
    let faction = loser.faction;

    let owned: Vec<Coord> = state.map.tiles_owned_by(defeated).map(|(c, _)| c).collect();
    for coord in &owned {
        if let Some(tile) = state.map.get_mut(*coord) {
            tile.territory = Some(conqueror);
            if *coord == old_capital {
                tile.is_capital = false;
            }
        }
    }

    let holdings: Vec<(BuildingId, BuildingType, Coord)> = state
        .buildings
        .values()
        .filter(|b| b.owner == defeated)
        .map(|b| (b.id, b.kind, b.position))
        .collect();
    for (id, kind, position) in holdings {
        if kind == BuildingType::Wall && !rng.random_bool(WALL_CONVERSION_CHANCE) {
            state.demolish_building(id);
            continue;
        }
        if let Some(b) = state.buildings.get_mut(&id) {
            b.owner = conqueror;
        }
        if kind == BuildingType::Wall {
            if let Some(k) = state.kingdom_mut(conqueror) {
                k.wall_perimeter.insert(position);
            }
        }
    }

    let mut plunder = Cost::default();
    if let Some(loser) = state.kingdom_mut(defeated) {
        plunder = loser.resources.take_half();
        loser.eliminate();
    }
    if let Some(winner) = state.kingdom_mut(conqueror) {
        winner.resources.gain(plunder);
        winner.resources.gain(PLUNDER_BONUS);
    }
    state.units.retain(|_, u| u.kingdom != defeated);
    if faction != PLAYER_FACTION {
        state.diplomacy.mark_defeated(faction);
    }

    let prune = ScheduledEvent::PruneWalls { kingdom: conqueror };
    if !state.scheduler.contains(&prune) {
        let at = state.now_ms + territory::PRUNE_FOLLOWUP_MS;
        state.scheduler.schedule_at(at, prune);
    }

    info!(kingdom = defeated, by = conqueror, tiles = owned.len(), "kingdom conquered");
    state.emit(SimEvent::KingdomConquered {
        kingdom: defeated,
        by: conqueror,
        tiles: owned.len(),
    });
    owned.len()
}

/// Move every unit whose delay has elapsed.
pub fn advance_units<R: Rng + ?Sized>(state: &mut SimulationState, rng: &mut R) {
    let now = state.now_ms;
    let due: Vec<UnitId> = state
        .units
        .values()
        .filter(|u| u.next_move_at_ms <= now)
        .map(|u| u.id)
        .collect();

    for id in due {
        if !state.units.contains_key(&id) {
            continue;
        }
        advance_unit(state, id, rng);
        if let Some(u) = state.units.get_mut(&id) {
            let burst = u.behavior == Behavior::Aggressive && rng.random_bool(BURST_CHANCE);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
            let delay = if burst {
                (u.move_delay_ms as f64 * BURST_FACTOR).round() as u64
            } else {
                u.move_delay_ms
            };
            u.next_move_at_ms = now + delay.max(1);
        }
    }
}

fn advance_unit<R: Rng + ?Sized>(state: &mut SimulationState, id: UnitId, rng: &mut R) {
    let Some(u) = state.units.get(&id) else {
        return;
    };
    if u.is_gathering() {
        unit::advance_gathering(state, id, rng);
        return;
    }
    let path = u.attack_path;
    match path {
        Some(AttackTarget::Kingdom(target)) => advance_attack_path(state, id, target, rng),
        Some(AttackTarget::Player) => chase_player(state, id, rng),
        None => look_around(state, id, rng),
    }
}

fn jitter_chance(class: UnitClass) -> f64 {
    if class.is_soldier() { 0.05 } else { 0.10 }
}

/// Random passable step, or stay put.
fn random_step<R: Rng + ?Sized>(state: &mut SimulationState, id: UnitId, rng: &mut R) {
    let Some(u) = state.units.get(&id) else {
        return;
    };
    let (around, count) = u.position.surrounding(state.map.size());
    let options: Vec<Coord> = around[..usize::from(count)]
        .iter()
        .copied()
        .filter(|c| state.map.get(*c).is_some_and(|t| t.passable_for(u.kingdom)))
        .collect();
    if options.is_empty() {
        return;
    }
    let next = options[rng.random_range(0..options.len())];
    if let Some(u) = state.units.get_mut(&id) {
        u.position = next;
    }
}

/// Step toward `target` with occasional jitter. Returns `false` if blocked.
fn pursue<R: Rng + ?Sized>(state: &mut SimulationState, id: UnitId, target: Coord, rng: &mut R) -> bool {
    let Some(class) = state.units.get(&id).map(|u| u.class) else {
        return false;
    };
    if rng.random_bool(jitter_chance(class)) {
        random_step(state, id, rng);
        return true;
    }
    unit::step_unit_toward(state, id, target)
}

fn strike_unit<R: Rng + ?Sized>(state: &mut SimulationState, attacker: UnitId, target: UnitId, rng: &mut R) {
    let Some(a) = state.units.get(&attacker) else {
        return;
    };
    let Some(t) = state.units.get(&target) else {
        return;
    };
    let defenders = adjacent_defenders(state, t.position, t.kingdom, Some(target));
    let (kingdom, base) = (a.kingdom, a.attack);
    let damage = compute_damage(base, state.now_ms, defenders, rng);
    damage_unit(state, kingdom, target, damage, rng);
}

fn strike_player<R: Rng + ?Sized>(state: &mut SimulationState, attacker: UnitId, rng: &mut R) {
    let Some(base) = state.units.get(&attacker).map(|u| u.attack) else {
        return;
    };
    let defenders = adjacent_defenders(state, state.player.position, PLAYER_KINGDOM, None);
    let damage = compute_damage(base, state.now_ms, defenders, rng);
    damage_player(state, damage);
}

fn advance_attack_path<R: Rng + ?Sized>(state: &mut SimulationState, id: UnitId, target: KingdomId, rng: &mut R) {
    let Some(capital) = state.kingdom(target).filter(|k| k.alive).map(|k| k.capital) else {
        if let Some(u) = state.units.get_mut(&id) {
            u.reset();
        }
        return;
    };
    let Some(position) = state.units.get(&id).map(|u| u.position) else {
        return;
    };

    // Defenders first.
    let foe = state
        .units
        .values()
        .filter(|u| u.kingdom == target && u.position.touches(position))
        .map(|u| u.id)
        .next();
    if let Some(foe) = foe {
        strike_unit(state, id, foe, rng);
        return;
    }
    if target == PLAYER_KINGDOM && state.player.alive && state.player.position.touches(position) {
        strike_player(state, id, rng);
        return;
    }

    let arrived = position.distance(capital) <= 1.5;
    if !arrived && unit::step_unit_toward(state, id, capital) {
        return;
    }

    // Blocked or at the gates: hit the nearest structure of the target.
    let size = state.map.size();
    let (around, count) = position.surrounding(size);
    let structure = around[..usize::from(count)]
        .iter()
        .filter_map(|c| state.building_at(*c))
        .filter(|b| b.owner == target)
        .min_by(|a, b| {
            a.position
                .distance(capital)
                .total_cmp(&b.position.distance(capital))
                .then_with(|| a.id.cmp(&b.id))
        })
        .map(|b| b.id);
    let attack = state.units.get(&id).map_or(0.0, |u| u.attack);
    match structure {
        Some(building) => {
            damage_building(state, building, building_damage(attack));
        }
        None => {
            if let Some(u) = state.units.get_mut(&id) {
                u.reset();
            }
        }
    }
}

fn chase_player<R: Rng + ?Sized>(state: &mut SimulationState, id: UnitId, rng: &mut R) {
    let Some(u) = state.units.get(&id) else {
        return;
    };
    let range = aggression_distance(state.game_years(), u.class);
    let position = u.position;
    let player = state.player.position;
    if !state.player.alive || position.distance(player) > range * 1.5 {
        if let Some(u) = state.units.get_mut(&id) {
            u.reset();
        }
        return;
    }
    if position.touches(player) {
        strike_player(state, id, rng);
    } else if !pursue(state, id, player, rng) {
        if let Some(u) = state.units.get_mut(&id) {
            u.reset();
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Sighting {
    Player(Coord),
    Unit(UnitId, KingdomId, Coord),
}

fn look_around<R: Rng + ?Sized>(state: &mut SimulationState, id: UnitId, rng: &mut R) {
    let Some(me) = state.units.get(&id) else {
        return;
    };
    let range = aggression_distance(state.game_years(), me.class);
    let (kingdom, position) = (me.kingdom, me.position);

    let nearest_unit = state
        .units
        .values()
        .filter(|u| u.kingdom != kingdom)
        .map(|u| (u.position.distance(position), u))
        .filter(|(d, _)| *d <= range)
        .min_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)))
        .map(|(d, u)| (d, Sighting::Unit(u.id, u.kingdom, u.position)));
    let player = (kingdom != PLAYER_KINGDOM && state.player.alive)
        .then(|| (state.player.position.distance(position), Sighting::Player(state.player.position)))
        .filter(|(d, _)| *d <= range);

    let sighting = match (player, nearest_unit) {
        (Some(p), Some(u)) => Some(if p.0 <= u.0 { p.1 } else { u.1 }),
        (p, u) => p.or(u).map(|(_, s)| s),
    };

    let hostile = match sighting {
        Some(Sighting::Player(_)) => diplomacy::are_kingdoms_hostile(state, kingdom, PLAYER_KINGDOM, rng),
        Some(Sighting::Unit(_, other, _)) => diplomacy::are_kingdoms_hostile(state, kingdom, other, rng),
        None => false,
    };
    let Some(sighting) = sighting.filter(|_| hostile) else {
        wander(state, id, rng);
        return;
    };

    let threat = match sighting {
        Sighting::Player(at) | Sighting::Unit(_, _, at) => at,
    };
    if relative_strength(state, id) < FLEE_THRESHOLD {
        let size = state.map.size();
        let away = position.step_away(threat, size);
        if let Some(u) = state.units.get_mut(&id) {
            u.behavior = Behavior::Fleeing;
        }
        if away != position && state.map.get(away).is_some_and(|t| t.passable_for(kingdom)) {
            if let Some(u) = state.units.get_mut(&id) {
                u.position = away;
            }
        }
        return;
    }

    if let Some(u) = state.units.get_mut(&id) {
        u.behavior = Behavior::Aggressive;
    }
    match sighting {
        Sighting::Player(at) => {
            if let Some(u) = state.units.get_mut(&id) {
                u.attack_path = Some(AttackTarget::Player);
            }
            if position.touches(at) {
                strike_player(state, id, rng);
            } else {
                pursue(state, id, at, rng);
            }
        }
        Sighting::Unit(foe, _, at) => {
            if position.touches(at) {
                strike_unit(state, id, foe, rng);
            } else {
                pursue(state, id, at, rng);
            }
        }
    }
}

fn wander<R: Rng + ?Sized>(state: &mut SimulationState, id: UnitId, rng: &mut R) {
    let Some(u) = state.units.get_mut(&id) else {
        return;
    };
    u.behavior = Behavior::Idle;
    let kingdom = u.kingdom;
    if rng.random_bool(WANDER_CHANCE) {
        random_step(state, id, rng);
    } else if let Some(home) = state.kingdom(kingdom).map(|k| k.capital) {
        unit::step_unit_toward(state, id, home);
    }
}
