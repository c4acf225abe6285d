//! Deterministic world generation and kingdom placement.

// World generation uses intentional casts for coordinate/RNG operations
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use rand::Rng;
use tracing::{debug, warn};

use crate::config::SimulationConfig;
use crate::error::SimError;
use crate::game::{
    Coord, Faction, Kingdom, KingdomId, PLAYER_FACTION, PLAYER_KINGDOM, Resource, SimulationState,
    Terrain, TreatyType, UnitClass, territory, unit,
};

/// Share of tiles turned to desert.
const DESERT_SHARE: f64 = 0.10;

/// Resource node shares on non-edge tiles.
const TREE_SHARE: f64 = 0.06;
const STONE_SHARE: f64 = 0.03;
const BERRY_SHARE: f64 = 0.03;

/// Minimum capital distance between an AI kingdom and the player.
pub const MIN_PLAYER_DISTANCE: f64 = 40.0;

/// Minimum capital distance between two AI kingdoms.
pub const MIN_AI_DISTANCE: f64 = 50.0;

/// Placement attempts that follow the angular layout before falling back
/// to uniform sampling.
const ANGULAR_ATTEMPTS: usize = 50;

/// Total placement attempts per AI kingdom.
const MAX_ATTEMPTS: usize = 150;

/// Capitals must keep their wall ring at least one tile off the map edge.
const CAPITAL_MARGIN: u16 = 5;

/// Capitals closer than this (Chebyshev) would overlap wall rings.
const RING_CLEARANCE: u16 = 10;

/// Chance that two AI factions start in a military alliance.
const AI_ALLIANCE_CHANCE: f64 = 0.25;

/// Length of a starting AI alliance, in years.
const AI_ALLIANCE_YEARS: u32 = 10;

/// Starting relation range of AI factions toward the player.
const RELATION_RANGE: std::ops::RangeInclusive<u8> = 30..=70;

/// Faction names, indexed by faction id.
pub const FACTION_NAMES: [&str; 5] = [
    "Player Realm",
    "Northern Tribe",
    "Eastern Empire",
    "Southern Kingdom",
    "Western Clans",
];

/// Build an empty world with terrain and resource nodes.
///
/// # Errors
///
/// Returns [`SimError::InvalidConfig`] if the config does not validate.
pub fn generate_world<R: Rng + ?Sized>(config: &SimulationConfig, rng: &mut R) -> Result<SimulationState, SimError> {
    let mut state = SimulationState::new(*config)?;
    let size = state.map.size();
    for y in 0..size {
        for x in 0..size {
            let coord = Coord::new(x, y);
            let edge = state.map.is_edge(coord);
            let Some(tile) = state.map.get_mut(coord) else {
                continue;
            };
            if rng.random_bool(DESERT_SHARE) {
                tile.terrain = Terrain::Desert;
            }
            // The edge ring stays clear so enclosure fills always have a seed.
            if edge {
                continue;
            }
            let roll: f64 = rng.random();
            tile.resource = if roll < TREE_SHARE {
                Some(Resource::Tree)
            } else if roll < TREE_SHARE + STONE_SHARE {
                Some(Resource::Stone)
            } else if roll < TREE_SHARE + STONE_SHARE + BERRY_SHARE {
                Some(Resource::Berry)
            } else {
                None
            };
        }
    }
    Ok(state)
}

fn capital_range(size: u16) -> std::ops::RangeInclusive<u16> {
    CAPITAL_MARGIN..=size.saturating_sub(CAPITAL_MARGIN)
}

/// Clamp a point onto the band of legal capital tiles.
fn clamp_capital(x: f64, y: f64, size: u16) -> Coord {
    let range = capital_range(size);
    let lo = f64::from(*range.start());
    let hi = f64::from(*range.end());
    Coord::new(x.clamp(lo, hi).round() as u16, y.clamp(lo, hi).round() as u16)
}

/// How well a site satisfies the spacing rules: at least 1.0 when every
/// distance rule holds, `None` when its ring would collide with another.
fn site_score(site: Coord, player: Coord, others: &[Coord]) -> Option<f64> {
    if site.chebyshev(player) < RING_CLEARANCE || others.iter().any(|c| site.chebyshev(*c) < RING_CLEARANCE) {
        return None;
    }
    let player_ratio = site.distance(player) / MIN_PLAYER_DISTANCE;
    let ai_ratio = others
        .iter()
        .map(|c| site.distance(*c) / MIN_AI_DISTANCE)
        .fold(f64::INFINITY, f64::min);
    Some(player_ratio.min(ai_ratio))
}

/// Pick a capital for the `index`-th of `count` AI kingdoms.
///
/// Tries angle-distributed sites around the map centre first, then
/// uniform samples. The first site meeting every spacing rule wins;
/// otherwise the best-scoring site is returned. `None` only when every
/// sampled site would overlap an existing wall ring.
pub fn find_capital_site<R: Rng + ?Sized>(
    size: u16,
    player: Coord,
    others: &[Coord],
    index: usize,
    count: usize,
    rng: &mut R,
) -> Option<Coord> {
    let center = f64::from(size) / 2.0;
    let base_angle = std::f64::consts::TAU * index as f64 / count.max(1) as f64;
    let range = capital_range(size);
    let mut best: Option<(f64, Coord)> = None;

    for attempt in 0..MAX_ATTEMPTS {
        let site = if attempt < ANGULAR_ATTEMPTS {
            let angle = base_angle + rng.random_range(-0.25..0.25);
            let radius = f64::from(size) * rng.random_range(0.4..0.46);
            clamp_capital(center + radius * angle.cos(), center + radius * angle.sin(), size)
        } else {
            Coord::new(rng.random_range(range.clone()), rng.random_range(range.clone()))
        };
        let Some(score) = site_score(site, player, others) else {
            continue;
        };
        if score >= 1.0 {
            return Some(site);
        }
        if best.is_none_or(|(s, _)| score > s) {
            best = Some((score, site));
        }
    }
    best.map(|(score, site)| {
        debug!(x = site.x, y = site.y, score, "no site met spacing rules, taking best");
        site
    })
}

fn spawn_starting_units(state: &mut SimulationState, kingdom: KingdomId) {
    let Some(capital) = state.kingdom(kingdom).map(|k| k.capital) else {
        return;
    };
    let classes = [
        UnitClass::Peasant,
        UnitClass::Peasant,
        UnitClass::Peasant,
        UnitClass::Warrior,
        UnitClass::Archer,
    ];
    for class in classes {
        let spot = state.free_tile_near(capital, kingdom);
        state.spawn_unit(kingdom, class, spot);
    }
}

/// Create the player kingdom and up to `max_kingdoms - 1` AI kingdoms.
///
/// Every kingdom gets its wall ring, starting units and a faction bound to
/// it at creation. Returns the ids of the kingdoms created.
pub fn initialize_kingdoms<R: Rng + ?Sized>(state: &mut SimulationState, rng: &mut R) -> Vec<KingdomId> {
    let size = state.map.size();
    let player_capital = state.map.center();
    state.kingdoms.clear();
    state.kingdoms.push(Kingdom::new(
        PLAYER_KINGDOM,
        PLAYER_FACTION,
        player_capital,
        state.config.player_resources,
    ));
    state.player.position = player_capital;

    let ai_count = state.config.max_kingdoms.saturating_sub(1);
    let mut capitals: Vec<Coord> = Vec::with_capacity(ai_count);
    for index in 0..ai_count {
        let Some(site) = find_capital_site(size, player_capital, &capitals, index, ai_count, rng) else {
            warn!(index, "no room for another kingdom");
            break;
        };
        capitals.push(site);
        let id = state.kingdoms.len() as KingdomId;
        let mut kingdom = Kingdom::new(id, id, site, state.config.ai_resources);
        kingdom.expansion_rate = rng.random_range(0.8..1.5);
        state.kingdoms.push(kingdom);

        let name = FACTION_NAMES.get(usize::from(id)).copied().unwrap_or("Free Company");
        let relation = rng.random_range(RELATION_RANGE);
        state.diplomacy.add_faction(Faction::new(id, name, relation));
    }

    let ids: Vec<KingdomId> = state.kingdoms.iter().map(|k| k.id).collect();
    for &id in &ids {
        territory::generate_initial_walls(state, id);
        spawn_starting_units(state, id);
    }

    for (i, &a) in ids.iter().enumerate().skip(1) {
        for &b in &ids[i + 1..] {
            if rng.random_bool(AI_ALLIANCE_CHANCE) {
                state.diplomacy.sign(TreatyType::Alliance, a, b, AI_ALLIANCE_YEARS);
                debug!(a, b, "factions start allied");
            }
        }
    }

    for id in state.units_of(PLAYER_KINGDOM) {
        unit::dispatch_gatherer(state, id);
    }
    debug!(kingdoms = ids.len(), "kingdoms initialized");
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{BuildingType, Relation};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn world(seed: u64) -> SimulationState {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut state = generate_world(&SimulationConfig::default(), &mut rng).unwrap();
        initialize_kingdoms(&mut state, &mut rng);
        state
    }

    #[test]
    fn test_world_generation_determinism() {
        let a = world(42);
        let b = world(42);
        assert_eq!(a.map, b.map);
        let capitals = |s: &SimulationState| s.kingdoms.iter().map(|k| k.capital).collect::<Vec<_>>();
        assert_eq!(capitals(&a), capitals(&b));
        assert_eq!(a.diplomacy, b.diplomacy);
    }

    #[test]
    fn test_edges_stay_clear() {
        let state = world(3);
        for (coord, tile) in state.map.iter() {
            if state.map.is_edge(coord) {
                assert!(tile.resource.is_none());
            }
        }
        let nodes = state.map.iter().filter(|(_, t)| t.resource.is_some()).count();
        // Roughly 12% of the interior, minus the cleared wall boxes.
        assert!(nodes > 600 && nodes < 1800, "{nodes} resource nodes");
    }

    #[test]
    fn test_kingdoms_spaced_and_walled() {
        let state = world(7);
        assert_eq!(state.kingdoms.len(), 5);
        let player = state.kingdoms[0].capital;
        assert_eq!(player, state.map.center());
        for k in &state.kingdoms {
            assert_eq!(k.wall_perimeter.len(), 28);
            assert_eq!(state.building_count(k.id, BuildingType::Wall), 28);
            assert!(state.map.get(k.capital).unwrap().is_capital);
            assert_eq!(state.units_of(k.id).len(), 5);
            assert_eq!(state.soldier_count(k.id), 2);
            if !k.is_player() {
                assert!(k.capital.chebyshev(player) >= RING_CLEARANCE);
                assert!((0.8..1.5).contains(&k.expansion_rate));
            }
        }
        assert!(crate::game::check_invariants(&state).is_empty());
    }

    #[test]
    fn test_factions_bound_to_kingdoms() {
        let state = world(11);
        for k in state.kingdoms.iter().skip(1) {
            let faction = &state.diplomacy.factions[&k.faction];
            assert_eq!(faction.id, k.id);
            assert!(RELATION_RANGE.contains(&faction.relation_value));
            assert_eq!(faction.relation(), Relation::Neutral);
        }
        assert!(!state.diplomacy.factions.contains_key(&PLAYER_FACTION));
    }

    #[test]
    fn test_default_map_meets_spacing_rules() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let player = Coord::new(50, 50);
        let mut others = Vec::new();
        for i in 0..4 {
            let site = find_capital_site(100, player, &others, i, 4, &mut rng).unwrap();
            others.push(site);
        }
        for (i, a) in others.iter().enumerate() {
            assert!(a.distance(player) >= MIN_PLAYER_DISTANCE, "{a:?}");
            for b in &others[i + 1..] {
                assert!(a.distance(*b) >= MIN_AI_DISTANCE, "{a:?} {b:?}");
            }
        }
    }

    #[test]
    fn test_small_map_takes_best_effort_site() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let player = Coord::new(16, 16);
        let site = find_capital_site(32, player, &[], 0, 1, &mut rng).unwrap();
        assert!(site.chebyshev(player) >= RING_CLEARANCE);
        assert!(capital_range(32).contains(&site.x));
    }
}
