//! Scenario tests for the wall and territory engine.
//!
//! Each test builds a small world by hand and drives the engine through a
//! concrete situation: initial rings, closing gaps, pruning, affordability
//! and hostility between allies.
//!
//! Run with: cargo test territory_scenarios

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use bastion::game::territory::{
    FloodFillDetector, generate_initial_walls, place_wall, prune_redundant_walls, remove_wall,
};
use bastion::game::diplomacy::are_kingdoms_hostile;
use bastion::game::{BuildingType, Faction, Kingdom, Resources, check_invariants};
use bastion::{Coord, GameError, SimulationConfig, SimulationState};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn world(size: u16) -> SimulationState {
    SimulationState::new(SimulationConfig {
        map_size: size,
        ..SimulationConfig::default()
    })
    .unwrap()
}

fn with_kingdom(mut state: SimulationState, capital: Coord, resources: Resources) -> SimulationState {
    let id = u8::try_from(state.kingdoms.len()).unwrap();
    state.kingdoms.push(Kingdom::new(id, id, capital, resources));
    state
}

fn interior(state: &SimulationState, kingdom: u8) -> usize {
    state
        .map
        .tiles_owned_by(kingdom)
        .filter(|(_, t)| !t.is_wall)
        .count()
}

#[test]
fn test_initial_ring_at_centre_of_100_grid() {
    let mut state = with_kingdom(world(100), Coord::new(50, 50), Resources::new(100, 100, 100));
    assert_eq!(generate_initial_walls(&mut state, 0), 28);

    let walls: Vec<Coord> = state
        .map
        .iter()
        .filter(|(_, t)| t.is_wall)
        .map(|(c, _)| c)
        .collect();
    assert_eq!(walls.len(), 28);
    assert!(walls.iter().all(|c| [46, 53].contains(&c.x) || [46, 53].contains(&c.y)));
    assert_eq!(interior(&state, 0), 36);
    assert_eq!(state.map.get(Coord::new(50, 50)).unwrap().territory, Some(0));
    assert!(check_invariants(&state).is_empty());
}

#[test]
fn test_closing_a_five_tile_gap_claims_the_interior() {
    let mut state = with_kingdom(world(100), Coord::new(50, 50), Resources::new(200, 200, 200));
    // A 10x10 ring on 20..=29 with (22..=26, 20) left open.
    let gap: Vec<Coord> = (22..=26).map(|x| Coord::new(x, 20)).collect();
    for i in 20..=29u16 {
        for c in [
            Coord::new(i, 20),
            Coord::new(i, 29),
            Coord::new(20, i),
            Coord::new(29, i),
        ] {
            let open = gap.contains(&c);
            let taken = state.map.get(c).unwrap().is_wall;
            if !open && !taken {
                state.register_building(BuildingType::Wall, 0, c);
            }
        }
    }
    assert_eq!(state.kingdoms[0].wall_perimeter.len(), 36 - gap.len());

    let (last, first) = gap.split_last().unwrap();
    for c in first {
        let placed = place_wall(&mut state, &FloodFillDetector, 0, *c).unwrap();
        assert_eq!(placed.claimed, 0, "ring is still open after {c:?}");
    }
    assert_eq!(interior(&state, 0), 0);

    let placed = place_wall(&mut state, &FloodFillDetector, 0, *last).unwrap();
    assert_eq!(placed.claimed, 64);
    assert!(placed.pruned.is_empty());
    assert_eq!(interior(&state, 0), 64);
    assert_eq!(state.kingdoms[0].resources, Resources::new(190, 185, 200));
    assert!(check_invariants(&state).is_empty());
}

#[test]
fn test_unaffordable_building_changes_nothing() {
    let mut state = with_kingdom(world(100), Coord::new(50, 50), Resources::new(100, 100, 100));
    generate_initial_walls(&mut state, 0);
    state.kingdoms[0].resources = Resources::new(25, 15, 100);
    let map = state.map.clone();
    let buildings = state.buildings.clone();

    let err = state
        .construct(0, BuildingType::House, Coord::new(48, 48))
        .unwrap_err();
    assert!(matches!(err, GameError::InsufficientResources { .. }));
    assert_eq!(state.kingdoms[0].resources, Resources::new(25, 15, 100));
    assert_eq!(state.map, map);
    assert_eq!(state.buildings, buildings);
    assert!(state.events.is_empty());
}

#[test]
fn test_unaffordable_wall_changes_nothing() {
    let mut state = with_kingdom(world(100), Coord::new(50, 50), Resources::new(100, 100, 100));
    generate_initial_walls(&mut state, 0);
    state.kingdoms[0].resources = Resources::new(1, 50, 0);
    let perimeter = state.kingdoms[0].wall_perimeter.clone();

    let err = place_wall(&mut state, &FloodFillDetector, 0, Coord::new(45, 50)).unwrap_err();
    assert!(matches!(err, GameError::InsufficientResources { .. }));
    assert_eq!(state.kingdoms[0].resources, Resources::new(1, 50, 0));
    assert_eq!(state.kingdoms[0].wall_perimeter, perimeter);
    assert!(!state.map.get(Coord::new(45, 50)).unwrap().is_wall);
}

#[test]
fn test_outer_ring_prunes_to_a_fixed_point() {
    let mut state = with_kingdom(world(100), Coord::new(50, 50), Resources::new(500, 500, 500));
    generate_initial_walls(&mut state, 0);
    // Outer ring on 45..=54 around the initial ring on 46..=53.
    let mut outer = Vec::new();
    for i in 45..=54u16 {
        outer.push(Coord::new(i, 45));
        outer.push(Coord::new(i, 54));
    }
    for i in 46..=53u16 {
        outer.push(Coord::new(45, i));
        outer.push(Coord::new(54, i));
    }
    for c in &outer {
        place_wall(&mut state, &FloodFillDetector, 0, *c).unwrap();
        assert!(check_invariants(&state).is_empty());
    }
    while !prune_redundant_walls(&mut state, 0).is_empty() {}

    let settled = state.clone();
    assert!(prune_redundant_walls(&mut state, 0).is_empty());
    assert_eq!(state.map, settled.map);
    assert_eq!(state.kingdoms, settled.kingdoms);
    assert_eq!(state.kingdoms[0].wall_perimeter.len(), outer.len());
    assert_eq!(interior(&state, 0), 64);
}

#[test]
fn test_removed_wall_keeps_its_land() {
    let mut state = with_kingdom(world(100), Coord::new(50, 50), Resources::new(100, 100, 100));
    generate_initial_walls(&mut state, 0);
    let at = Coord::new(46, 50);

    let refund = remove_wall(&mut state, 0, at).unwrap();
    assert_eq!(refund, BuildingType::Wall.refund());
    assert_eq!(state.kingdoms[0].resources, Resources::new(101, 101, 100));
    let tile = state.map.get(at).unwrap();
    assert!(!tile.is_wall);
    assert_eq!(tile.territory, Some(0));
    assert!(!state.kingdoms[0].wall_perimeter.contains(&at));
    assert!(check_invariants(&state).is_empty());

    assert!(remove_wall(&mut state, 0, at).is_err());
}

#[test]
fn test_allied_kingdoms_are_never_hostile() {
    let mut state = world(64);
    for (id, x) in [(0u8, 10u16), (1, 30), (2, 50)] {
        state = with_kingdom(state, Coord::new(x, 32), Resources::default());
        assert_eq!(state.kingdoms[usize::from(id)].id, id);
    }
    state.diplomacy.add_faction(Faction::new(0, "Player Realm", 50));
    state.diplomacy.add_faction(Faction::new(1, "Northern Tribe", 90));
    state.diplomacy.add_faction(Faction::new(2, "Eastern Empire", 80));

    let mut rng = ChaCha8Rng::seed_from_u64(11);
    for _ in 0..10_000 {
        assert!(!are_kingdoms_hostile(&state, 1, 2, &mut rng));
        assert!(!are_kingdoms_hostile(&state, 2, 1, &mut rng));
    }

    // Both enemies of the player: roughly 70% either way round.
    state.diplomacy.factions.get_mut(&1).unwrap().relation_value = 10;
    state.diplomacy.factions.get_mut(&2).unwrap().relation_value = 5;
    let trials = 20_000;
    let ab = (0..trials)
        .filter(|_| are_kingdoms_hostile(&state, 1, 2, &mut rng))
        .count();
    let ba = (0..trials)
        .filter(|_| are_kingdoms_hostile(&state, 2, 1, &mut rng))
        .count();
    for hits in [ab, ba] {
        assert!((13_000..15_000).contains(&hits), "{hits} of {trials}");
    }
}
