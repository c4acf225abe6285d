//! Multi-step integration tests for the simulation.
//!
//! These tests drive generated worlds for simulated minutes and check
//! determinism, snapshot persistence and player commands end to end.
//!
//! Run with: cargo test --release simulation_integration

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use bastion::game::territory::check_wall_site;
use bastion::game::{DiplomacyCommand, PLAYER_KINGDOM, Relation, check_invariants};
use bastion::sim::{drive, new_simulation};
use bastion::{
    Command, CommandOutcome, Coord, SimulationConfig, Snapshot, run_simulation,
};

fn config(seconds: u64) -> SimulationConfig {
    SimulationConfig {
        map_size: 64,
        duration_ms: seconds * 1000,
        ..SimulationConfig::default()
    }
}

#[test]
fn test_same_seed_same_world() {
    let mut a = new_simulation(2024, &config(30)).unwrap();
    let mut b = new_simulation(2024, &config(30)).unwrap();
    let events_a = a.run_for(30_000);
    let events_b = b.run_for(30_000);

    assert_eq!(events_a, events_b);
    assert_eq!(a.state.map, b.state.map);
    assert_eq!(a.state.kingdoms, b.state.kingdoms);
    assert_eq!(a.state.units, b.state.units);
    assert_eq!(a.state.buildings, b.state.buildings);
}

#[test]
fn test_different_seeds_diverge() {
    let a = new_simulation(1, &config(1)).unwrap();
    let b = new_simulation(2, &config(1)).unwrap();
    assert_ne!(a.state.map, b.state.map);
}

#[test]
fn test_two_minute_run_holds_invariants() {
    let mut sim = new_simulation(77, &config(120)).unwrap();
    while sim.state.now_ms < 120_000 && !sim.state.is_game_over() {
        sim.step();
        if sim.state.now_ms % 10_000 == 0 {
            let violations = check_invariants(&sim.state);
            assert!(violations.is_empty(), "{violations:?}");
        }
    }
    assert_eq!(sim.state.years_elapsed, sim.state.game_years());
    for kingdom in sim.state.kingdoms.iter().filter(|k| k.alive) {
        assert!(sim.state.map.count_territory(kingdom.id) >= 36);
    }
}

#[test]
fn test_report_matches_state() {
    let report = run_simulation(5, &config(20)).unwrap();
    let mut sim = new_simulation(5, &config(20)).unwrap();
    let tally = drive(&mut sim, 20_000);

    assert_eq!(report.events, tally);
    assert_eq!(report.elapsed_ms, sim.state.now_ms);
    for k in &report.kingdoms {
        assert_eq!(k.territory, sim.state.map.count_territory(k.id));
        assert_eq!(k.walls, sim.state.kingdoms[usize::from(k.id)].wall_perimeter.len());
    }
}

#[test]
fn test_snapshot_file_round_trip() {
    let mut sim = new_simulation(31, &config(15)).unwrap();
    sim.run_for(15_000);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");
    Snapshot::capture(&sim.state).save(&path).unwrap();

    let restored = Snapshot::load(&path).unwrap().restore().unwrap();
    assert!(restored.repairs.is_empty(), "{:?}", restored.repairs);
    let state = restored.state;
    assert_eq!(state.map, sim.state.map);
    assert_eq!(state.buildings, sim.state.buildings);
    assert_eq!(state.diplomacy, sim.state.diplomacy);
    assert_eq!(state.now_ms, sim.state.now_ms);
    assert!(check_invariants(&state).is_empty());

    // A restored world keeps running.
    let mut resumed = bastion::Simulation::seeded(state, 31);
    resumed.run_for(5_000);
    assert!(check_invariants(&resumed.state).is_empty());
}

#[test]
fn test_corrupt_snapshot_is_repaired_on_load() {
    let sim = new_simulation(8, &config(1)).unwrap();
    let mut value = serde_json::to_value(Snapshot::capture(&sim.state)).unwrap();
    let kingdom = &mut value["kingdoms"][1];
    kingdom.as_object_mut().unwrap().remove("capital_x");
    kingdom.as_object_mut().unwrap().remove("resources");
    kingdom["expansion_rate"] = serde_json::json!(-2.0);
    kingdom["wall_perimeter"] = serde_json::json!([]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.json");
    std::fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();

    let restored = Snapshot::load(&path).unwrap().restore().unwrap();
    assert_eq!(restored.repairs.len(), 4);
    let k = &restored.state.kingdoms[1];
    assert_eq!(k.capital, sim.state.kingdoms[1].capital);
    assert_eq!(k.resources, sim.state.config.ai_resources);
    assert!((k.expansion_rate - 1.0).abs() < f64::EPSILON);
    assert_eq!(k.wall_perimeter, sim.state.kingdoms[1].wall_perimeter);
    assert!(check_invariants(&restored.state).is_empty());
}

#[test]
fn test_player_commands_drive_the_world() {
    let mut sim = new_simulation(12, &config(10)).unwrap();
    let capital = sim.state.kingdoms[usize::from(PLAYER_KINGDOM)].capital;

    // Wall off a tile just outside the starting ring.
    let site = (0..8)
        .flat_map(|i| {
            [
                Coord::new(capital.x - 5, capital.y - 4 + i),
                Coord::new(capital.x + 4, capital.y - 4 + i),
            ]
        })
        .find(|c| check_wall_site(&sim.state.map, PLAYER_KINGDOM, *c).is_ok())
        .unwrap();
    let before = sim.state.kingdoms[0].resources;
    let outcome = sim
        .execute(Command::PlaceWall {
            x: i32::from(site.x),
            y: i32::from(site.y),
        })
        .unwrap();
    assert!(matches!(outcome, CommandOutcome::WallPlaced(_)));
    assert!(sim.state.kingdoms[0].wall_perimeter.contains(&site));
    assert!(sim.state.kingdoms[0].resources.total() < before.total());

    // Walls can't go on top of walls, and a failed command charges nothing.
    let after = sim.state.kingdoms[0].resources;
    assert!(
        sim.execute(Command::PlaceWall {
            x: i32::from(site.x),
            y: i32::from(site.y),
        })
        .is_err()
    );
    assert_eq!(sim.state.kingdoms[0].resources, after);

    let outcome = sim
        .execute(Command::Diplomacy(DiplomacyCommand::DeclareWar { faction: 1 }))
        .unwrap();
    assert!(matches!(outcome, CommandOutcome::Diplomacy { .. }));
    assert_eq!(sim.state.diplomacy.relation(1), Some(Relation::Enemy));

    assert!(
        sim.execute(Command::MovePlayer { dx: 2, dy: 0 }).is_err(),
        "avatar moves one tile at a time"
    );
    sim.run_for(5_000);
    assert!(check_invariants(&sim.state).is_empty());
}
