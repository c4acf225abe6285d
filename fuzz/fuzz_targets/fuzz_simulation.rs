#![no_main]

use arbitrary::Arbitrary;
use bastion::game::{BuildingType, Command, Cost, DiplomacyCommand, check_invariants};
use bastion::sim::new_simulation;
use bastion::SimulationConfig;
use libfuzzer_sys::fuzz_target;

/// A player action or a stretch of simulated time.
#[derive(Arbitrary, Debug)]
enum Action {
    Wall { x: i8, y: i8 },
    Demolish { x: i8, y: i8 },
    Build { kind: u8, x: i8, y: i8 },
    Move { dx: i8, dy: i8 },
    Fight,
    War { faction: u8 },
    Ally { faction: u8 },
    Gift { faction: u8, wood: u8 },
    /// Advance by this many AI ticks.
    Wait(u8),
}

/// Structured input for simulation fuzzing.
#[derive(Arbitrary, Debug)]
struct SimInput {
    seed: u64,
    kingdoms: u8,
    actions: Vec<Action>,
}

const KINDS: [BuildingType; 4] = [
    BuildingType::House,
    BuildingType::Barracks,
    BuildingType::Mill,
    BuildingType::Tower,
];

fuzz_target!(|input: SimInput| {
    let config = SimulationConfig {
        map_size: 48,
        max_kingdoms: 1 + usize::from(input.kingdoms % 5),
        ..SimulationConfig::default()
    };
    let Ok(mut sim) = new_simulation(input.seed, &config) else {
        return;
    };

    // Commands are relative to the capital so most of them land near home
    let home = sim.state.kingdoms[0].capital;
    let at = |dx: i8, dy: i8| {
        (
            i32::from(home.x) + i32::from(dx % 12),
            i32::from(home.y) + i32::from(dy % 12),
        )
    };

    for action in input.actions.iter().take(64) {
        let command = match *action {
            Action::Wall { x, y } => {
                let (x, y) = at(x, y);
                Command::PlaceWall { x, y }
            }
            Action::Demolish { x, y } => {
                let (x, y) = at(x, y);
                Command::RemoveWall { x, y }
            }
            Action::Build { kind, x, y } => {
                let (x, y) = at(x, y);
                let kind = KINDS[usize::from(kind) % KINDS.len()];
                Command::BuildStructure { kind, x, y }
            }
            Action::Move { dx, dy } => Command::MovePlayer {
                dx: i32::from(dx),
                dy: i32::from(dy),
            },
            Action::Fight => Command::AttackAdjacentUnits,
            Action::War { faction } => Command::Diplomacy(DiplomacyCommand::DeclareWar { faction }),
            Action::Ally { faction } => {
                Command::Diplomacy(DiplomacyCommand::ProposeAlliance { faction })
            }
            Action::Gift { faction, wood } => Command::Diplomacy(DiplomacyCommand::SendGift {
                faction,
                gift: Cost::new(u32::from(wood), 0, 0),
            }),
            Action::Wait(ticks) => {
                for _ in 0..ticks % 16 {
                    sim.step();
                }
                let violations = check_invariants(&sim.state);
                assert!(violations.is_empty(), "after {action:?}: {violations:?}");
                continue;
            }
        };

        let before = sim.state.kingdoms[0].resources;
        if sim.execute(command).is_err() {
            assert_eq!(sim.state.kingdoms[0].resources, before, "rejected {command:?} was charged");
        }
        let violations = check_invariants(&sim.state);
        assert!(violations.is_empty(), "after {command:?}: {violations:?}");
    }
});
