#![no_main]

use arbitrary::Arbitrary;
use bastion::game::territory::{
    FloodFillDetector, generate_initial_walls, place_wall, prune_redundant_walls, remove_wall,
};
use bastion::game::{Kingdom, Resources, check_invariants};
use bastion::{Coord, SimulationConfig, SimulationState};
use libfuzzer_sys::fuzz_target;

const SIZE: u16 = 32;

/// One engine operation, with coordinates folded onto the grid.
#[derive(Arbitrary, Debug)]
enum WallOp {
    Place { x: u8, y: u8 },
    Remove { x: u8, y: u8 },
    Prune,
}

/// Structured input for wall fuzzing.
#[derive(Arbitrary, Debug)]
struct WallInput {
    /// Capital position of the first kingdom.
    capital: (u8, u8),
    /// Starting wood.
    wood: u16,
    /// Starting stone.
    stone: u16,
    /// Whether a second kingdom shares the map.
    rival: bool,
    ops: Vec<WallOp>,
}

fn coord(x: u8, y: u8) -> Coord {
    Coord::new(u16::from(x) % SIZE, u16::from(y) % SIZE)
}

fuzz_target!(|input: WallInput| {
    let Ok(mut state) = SimulationState::new(SimulationConfig {
        map_size: SIZE,
        ..SimulationConfig::default()
    }) else {
        return;
    };

    let capital = coord(input.capital.0, input.capital.1);
    let resources = Resources::new(u32::from(input.wood), u32::from(input.stone), 0);
    state.kingdoms.push(Kingdom::new(0, 0, capital, resources));
    generate_initial_walls(&mut state, 0);
    if input.rival {
        let far = Coord::new((capital.x + SIZE / 2) % SIZE, (capital.y + SIZE / 2) % SIZE);
        state.kingdoms.push(Kingdom::new(1, 1, far, resources));
        generate_initial_walls(&mut state, 1);
    }

    // Cap ops to keep each run short
    for (i, op) in input.ops.iter().take(200).enumerate() {
        let kingdom = if input.rival { (i % 2) as u8 } else { 0 };
        let before = state.kingdoms[usize::from(kingdom)].resources;
        let failed = match *op {
            WallOp::Place { x, y } => {
                place_wall(&mut state, &FloodFillDetector, kingdom, coord(x, y)).is_err()
            }
            WallOp::Remove { x, y } => remove_wall(&mut state, kingdom, coord(x, y)).is_err(),
            WallOp::Prune => {
                prune_redundant_walls(&mut state, kingdom);
                false
            }
        };
        if failed {
            assert_eq!(
                state.kingdoms[usize::from(kingdom)].resources,
                before,
                "rejected {op:?} was charged"
            );
        }

        let violations = check_invariants(&state);
        assert!(violations.is_empty(), "after {op:?}: {violations:?}");
    }
});
