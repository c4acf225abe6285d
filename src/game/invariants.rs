//! Game invariants - sanity checks that detect bugs.
//!
//! Every operation that touches walls updates the tile flags, the building
//! registry and the owner's perimeter together. These checks should NEVER
//! trigger; if they do, some operation updated one side of a pair without
//! the other.

use std::collections::BTreeSet;
use std::fmt;

use crate::game::{BuildingType, Coord, SimulationState};

/// Invariant violation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    /// Description of the violated invariant.
    pub message: String,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invariant violation: {}", self.message)
    }
}

impl std::error::Error for InvariantViolation {}

fn violation(violations: &mut Vec<InvariantViolation>, message: String) {
    violations.push(InvariantViolation { message });
}

/// Check all game invariants.
///
/// Returns a list of violations found, or empty if all invariants hold.
#[must_use]
pub fn check_invariants(state: &SimulationState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    check_tiles(state, &mut violations);
    check_registry(state, &mut violations);
    check_perimeters(state, &mut violations);
    check_kingdoms(state, &mut violations);
    violations
}

fn check_tiles(state: &SimulationState, violations: &mut Vec<InvariantViolation>) {
    for (coord, tile) in state.map.iter() {
        if tile.is_wall {
            if tile.building.is_none_or(|b| b.kind != BuildingType::Wall) {
                violation(violations, format!("wall flag at {coord:?} without a wall building"));
            }
            if tile.territory.is_none() {
                violation(violations, format!("wall at {coord:?} has no owner"));
            }
        }
        if let Some(b) = tile.building {
            match state.buildings.get(&b.id) {
                Some(registered) if registered.position == coord && registered.kind == b.kind => {}
                _ => violation(
                    violations,
                    format!("tile {coord:?} references unregistered building {}", b.id),
                ),
            }
            if b.kind == BuildingType::Wall && !tile.is_wall {
                violation(violations, format!("wall building at {coord:?} without the wall flag"));
            }
        }
    }
}

fn check_registry(state: &SimulationState, violations: &mut Vec<InvariantViolation>) {
    for (id, building) in &state.buildings {
        if building.id != *id {
            violation(violations, format!("building {id} is keyed under the wrong id"));
        }
        let on_tile = state
            .map
            .get(building.position)
            .and_then(|t| t.building)
            .is_some_and(|b| b.id == *id);
        if !on_tile {
            violation(
                violations,
                format!("building {id} is missing from tile {:?}", building.position),
            );
        }
        if building.id >= state.next_building_id {
            violation(violations, format!("building {id} is not below the next id"));
        }
    }
    for (id, unit) in &state.units {
        if unit.id != *id || unit.id >= state.next_unit_id {
            violation(violations, format!("unit {id} has an inconsistent id"));
        }
        if !state.map.in_bounds(unit.position) {
            violation(violations, format!("unit {id} is off the grid"));
        }
        if unit.is_dead() {
            violation(violations, format!("unit {id} is dead but still registered"));
        }
        if state.kingdom(unit.kingdom).is_none_or(|k| !k.alive) {
            violation(
                violations,
                format!("unit {id} belongs to fallen kingdom {}", unit.kingdom),
            );
        }
    }
}

fn check_perimeters(state: &SimulationState, violations: &mut Vec<InvariantViolation>) {
    for kingdom in &state.kingdoms {
        let walls: BTreeSet<Coord> = state
            .map
            .iter()
            .filter(|(_, t)| t.is_wall_of(kingdom.id))
            .map(|(c, _)| c)
            .collect();
        if walls != kingdom.wall_perimeter {
            let missing = walls.difference(&kingdom.wall_perimeter).count();
            let stale = kingdom.wall_perimeter.difference(&walls).count();
            violation(
                violations,
                format!(
                    "kingdom {} perimeter out of sync: {missing} walls missing, {stale} stale entries",
                    kingdom.id
                ),
            );
        }
    }
}

fn check_kingdoms(state: &SimulationState, violations: &mut Vec<InvariantViolation>) {
    for (idx, kingdom) in state.kingdoms.iter().enumerate() {
        if usize::from(kingdom.id) != idx {
            violation(violations, format!("kingdom {} stored at index {idx}", kingdom.id));
        }
        if !kingdom.alive && state.map.count_territory(kingdom.id) > 0 {
            violation(violations, format!("fallen kingdom {} still owns tiles", kingdom.id));
        }
        if !state.map.in_bounds(kingdom.capital) {
            violation(violations, format!("kingdom {} capital is off the grid", kingdom.id));
        }
    }
}

/// Panic with every violation if any invariant fails.
///
/// # Panics
///
/// Panics when [`check_invariants`] reports anything.
pub fn assert_invariants(state: &SimulationState) {
    let violations = check_invariants(state);
    assert!(
        violations.is_empty(),
        "{}",
        violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::game::{Kingdom, Resources, UnitClass, territory};

    fn state() -> SimulationState {
        let mut state = SimulationState::new(SimulationConfig {
            map_size: 40,
            ..SimulationConfig::default()
        })
        .unwrap();
        state
            .kingdoms
            .push(Kingdom::new(0, 0, Coord::new(20, 20), Resources::new(50, 50, 50)));
        territory::generate_initial_walls(&mut state, 0);
        state
    }

    #[test]
    fn test_fresh_state_is_consistent() {
        let state = state();
        assert!(check_invariants(&state).is_empty());
        assert_invariants(&state);
    }

    #[test]
    fn test_detects_perimeter_drift() {
        let mut state = state();
        state.kingdoms[0].wall_perimeter.remove(&Coord::new(16, 16));
        let violations = check_invariants(&state);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("perimeter out of sync"));
    }

    #[test]
    fn test_detects_wall_flag_without_building() {
        let mut state = state();
        let tile = state.map.get_mut(Coord::new(2, 2)).unwrap();
        tile.is_wall = true;
        tile.territory = Some(0);
        let violations = check_invariants(&state);
        // Wall flag without building, plus the perimeter no longer matching.
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn test_detects_orphan_units_and_fallen_owners() {
        let mut state = state();
        state.spawn_unit(0, UnitClass::Warrior, Coord::new(20, 21));
        state.kingdoms[0].eliminate();
        let messages: Vec<String> = check_invariants(&state)
            .into_iter()
            .map(|v| v.message)
            .collect();
        assert!(messages.iter().any(|m| m.contains("fallen kingdom 0")));
        assert!(messages.iter().any(|m| m.contains("still owns tiles")));
    }

    #[test]
    #[should_panic(expected = "Invariant violation")]
    fn test_assert_panics() {
        let mut state = state();
        state.kingdoms[0].wall_perimeter.insert(Coord::new(0, 0));
        assert_invariants(&state);
    }
}
