//! Plain-text rendering of a world.
//!
//! Used by `run --map`, `inspect` and the terminal viewer. Glyphs by
//! precedence:
//!
//! ```text
//! @        player avatar
//! p w a    peasant, warrior, archer
//! *        capital
//! #        wall
//! h b m t  house, barracks, mill, tower
//! T S B    tree, stone, berry node
//! 0-4      claimed land, by owner
//! . :      grass, desert
//! ```

// Allow format! with push_str for readability
#![allow(clippy::format_push_string)]

use std::collections::BTreeMap;

use crate::game::{
    BuildingType, Coord, DiplomacyEvent, KingdomId, Relation, Resource, SimEvent,
    SimulationState, Terrain, UnitClass,
};
use crate::sim::KingdomReport;

/// What a single grid cell looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    /// Character drawn for the cell.
    pub glyph: char,
    /// Kingdom the glyph belongs to, for colouring.
    pub owner: Option<KingdomId>,
}

/// Unit positions, indexed once per frame.
#[derive(Debug, Clone, Default)]
pub struct Occupancy {
    units: BTreeMap<Coord, (KingdomId, UnitClass)>,
}

impl Occupancy {
    /// Index every unit of `state`. Lower ids win shared tiles.
    #[must_use]
    pub fn of(state: &SimulationState) -> Self {
        let mut units = BTreeMap::new();
        for unit in state.units.values() {
            units.entry(unit.position).or_insert((unit.kingdom, unit.class));
        }
        Self { units }
    }
}

/// Resolve the cell at `coord`.
#[must_use]
pub fn cell_at(state: &SimulationState, occupancy: &Occupancy, coord: Coord) -> Cell {
    let Some(tile) = state.map.get(coord) else {
        return Cell { glyph: ' ', owner: None };
    };
    if state.player.alive && state.player.position == coord {
        return Cell { glyph: '@', owner: Some(0) };
    }
    if let Some((kingdom, class)) = occupancy.units.get(&coord) {
        let glyph = match class {
            UnitClass::Peasant => 'p',
            UnitClass::Warrior => 'w',
            UnitClass::Archer => 'a',
        };
        return Cell { glyph, owner: Some(*kingdom) };
    }
    let owner = tile.territory;
    if tile.is_capital {
        return Cell { glyph: '*', owner };
    }
    if let Some(building) = tile.building {
        let glyph = match building.kind {
            BuildingType::Wall => '#',
            BuildingType::House => 'h',
            BuildingType::Barracks => 'b',
            BuildingType::Mill => 'm',
            BuildingType::Tower => 't',
        };
        return Cell { glyph, owner };
    }
    if let Some(resource) = tile.resource {
        let glyph = match resource {
            Resource::Tree => 'T',
            Resource::Stone => 'S',
            Resource::Berry => 'B',
        };
        return Cell { glyph, owner };
    }
    if let Some(k) = owner {
        let glyph = char::from_digit(u32::from(k), 10).unwrap_or('?');
        return Cell { glyph, owner };
    }
    let glyph = match tile.terrain {
        Terrain::Grass => '.',
        Terrain::Desert => ':',
    };
    Cell { glyph, owner: None }
}

/// Render the whole grid, one line per row.
#[must_use]
pub fn render_map(state: &SimulationState) -> String {
    let size = state.map.size();
    let occupancy = Occupancy::of(state);
    let mut output = String::with_capacity(usize::from(size) * (usize::from(size) + 1));
    for y in 0..size {
        for x in 0..size {
            output.push(cell_at(state, &occupancy, Coord::new(x, y)).glyph);
        }
        output.push('\n');
    }
    output
}

fn relation_label(relation: Option<Relation>) -> &'static str {
    match relation {
        Some(Relation::Ally) => "ally",
        Some(Relation::Truce) => "truce",
        Some(Relation::Neutral) => "neutral",
        Some(Relation::Enemy) => "enemy",
        None => "-",
    }
}

/// Render a status summary: clock, avatar, then one block per kingdom.
///
/// ```text
/// === 0:42 (year 0) ===
/// Player avatar at (50, 50), health 150
///
/// [0] Player Realm
///     territory 64, walls 28, buildings 0, soldiers 2, units 5
///     wood 200, stone 200, food 200
/// [1] Northern Tribe (enemy)
/// ...
/// ```
#[must_use]
pub fn render_status(state: &SimulationState) -> String {
    let mut output = String::new();
    let seconds = state.now_ms / 1000;
    output.push_str(&format!(
        "=== {}:{:02} (year {}) ===\n",
        seconds / 60,
        seconds % 60,
        state.game_years()
    ));
    let player = &state.player;
    if player.alive {
        output.push_str(&format!(
            "Player avatar at ({}, {}), health {:.0}\n\n",
            player.position.x, player.position.y, player.health
        ));
    } else {
        output.push_str("Player avatar DEFEATED\n\n");
    }

    for kingdom in &state.kingdoms {
        let Some(report) = KingdomReport::from_state(state, kingdom.id) else {
            continue;
        };
        output.push_str(&format!("[{}] {}", report.id, report.name));
        if !kingdom.is_player() {
            let relation = state.diplomacy.relation(kingdom.faction);
            output.push_str(&format!(" ({})", relation_label(relation)));
        }
        if !report.alive {
            output.push_str(" - FALLEN\n");
            continue;
        }
        output.push('\n');
        output.push_str(&format!(
            "    territory {}, walls {}, buildings {}, soldiers {}, units {}\n",
            report.territory, report.walls, report.buildings, report.soldiers, report.units
        ));
        output.push_str(&format!(
            "    wood {}, stone {}, food {}\n",
            report.resources.wood, report.resources.stone, report.resources.food
        ));
        if !kingdom.walls_to_repair.is_empty() {
            output.push_str(&format!("    breaches {}\n", kingdom.walls_to_repair.len()));
        }
    }

    let treaties = &state.diplomacy.treaties;
    if !treaties.is_empty() {
        output.push_str(&format!("\nTreaties: {}\n", treaties.len()));
    }
    output
}

/// One-line description of an event for logs, or `None` for routine ones.
#[must_use]
pub fn describe_event(event: &SimEvent) -> Option<String> {
    let text = match event {
        SimEvent::TerritoryClaimed { kingdom, tiles } => {
            format!("kingdom {kingdom} enclosed {tiles} tiles")
        }
        SimEvent::WallBreached { kingdom, coord } => {
            format!("wall of kingdom {kingdom} breached at ({}, {})", coord.x, coord.y)
        }
        SimEvent::BuildingPlaced { kingdom, kind, .. } if *kind != BuildingType::Wall => {
            format!("kingdom {kingdom} built a {kind}")
        }
        SimEvent::BuildingDestroyed { kingdom, kind, .. } => {
            format!("{kind} of kingdom {kingdom} destroyed")
        }
        SimEvent::RaidLaunched { kingdom, target, soldiers } => {
            format!("kingdom {kingdom} raids kingdom {target} with {soldiers} soldiers")
        }
        SimEvent::KingdomConquered { kingdom, by, tiles } => {
            format!("kingdom {kingdom} fell to kingdom {by} ({tiles} tiles)")
        }
        SimEvent::PlayerDefeated => "the player has fallen".to_string(),
        SimEvent::Diplomacy(DiplomacyEvent::TreatySigned { kind, .. }) => {
            format!("{kind:?} treaty signed")
        }
        SimEvent::Diplomacy(DiplomacyEvent::TreatyEnded { kind, .. }) => {
            format!("{kind:?} treaty ended")
        }
        SimEvent::Diplomacy(DiplomacyEvent::JoinedWar { faction }) => {
            format!("faction {faction} joins the war")
        }
        SimEvent::Diplomacy(DiplomacyEvent::AssistancePledged { faction }) => {
            format!("faction {faction} pledges soldiers")
        }
        _ => return None,
    };
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::game::{Faction, Kingdom, Resources, territory};

    fn state() -> SimulationState {
        let mut state = SimulationState::new(SimulationConfig {
            map_size: 40,
            ..SimulationConfig::default()
        })
        .unwrap();
        state
            .kingdoms
            .push(Kingdom::new(0, 0, Coord::new(10, 10), Resources::new(1, 2, 3)));
        territory::generate_initial_walls(&mut state, 0);
        state
    }

    fn count(text: &str, glyph: char) -> usize {
        text.chars().filter(|c| *c == glyph).count()
    }

    #[test]
    fn test_map_shows_ring_and_interior() {
        let map = render_map(&state());
        assert_eq!(map.lines().count(), 40);
        assert!(map.lines().all(|l| l.chars().count() == 40));
        assert_eq!(count(&map, '#'), 28);
        assert_eq!(count(&map, '*'), 1);
        assert_eq!(count(&map, '0'), 35);
        assert_eq!(count(&map, '@'), 1);
    }

    #[test]
    fn test_precedence() {
        let mut state = state();
        let at = Coord::new(11, 11);
        state.spawn_unit(0, UnitClass::Archer, at);
        state.map.get_mut(Coord::new(30, 30)).unwrap().resource = Some(Resource::Stone);
        state.map.get_mut(Coord::new(31, 30)).unwrap().terrain = Terrain::Desert;

        let occupancy = Occupancy::of(&state);
        assert_eq!(cell_at(&state, &occupancy, at), Cell { glyph: 'a', owner: Some(0) });
        assert_eq!(cell_at(&state, &occupancy, Coord::new(30, 30)).glyph, 'S');
        assert_eq!(cell_at(&state, &occupancy, Coord::new(31, 30)).glyph, ':');
        assert_eq!(cell_at(&state, &occupancy, Coord::new(6, 6)).glyph, '#');
        assert_eq!(cell_at(&state, &occupancy, Coord::new(99, 0)).glyph, ' ');

        state.player.position = at;
        assert_eq!(cell_at(&state, &occupancy, at).glyph, '@');
    }

    #[test]
    fn test_status_lists_kingdoms() {
        let mut state = state();
        state.diplomacy.add_faction(Faction::new(0, "Player Realm", 50));
        let status = render_status(&state);
        assert!(status.starts_with("=== 0:00 (year 0) ==="));
        assert!(status.contains("[0] Player Realm"));
        assert!(status.contains("territory 64, walls 28"));
        assert!(status.contains("wood 1, stone 2, food 3"));

        state.kingdoms[0].eliminate();
        state.player.alive = false;
        let status = render_status(&state);
        assert!(status.contains("DEFEATED"));
    }

    #[test]
    fn test_describe_event_skips_routine() {
        let claim = SimEvent::TerritoryClaimed { kingdom: 2, tiles: 9 };
        assert_eq!(describe_event(&claim).as_deref(), Some("kingdom 2 enclosed 9 tiles"));
        let wall = SimEvent::BuildingPlaced {
            kingdom: 1,
            kind: BuildingType::Wall,
            coord: Coord::new(3, 3),
        };
        assert_eq!(describe_event(&wall), None);
        let pruned = SimEvent::WallsPruned { kingdom: 1, count: 2 };
        assert_eq!(describe_event(&pruned), None);
    }
}
