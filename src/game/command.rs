//! Player commands.
//!
//! Commands arrive from outside the simulation with raw signed
//! coordinates, are validated, and are applied synchronously. A rejected
//! command leaves the state untouched.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GameError, GameResult};
use crate::game::{
    BuildingId, BuildingType, Coord, Cost, DiplomacyOutcome, FactionId, KingdomId,
    PLAYER_KINGDOM, Relation, SimEvent, Simulation, SimulationState, WallPlacement, ai, combat,
    territory, unit,
};

/// Most soldiers an ally sends on request.
pub const ASSISTANCE_SOLDIERS: usize = 3;

/// Diplomatic command addressed to a faction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DiplomacyCommand {
    /// Offer a trade agreement.
    ProposeTrade {
        /// Faction addressed.
        faction: FactionId,
    },
    /// Offer a military alliance.
    ProposeAlliance {
        /// Faction addressed.
        faction: FactionId,
    },
    /// Offer a ceasefire to an enemy.
    OfferCeasefire {
        /// Faction addressed.
        faction: FactionId,
    },
    /// Declare war.
    DeclareWar {
        /// Faction addressed.
        faction: FactionId,
    },
    /// Send part of the treasury as a gift.
    SendGift {
        /// Faction addressed.
        faction: FactionId,
        /// Resources handed over.
        gift: Cost,
    },
    /// Ask an ally to send soldiers against the nearest enemy.
    RequestMilitaryAssistance {
        /// Faction addressed.
        faction: FactionId,
    },
}

/// A command from the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Build a wall.
    PlaceWall {
        /// Column.
        x: i32,
        /// Row.
        y: i32,
    },
    /// Demolish one of the player's walls.
    RemoveWall {
        /// Column.
        x: i32,
        /// Row.
        y: i32,
    },
    /// Rebuild a breached wall.
    RepairWall {
        /// Column.
        x: i32,
        /// Row.
        y: i32,
    },
    /// Build a structure on own territory.
    BuildStructure {
        /// Kind of structure.
        kind: BuildingType,
        /// Column.
        x: i32,
        /// Row.
        y: i32,
    },
    /// Hit a foreign building next to the avatar.
    AttackBuilding {
        /// Column.
        x: i32,
        /// Row.
        y: i32,
    },
    /// Hit every foreign unit next to the avatar.
    AttackAdjacentUnits,
    /// Move the avatar one tile; harvests any node it lands on.
    MovePlayer {
        /// Column step in -1..=1.
        dx: i32,
        /// Row step in -1..=1.
        dy: i32,
    },
    /// Diplomatic action.
    Diplomacy(DiplomacyCommand),
}

/// Result of an accepted command, for UI feedback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// A wall went up.
    WallPlaced(WallPlacement),
    /// A wall came down.
    WallRemoved {
        /// Resources returned.
        refund: Cost,
    },
    /// A breach was closed.
    WallRepaired(WallPlacement),
    /// A structure went up.
    Built {
        /// Registry id of the structure.
        building: BuildingId,
    },
    /// A building was struck.
    BuildingHit {
        /// Whether the hit destroyed it.
        destroyed: bool,
    },
    /// Adjacent units were struck.
    UnitsHit {
        /// Units struck.
        hits: usize,
        /// Units killed.
        kills: usize,
    },
    /// The avatar moved.
    Moved {
        /// New tile.
        to: Coord,
        /// Resources harvested on arrival.
        harvested: u32,
    },
    /// A diplomatic action resolved.
    Diplomacy {
        /// What the counterpart decided.
        outcome: DiplomacyOutcome,
        /// Soldiers dispatched by an assisting ally.
        soldiers_sent: usize,
    },
}

fn coord(state: &SimulationState, x: i32, y: i32) -> GameResult<Coord> {
    state
        .map
        .checked_coord(x, y)
        .ok_or(GameError::OutOfBounds { x, y })
}

/// Kingdom bound to a faction.
#[must_use]
pub fn kingdom_of_faction(state: &SimulationState, faction: FactionId) -> Option<KingdomId> {
    state
        .kingdoms
        .iter()
        .find(|k| k.faction == faction)
        .map(|k| k.id)
}

/// Nearest living kingdom, from `from`, whose faction is at war with the
/// player.
#[must_use]
pub fn nearest_enemy_kingdom(state: &SimulationState, from: Coord) -> Option<KingdomId> {
    state
        .kingdoms
        .iter()
        .filter(|k| k.alive && !k.is_player())
        .filter(|k| state.diplomacy.relation(k.faction) == Some(Relation::Enemy))
        .min_by(|a, b| {
            a.capital
                .distance(from)
                .total_cmp(&b.capital.distance(from))
                .then(a.id.cmp(&b.id))
        })
        .map(|k| k.id)
}

impl<R: Rng> Simulation<R> {
    /// Validate and apply a player command.
    ///
    /// # Errors
    ///
    /// Any [`GameError`]; the state is unchanged when an error is returned.
    pub fn execute(&mut self, command: Command) -> GameResult<CommandOutcome> {
        let (state, detector, rng) = self.parts();
        if !state.player.alive {
            return Err(GameError::target("the player has fallen"));
        }
        let outcome = match command {
            Command::PlaceWall { x, y } => {
                let at = coord(state, x, y)?;
                CommandOutcome::WallPlaced(territory::place_wall(state, detector, PLAYER_KINGDOM, at)?)
            }
            Command::RemoveWall { x, y } => {
                let at = coord(state, x, y)?;
                CommandOutcome::WallRemoved {
                    refund: territory::remove_wall(state, PLAYER_KINGDOM, at)?,
                }
            }
            Command::RepairWall { x, y } => {
                let at = coord(state, x, y)?;
                CommandOutcome::WallRepaired(territory::repair_wall(state, detector, PLAYER_KINGDOM, at, rng)?)
            }
            Command::BuildStructure { kind, x, y } => {
                let at = coord(state, x, y)?;
                CommandOutcome::Built {
                    building: state.construct(PLAYER_KINGDOM, kind, at)?,
                }
            }
            Command::AttackBuilding { x, y } => {
                let at = coord(state, x, y)?;
                attack_building(state, at)?
            }
            Command::AttackAdjacentUnits => attack_adjacent_units(state, rng)?,
            Command::MovePlayer { dx, dy } => move_player(state, dx, dy, rng)?,
            Command::Diplomacy(action) => diplomacy(state, action, rng)?,
        };
        debug!(?command, "command applied");
        Ok(outcome)
    }
}

fn attack_building(state: &mut SimulationState, at: Coord) -> GameResult<CommandOutcome> {
    let Some(building) = state.building_at(at) else {
        return Err(GameError::target(format!("no building at ({}, {})", at.x, at.y)));
    };
    if building.owner == PLAYER_KINGDOM {
        return Err(GameError::target("cannot attack own building"));
    }
    if state.player.position.chebyshev(at) > 1 {
        return Err(GameError::target("building is out of reach"));
    }
    let id = building.id;
    let damage = combat::building_damage(state.player.attack);
    Ok(CommandOutcome::BuildingHit {
        destroyed: combat::damage_building(state, id, damage),
    })
}

fn attack_adjacent_units<R: Rng + ?Sized>(state: &mut SimulationState, rng: &mut R) -> GameResult<CommandOutcome> {
    let at = state.player.position;
    let targets: Vec<_> = state
        .units
        .values()
        .filter(|u| u.kingdom != PLAYER_KINGDOM && u.position.chebyshev(at) <= 1)
        .map(|u| (u.id, u.kingdom, u.position))
        .collect();
    if targets.is_empty() {
        return Err(GameError::target("no enemy units adjacent"));
    }
    let mut kills = 0;
    for (id, kingdom, position) in &targets {
        let defenders = combat::adjacent_defenders(state, *position, *kingdom, Some(*id));
        let damage = combat::compute_damage(state.player.attack, state.now_ms, defenders, rng);
        if combat::damage_unit(state, PLAYER_KINGDOM, *id, damage, rng) {
            kills += 1;
        }
    }
    Ok(CommandOutcome::UnitsHit {
        hits: targets.len(),
        kills,
    })
}

fn move_player<R: Rng + ?Sized>(state: &mut SimulationState, dx: i32, dy: i32, rng: &mut R) -> GameResult<CommandOutcome> {
    if !(-1..=1).contains(&dx) || !(-1..=1).contains(&dy) {
        return Err(GameError::target("the avatar moves one tile at a time"));
    }
    let from = state.player.position;
    let to = from
        .offset(dx, dy, state.map.size())
        .ok_or(GameError::OutOfBounds {
            x: i32::from(from.x) + dx,
            y: i32::from(from.y) + dy,
        })?;
    if !state.map.get(to).is_some_and(|t| t.passable_for(PLAYER_KINGDOM)) {
        return Err(GameError::placement(to, "blocked"));
    }
    state.player.position = to;
    let harvested = match state.kingdoms.get_mut(usize::from(PLAYER_KINGDOM)) {
        Some(kingdom) => unit::harvest_node(&mut state.map, to, &mut kingdom.resources, rng),
        None => 0,
    };
    Ok(CommandOutcome::Moved { to, harvested })
}

fn diplomacy<R: Rng + ?Sized>(
    state: &mut SimulationState,
    action: DiplomacyCommand,
    rng: &mut R,
) -> GameResult<CommandOutcome> {
    let mut soldiers_sent = 0;
    let outcome = match action {
        DiplomacyCommand::ProposeTrade { faction } => state.diplomacy.propose_trade(faction, rng)?,
        DiplomacyCommand::ProposeAlliance { faction } => state.diplomacy.propose_alliance(faction, rng)?,
        DiplomacyCommand::OfferCeasefire { faction } => {
            let ours = state.military_strength(PLAYER_KINGDOM);
            let theirs = kingdom_of_faction(state, faction).map_or(0.0, |k| state.military_strength(k));
            state.diplomacy.offer_ceasefire(faction, ours, theirs, rng)?
        }
        DiplomacyCommand::DeclareWar { faction } => state.diplomacy.declare_war(faction)?,
        DiplomacyCommand::SendGift { faction, gift } => {
            let Some(player) = state.kingdoms.get_mut(usize::from(PLAYER_KINGDOM)) else {
                return Err(GameError::target("no player kingdom"));
            };
            state
                .diplomacy
                .send_gift(faction, gift, &mut player.resources, rng)?
        }
        DiplomacyCommand::RequestMilitaryAssistance { faction } => {
            let outcome = state.diplomacy.request_military_assistance(faction, rng)?;
            if outcome.success {
                soldiers_sent = dispatch_assistance(state, faction);
            }
            outcome
        }
    };
    state
        .events
        .extend(outcome.events.iter().copied().map(SimEvent::Diplomacy));
    Ok(CommandOutcome::Diplomacy {
        outcome,
        soldiers_sent,
    })
}

/// Send up to [`ASSISTANCE_SOLDIERS`] idle soldiers of an ally at the
/// enemy kingdom nearest to them. Returns the number sent.
fn dispatch_assistance(state: &mut SimulationState, faction: FactionId) -> usize {
    let Some(ally) = kingdom_of_faction(state, faction) else {
        return 0;
    };
    let Some(home) = state.kingdom(ally).map(|k| k.capital) else {
        return 0;
    };
    let Some(target) = nearest_enemy_kingdom(state, home) else {
        return 0;
    };
    let mut soldiers = ai::idle_soldiers(state, ally);
    soldiers.truncate(ASSISTANCE_SOLDIERS);
    ai::send_attack(state, &soldiers, target);
    soldiers.len()
}
