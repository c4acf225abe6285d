//! Game layer for Bastion.
//!
//! Implements the rules of the kingdom simulation:
//! - Square grid of tiles with terrain, resource nodes and territory
//! - Walls that enclose territory, with pruning of redundant segments
//! - Kingdom treasuries, buildings and units
//! - AI kingdoms, diplomacy and combat
//! - Scheduled events and the fixed-order tick loop

pub mod ai;
mod building;
pub mod combat;
pub mod command;
pub mod diplomacy;
mod invariants;
mod kingdom;
mod map;
mod schedule;
mod state;
pub mod territory;
pub mod unit;

pub use building::{Building, BuildingId, BuildingType, Cost};
pub use command::{Command, CommandOutcome, DiplomacyCommand};
pub use diplomacy::{
    Diplomacy, DiplomacyAction, DiplomacyEvent, DiplomacyOutcome, Faction, FactionId,
    PLAYER_FACTION, Relation, Treaty, TreatyId, TreatyType, YearReport,
};
pub use invariants::{InvariantViolation, assert_invariants, check_invariants};
pub use kingdom::{
    Kingdom, KingdomId, MAX_KINGDOMS, PLAYER_KINGDOM, ResourceKind, Resources, WallBreach,
};
pub use map::{Coord, Map, Resource, Terrain, Tile, TileBuilding};
pub use schedule::{ScheduledEvent, Scheduler};
pub use state::{AI_TICK_MS, PlayerAvatar, SimEvent, Simulation, SimulationState};
pub use territory::{EnclosureDetector, FloodFillDetector, WallPlacement};
pub use unit::{AttackTarget, Behavior, GatherTrip, Unit, UnitClass, UnitId};
