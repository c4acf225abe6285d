// Allow unwrap and unreadable literals in tests (test code is not production)
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::unreadable_literal))]
//! Bastion: a deterministic kingdom simulation built around wall enclosure.
//!
//! Kingdoms claim land by walling it off. Every wall placement runs an
//! enclosure pass, AI kingdoms gather, build, expand and raid, and a
//! diplomacy layer decides who fights whom. All randomness flows through an
//! injected RNG, so a seed fully determines a run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │    CLI (run / watch / batch)        │
//! ├─────────────────────────────────────┤
//! │    Runner, snapshots, rendering     │
//! ├─────────────────────────────────────┤
//! │    Game rules (SimulationState)     │
//! └─────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod game;
pub mod render;
pub mod sim;
pub mod snapshot;

pub use config::SimulationConfig;
pub use error::{GameError, GameResult, SimError, SnapshotError};

// Re-export key game types at crate root for convenience
pub use game::{
    Command, CommandOutcome, Coord, Kingdom, KingdomId, Map, Resources, SimEvent, Simulation,
    SimulationState, Tile,
};
pub use sim::{SimulationReport, new_simulation, run_simulation};
pub use snapshot::Snapshot;
