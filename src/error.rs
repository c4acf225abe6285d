//! Error types for the simulation.
//!
//! Every [`GameError`] is locally recoverable: the rejected action has not
//! mutated any state, and the caller only needs to report the result.

use thiserror::Error;

use crate::game::{Coord, Cost, Resources};

/// Errors returned by wall, building, combat and diplomacy operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    /// Tile is occupied, out of range, or otherwise not allowed for the action.
    #[error("invalid placement at ({}, {}): {reason}", coord.x, coord.y)]
    InvalidPlacement {
        /// Tile that was rejected.
        coord: Coord,
        /// Why the tile was rejected.
        reason: &'static str,
    },
    /// Treasury cannot cover the cost. Nothing was charged.
    #[error("insufficient resources: need {needed}, have {available}")]
    InsufficientResources {
        /// Cost of the rejected action.
        needed: Cost,
        /// Treasury at the time of the check.
        available: Resources,
    },
    /// Action names a missing or ineligible kingdom, faction, unit or building.
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    /// Coordinate lies outside the grid.
    #[error("coordinate ({x}, {y}) is out of bounds")]
    OutOfBounds {
        /// Requested x.
        x: i32,
        /// Requested y.
        y: i32,
    },
}

impl GameError {
    /// Shorthand for [`GameError::InvalidPlacement`].
    #[must_use]
    pub const fn placement(coord: Coord, reason: &'static str) -> Self {
        Self::InvalidPlacement { coord, reason }
    }

    /// Shorthand for [`GameError::InvalidTarget`].
    #[must_use]
    pub fn target(message: impl Into<String>) -> Self {
        Self::InvalidTarget(message.into())
    }
}

/// Result alias for game operations.
pub type GameResult<T> = Result<T, GameError>;

/// Errors raised while saving or loading a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Reading or writing the snapshot file failed.
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// The snapshot is not valid JSON for the expected layout.
    #[error("snapshot is malformed: {0}")]
    Json(#[from] serde_json::Error),
    /// The snapshot was written by an unknown format version.
    #[error("unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),
    /// The snapshot describes a grid that cannot be built.
    #[error("invalid map size: {0}")]
    InvalidMapSize(u16),
}

/// Errors raised while setting up or running a headless simulation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    /// Configuration values are out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
