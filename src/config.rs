//! Simulation configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SnapshotError};
use crate::game::{MAX_KINGDOMS, Resources};

/// Tunable parameters for a simulation run.
///
/// Every field has a default, so a config file only needs the values it
/// changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Side length of the square grid.
    pub map_size: u16,
    /// Number of kingdoms including the player (1..=5).
    pub max_kingdoms: usize,
    /// Length of one simulation step in milliseconds.
    pub tick_ms: u64,
    /// Total simulated time for headless runs.
    pub duration_ms: u64,
    /// Simulated milliseconds per in-game year.
    pub year_ms: u64,
    /// Starting treasury of AI kingdoms.
    pub ai_resources: Resources,
    /// Starting treasury of the player kingdom.
    pub player_resources: Resources,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            map_size: 100,
            max_kingdoms: MAX_KINGDOMS,
            tick_ms: 100,
            duration_ms: 300_000,
            year_ms: 60_000,
            ai_resources: Resources::new(100, 100, 100),
            player_resources: Resources::new(200, 200, 200),
        }
    }
}

impl SimulationConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Check that the values describe a runnable simulation.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.map_size < 32 {
            return Err(SimError::InvalidConfig(format!(
                "map_size must be at least 32, got {}",
                self.map_size
            )));
        }
        if self.max_kingdoms == 0 || self.max_kingdoms > MAX_KINGDOMS {
            return Err(SimError::InvalidConfig(format!(
                "max_kingdoms must be in 1..={MAX_KINGDOMS}, got {}",
                self.max_kingdoms
            )));
        }
        if self.tick_ms == 0 || self.tick_ms > 1000 || 1000 % self.tick_ms != 0 {
            return Err(SimError::InvalidConfig(format!(
                "tick_ms must divide 1000, got {}",
                self.tick_ms
            )));
        }
        if self.year_ms == 0 {
            return Err(SimError::InvalidConfig("year_ms must be positive".to_string()));
        }
        Ok(())
    }
}
