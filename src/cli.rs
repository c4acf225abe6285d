//! CLI command implementations for Bastion.

pub(crate) mod batch;
pub(crate) mod inspect;
pub(crate) mod run;
pub(crate) mod watch;

mod output;

use bastion::SimulationConfig;
use clap::ValueEnum;
use std::error::Error;
use std::fmt;
use std::path::PathBuf;

/// Output format for the `run` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Output format for the `batch` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum BatchFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON output.
    Json,
    /// CSV format.
    Csv,
}

/// World options shared by every command that builds a simulation.
#[derive(Debug, Clone, clap::Args)]
pub(crate) struct WorldArgs {
    /// Random seed (default: random)
    #[arg(short, long)]
    pub(crate) seed: Option<u64>,

    /// Load simulation parameters from a JSON file
    #[arg(short, long)]
    pub(crate) config: Option<PathBuf>,

    /// Side length of the map
    #[arg(long)]
    pub(crate) map_size: Option<u16>,

    /// Number of kingdoms, player included (1-5)
    #[arg(short, long)]
    pub(crate) kingdoms: Option<usize>,

    /// Simulated seconds to run
    #[arg(short, long)]
    pub(crate) duration: Option<u64>,
}

impl WorldArgs {
    /// Seed to use, drawn from the clock if none was given.
    pub(crate) fn seed(&self) -> u64 {
        self.seed.unwrap_or_else(|| {
            use std::time::{SystemTime, UNIX_EPOCH};
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(42, |d| d.as_secs() ^ u64::from(d.subsec_nanos()))
        })
    }

    /// Config file (or defaults) with command-line overrides applied.
    pub(crate) fn config(&self) -> Result<SimulationConfig, CliError> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::load(path).map_err(|e| {
                CliError::new(format!("Failed to load {}: {e}", path.display()))
            })?,
            None => SimulationConfig::default(),
        };
        if let Some(size) = self.map_size {
            config.map_size = size;
        }
        if let Some(kingdoms) = self.kingdoms {
            config.max_kingdoms = kingdoms;
        }
        if let Some(seconds) = self.duration {
            config.duration_ms = seconds.saturating_mul(1000);
        }
        config.validate()?;
        Ok(config)
    }
}

/// CLI error type.
#[derive(Debug)]
pub(crate) struct CliError {
    message: String,
}

impl CliError {
    /// Create a new CLI error.
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.to_string())
    }
}

impl From<bastion::SimError> for CliError {
    fn from(e: bastion::SimError) -> Self {
        Self::new(e.to_string())
    }
}

impl From<bastion::SnapshotError> for CliError {
    fn from(e: bastion::SnapshotError) -> Self {
        Self::new(e.to_string())
    }
}
