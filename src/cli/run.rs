//! Run command implementation.

use super::output::format_text;
use super::{CliError, OutputFormat, WorldArgs};
use bastion::render::render_map;
use bastion::sim::{SimulationReport, drive, new_simulation};
use bastion::Snapshot;
use std::path::Path;

/// Execute the run command.
///
/// # Errors
///
/// Returns an error if the simulation cannot be built or saved.
pub(crate) fn execute(
    world: &WorldArgs,
    format: OutputFormat,
    save: Option<&Path>,
    map: bool,
    quiet: bool,
) -> Result<(), CliError> {
    let seed = world.seed();
    let config = world.config()?;

    if !quiet && format == OutputFormat::Text {
        println!("Running simulation with seed {seed}...");
        println!(
            "Map {}x{}, {} kingdoms, {}s",
            config.map_size,
            config.map_size,
            config.max_kingdoms,
            config.duration_ms / 1000
        );
        println!();
    }

    let mut sim = new_simulation(seed, &config)?;
    let tally = drive(&mut sim, config.duration_ms);
    let report = SimulationReport::from_state(seed, &sim.state, tally);

    if let Some(save_path) = save {
        Snapshot::capture(&sim.state)
            .save(save_path)
            .map_err(|e| CliError::new(format!("Failed to save snapshot: {e}")))?;
        if !quiet && format == OutputFormat::Text {
            println!("Snapshot saved to: {}", save_path.display());
            println!();
        }
    }

    match format {
        OutputFormat::Text => {
            print!("{}", format_text(&report));
            if map {
                println!();
                print!("{}", render_map(&sim.state));
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| CliError::new(format!("JSON serialization failed: {e}")))?;
            println!("{json}");
        }
    }

    Ok(())
}
