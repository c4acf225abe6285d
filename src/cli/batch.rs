//! Batch command implementation.

// Batch reporting divides counts by elapsed time
#![allow(clippy::cast_precision_loss)]

use super::output::{BatchStats, JsonBatchResult, format_batch_csv, format_batch_text};
use super::{BatchFormat, CliError, WorldArgs};
use bastion::run_simulation;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::time::Instant;
use tracing::warn;

/// Execute the batch command.
///
/// # Errors
///
/// Returns an error if the config is invalid or output fails.
pub(crate) fn execute(
    world: &WorldArgs,
    games: u64,
    threads: Option<usize>,
    format: BatchFormat,
    progress: bool,
) -> Result<(), CliError> {
    let config = world.config()?;
    let base_seed = world.seed();

    // Set thread pool size if specified
    if let Some(num_threads) = threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .ok(); // Ignore error if already initialized
    }

    let pb = if progress {
        let pb = ProgressBar::new(games);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} runs ({per_sec})")
            .map_err(|e| CliError::new(format!("Invalid progress template: {e}")))?
            .progress_chars("=>-");
        pb.set_style(style);
        Some(pb)
    } else {
        None
    };

    let start = Instant::now();

    // Each rayon job folds into its own BatchStats; the partials merge at the end
    let stats = (0..games)
        .into_par_iter()
        .fold(BatchStats::default, |mut local, i| {
            let seed = base_seed.wrapping_add(i);
            match run_simulation(seed, &config) {
                Ok(report) => local.add_report(&report),
                Err(e) => {
                    warn!(seed, error = %e, "run failed to start");
                    local.add_failure();
                }
            }
            if let Some(pb) = &pb {
                pb.inc(1);
            }
            local
        })
        .reduce(BatchStats::default, |mut a, b| {
            a.merge(&b);
            a
        });

    if let Some(pb) = pb {
        pb.finish_with_message("done");
    }

    let duration = start.elapsed();
    let runs_per_sec = if duration.as_secs_f64() > 0.0 {
        stats.games_played as f64 / duration.as_secs_f64()
    } else {
        0.0
    };

    let kingdoms = config.max_kingdoms;
    match format {
        BatchFormat::Text => {
            println!();
            print!("{}", format_batch_text(&stats, kingdoms));
            println!();
            println!("Duration: {:.2}s ({runs_per_sec:.1} runs/sec)", duration.as_secs_f64());
        }
        BatchFormat::Json => {
            let json_result = JsonBatchResult::from_stats(&stats, kingdoms);
            let json = serde_json::to_string_pretty(&json_result)
                .map_err(|e| CliError::new(format!("JSON serialization failed: {e}")))?;
            println!("{json}");
        }
        BatchFormat::Csv => {
            print!("{}", format_batch_csv(&stats, kingdoms));
        }
    }

    Ok(())
}
