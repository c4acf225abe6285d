//! Bastion CLI - run, watch, batch and inspect kingdom simulations.

// Allow print in the CLI binary
#![allow(clippy::print_stdout, clippy::print_stderr)]

mod cli;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt};

/// Bastion - a deterministic kingdom and wall-enclosure simulation
#[derive(Parser, Debug)]
#[command(name = "bastion")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log debug events (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a single simulation and print a report
    Run {
        #[command(flatten)]
        world: cli::WorldArgs,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: cli::OutputFormat,

        /// Save a snapshot of the final state
        #[arg(long)]
        save: Option<PathBuf>,

        /// Print the final map
        #[arg(long)]
        map: bool,

        /// Suppress the preamble
        #[arg(short, long)]
        quiet: bool,
    },

    /// Interactive TUI to watch a simulation in real time
    Watch {
        #[command(flatten)]
        world: cli::WorldArgs,

        /// Start from a snapshot instead of a fresh world
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Frame delay in milliseconds (default: 100)
        #[arg(long, default_value = "100")]
        speed: u64,
    },

    /// Run many seeds in parallel and aggregate statistics
    Batch {
        #[command(flatten)]
        world: cli::WorldArgs,

        /// Number of simulations to run (default: 100)
        #[arg(short, long, default_value = "100")]
        games: u64,

        /// Parallel threads (default: CPU count)
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Output format: text, json, or csv
        #[arg(short, long, default_value = "text")]
        format: cli::BatchFormat,

        /// Show progress bar
        #[arg(short, long)]
        progress: bool,
    },

    /// Load a snapshot, repair it and check invariants
    Inspect {
        /// Snapshot file (.json)
        #[arg(required = true)]
        snapshot: PathBuf,

        /// Print the map
        #[arg(long)]
        map: bool,

        /// Write the repaired snapshot here
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "bastion=debug" } else { "bastion=warn" })
    });
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let result = match args.command {
        Commands::Run {
            world,
            format,
            save,
            map,
            quiet,
        } => cli::run::execute(&world, format, save.as_deref(), map, quiet),

        Commands::Watch {
            world,
            snapshot,
            speed,
        } => cli::watch::execute(&world, snapshot.as_deref(), speed),

        Commands::Batch {
            world,
            games,
            threads,
            format,
            progress,
        } => cli::batch::execute(&world, games, threads, format, progress),

        Commands::Inspect {
            snapshot,
            map,
            save,
        } => cli::inspect::execute(&snapshot, map, save.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
