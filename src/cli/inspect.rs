//! Inspect command implementation.

use super::CliError;
use bastion::game::check_invariants;
use bastion::render::{render_map, render_status};
use bastion::Snapshot;
use std::path::Path;

/// Execute the inspect command.
///
/// Loads a snapshot, applies the restore repairs, lists them and the
/// invariant check, then prints a summary.
///
/// # Errors
///
/// Returns an error if the snapshot cannot be read, restored or saved, or
/// if the restored state breaks an invariant.
pub(crate) fn execute(snapshot: &Path, map: bool, save: Option<&Path>) -> Result<(), CliError> {
    let loaded = Snapshot::load(snapshot)
        .map_err(|e| CliError::new(format!("Failed to read {}: {e}", snapshot.display())))?;
    let restored = loaded.restore()?;

    println!("Snapshot: {} (version {})", snapshot.display(), loaded.version);
    if restored.repairs.is_empty() {
        println!("Repairs: none");
    } else {
        println!("Repairs ({}):", restored.repairs.len());
        for repair in &restored.repairs {
            println!("  - {repair}");
        }
    }

    let violations = check_invariants(&restored.state);
    if violations.is_empty() {
        println!("Invariants: ok");
    } else {
        println!("Invariants: {} violated", violations.len());
        for v in &violations {
            println!("  - {v}");
        }
    }
    println!();
    print!("{}", render_status(&restored.state));
    if map {
        println!();
        print!("{}", render_map(&restored.state));
    }

    if let Some(path) = save {
        Snapshot::capture(&restored.state)
            .save(path)
            .map_err(|e| CliError::new(format!("Failed to save snapshot: {e}")))?;
        println!();
        println!("Repaired snapshot saved to: {}", path.display());
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(CliError::new("snapshot restores to an inconsistent state"))
    }
}
