//! Output formatting utilities for CLI.

// Allow format! with push_str and float casts for readability
#![allow(clippy::format_push_string, clippy::cast_precision_loss)]

use bastion::game::MAX_KINGDOMS;
use bastion::sim::EventTally;
use bastion::SimulationReport;
use serde::Serialize;

/// Format a run report as human-readable text.
pub(super) fn format_text(report: &SimulationReport) -> String {
    let mut output = String::new();

    output.push_str(&format!("Simulation Result (seed: {})\n", report.seed));
    output.push_str(&format!(
        "  Elapsed: {:.1}s ({} years)\n",
        report.elapsed_ms as f64 / 1000.0,
        report.years
    ));
    output.push_str(&format!(
        "  Player: {}\n",
        if report.player_alive { "alive" } else { "defeated" }
    ));
    match report.leader.and_then(|id| report.kingdoms.iter().find(|k| k.id == id)) {
        Some(leader) => output.push_str(&format!("  Leader: {} ({})\n\n", leader.id, leader.name)),
        None => output.push_str("  Leader: none\n\n"),
    }

    for k in &report.kingdoms {
        output.push_str(&format!("  Kingdom {} ({})", k.id, k.name));
        if k.alive {
            output.push_str(&format!(
                ": {} tiles, {} walls, {} buildings, {} soldiers, {} units",
                k.territory, k.walls, k.buildings, k.soldiers, k.units
            ));
        } else {
            output.push_str(" [fallen]");
        }
        output.push('\n');
    }

    let e = &report.events;
    output.push_str("\nEvents:\n");
    output.push_str(&format!(
        "  {} tiles claimed, {} walls pruned, {} breached, {} repaired\n",
        e.tiles_claimed, e.walls_pruned, e.walls_breached, e.walls_repaired
    ));
    output.push_str(&format!(
        "  {} buildings, {} soldiers trained, {} units killed\n",
        e.buildings_placed, e.soldiers_trained, e.units_killed
    ));
    output.push_str(&format!(
        "  {} raids, {} conquests, {} diplomacy events\n",
        e.raids, e.conquests, e.diplomacy
    ));

    output
}

/// Aggregated statistics over many runs.
#[derive(Debug, Default)]
pub(super) struct BatchStats {
    /// Total runs completed.
    pub(super) games_played: u64,
    /// Runs that failed to start.
    pub(super) failures: u64,
    /// Runs the player avatar survived.
    player_survived: u64,
    /// Runs led by each kingdom id.
    leads: [u64; MAX_KINGDOMS],
    /// Runs each kingdom id survived.
    survivals: [u64; MAX_KINGDOMS],
    /// Territory summed per kingdom id.
    total_territory: [u64; MAX_KINGDOMS],
    /// Territory squared sums for std dev calculation.
    territory_sq_sums: [f64; MAX_KINGDOMS],
    /// Simulated time across all runs.
    total_elapsed_ms: u64,
    /// Event counts across all runs.
    events: EventTally,
}

impl BatchStats {
    /// Add a run report to the stats.
    pub(super) fn add_report(&mut self, report: &SimulationReport) {
        self.games_played += 1;
        self.total_elapsed_ms += report.elapsed_ms;
        if report.player_alive {
            self.player_survived += 1;
        }
        if let Some(slot) = report.leader.and_then(|id| self.leads.get_mut(usize::from(id))) {
            *slot += 1;
        }
        for k in &report.kingdoms {
            let idx = usize::from(k.id);
            if idx >= MAX_KINGDOMS {
                continue;
            }
            if k.alive {
                self.survivals[idx] += 1;
            }
            let territory = k.territory as u64;
            self.total_territory[idx] += territory;
            self.territory_sq_sums[idx] += (territory * territory) as f64;
        }
        self.events.merge(&report.events);
    }

    /// Record a run that could not be started.
    pub(super) fn add_failure(&mut self) {
        self.failures += 1;
    }

    /// Merge another accumulator into this one.
    pub(super) fn merge(&mut self, other: &BatchStats) {
        self.games_played += other.games_played;
        self.failures += other.failures;
        self.player_survived += other.player_survived;
        for i in 0..MAX_KINGDOMS {
            self.leads[i] += other.leads[i];
            self.survivals[i] += other.survivals[i];
            self.total_territory[i] += other.total_territory[i];
            self.territory_sq_sums[i] += other.territory_sq_sums[i];
        }
        self.total_elapsed_ms += other.total_elapsed_ms;
        self.events.merge(&other.events);
    }

    fn rate(&self, count: u64) -> f64 {
        if self.games_played == 0 {
            return 0.0;
        }
        count as f64 / self.games_played as f64
    }

    /// Share of runs led by a kingdom (0.0-1.0).
    pub(super) fn lead_rate(&self, idx: usize) -> f64 {
        self.rate(self.leads.get(idx).copied().unwrap_or(0))
    }

    /// Share of runs a kingdom survived (0.0-1.0).
    pub(super) fn survival_rate(&self, idx: usize) -> f64 {
        self.rate(self.survivals.get(idx).copied().unwrap_or(0))
    }

    /// Average final territory of a kingdom.
    pub(super) fn avg_territory(&self, idx: usize) -> f64 {
        self.rate(self.total_territory.get(idx).copied().unwrap_or(0))
    }

    /// Standard deviation of final territory.
    pub(super) fn territory_std_dev(&self, idx: usize) -> f64 {
        if self.games_played == 0 {
            return 0.0;
        }
        let n = self.games_played as f64;
        let mean = self.avg_territory(idx);
        let sq_sum = self.territory_sq_sums.get(idx).copied().unwrap_or(0.0);
        let variance = (sq_sum / n) - (mean * mean);
        if variance < 0.0 { 0.0 } else { variance.sqrt() }
    }

    /// Average simulated seconds per run.
    pub(super) fn avg_seconds(&self) -> f64 {
        self.rate(self.total_elapsed_ms) / 1000.0
    }
}

/// JSON-serializable batch result.
#[derive(Debug, Serialize)]
pub(super) struct JsonBatchResult {
    games_played: u64,
    failures: u64,
    player_survival_rate: f64,
    avg_seconds: f64,
    kingdoms: Vec<JsonBatchKingdom>,
    events: EventTally,
}

/// JSON-serializable per-kingdom batch stats.
#[derive(Debug, Serialize)]
pub(super) struct JsonBatchKingdom {
    kingdom: usize,
    lead_rate: f64,
    survival_rate: f64,
    avg_territory: f64,
    territory_std_dev: f64,
}

impl JsonBatchResult {
    /// Create from stats.
    pub(super) fn from_stats(stats: &BatchStats, kingdoms: usize) -> Self {
        Self {
            games_played: stats.games_played,
            failures: stats.failures,
            player_survival_rate: stats.rate(stats.player_survived),
            avg_seconds: stats.avg_seconds(),
            kingdoms: (0..kingdoms)
                .map(|i| JsonBatchKingdom {
                    kingdom: i,
                    lead_rate: stats.lead_rate(i),
                    survival_rate: stats.survival_rate(i),
                    avg_territory: stats.avg_territory(i),
                    territory_std_dev: stats.territory_std_dev(i),
                })
                .collect(),
            events: stats.events,
        }
    }
}

/// Format batch stats as human-readable text.
pub(super) fn format_batch_text(stats: &BatchStats, kingdoms: usize) -> String {
    let mut output = String::new();

    output.push_str(&format!("Batch Results ({} runs)\n", stats.games_played));
    output.push_str("========================================\n\n");
    if stats.failures > 0 {
        output.push_str(&format!("Failed to start: {}\n\n", stats.failures));
    }

    output.push_str(&format!(
        "Player survival: {:.1}%\n\n",
        stats.rate(stats.player_survived) * 100.0
    ));

    output.push_str("Kingdoms:\n");
    for i in 0..kingdoms {
        output.push_str(&format!(
            "  Kingdom {i}: leads {:.1}%, survives {:.1}%, territory {:.1} (+/- {:.1})\n",
            stats.lead_rate(i) * 100.0,
            stats.survival_rate(i) * 100.0,
            stats.avg_territory(i),
            stats.territory_std_dev(i)
        ));
    }

    let e = &stats.events;
    output.push_str(&format!(
        "\nTotals: {} tiles claimed, {} walls pruned, {} raids, {} conquests\n",
        e.tiles_claimed, e.walls_pruned, e.raids, e.conquests
    ));
    output.push_str(&format!("Average run length: {:.1}s\n", stats.avg_seconds()));

    output
}

/// Format batch stats as CSV.
pub(super) fn format_batch_csv(stats: &BatchStats, kingdoms: usize) -> String {
    let mut output = String::new();

    output.push_str("kingdom,lead_rate,survival_rate,avg_territory,territory_std_dev\n");
    for i in 0..kingdoms {
        output.push_str(&format!(
            "{},{:.4},{:.4},{:.2},{:.2}\n",
            i,
            stats.lead_rate(i),
            stats.survival_rate(i),
            stats.avg_territory(i),
            stats.territory_std_dev(i)
        ));
    }

    output
}
