use serde::{Deserialize, Serialize};
use tracing::info;

use crate::rules::{PrimarySet, ReasonSet};
use crate::solver::{SolveOutcome, SolveResult};
use crate::types::{CellCoord, Table};

/// Final per-cell publication status.
///
/// Transitions are one-directional within a run: a cell goes from visible
/// to primary- or secondary-suppressed, never both, never back.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reasons", rename_all = "snake_case")]
pub enum SuppressionStatus {
    Visible,
    PrimarySuppressed(ReasonSet),
    SecondarySuppressed,
}

impl SuppressionStatus {
    pub fn is_suppressed(&self) -> bool {
        !matches!(self, SuppressionStatus::Visible)
    }
}

/// A published cell value: either the original number or the suppression
/// sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MaskedValue {
    Value(f64),
    Suppressed,
}

/// Aggregate counts derived from the status grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuppressionStats {
    pub total_cells: usize,
    pub empty_cells: usize,
    pub primary_count: usize,
    pub secondary_count: usize,
    /// Fraction of all cells suppressed, in [0, 1]
    pub suppression_rate: f64,
    /// Summed protection gap over groups that ran out of candidates
    pub shortfall_cells: usize,
}

/// The immutable result of one suppression run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuppressionPlan {
    rows: usize,
    cols: usize,
    statuses: Vec<SuppressionStatus>,
    masked: Vec<MaskedValue>,
    pub outcome: SolveOutcome,
    pub stats: SuppressionStats,
}

impl SuppressionPlan {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn status(&self, row: usize, col: usize) -> SuppressionStatus {
        self.statuses[row * self.cols + col]
    }

    pub fn masked(&self, row: usize, col: usize) -> MaskedValue {
        self.masked[row * self.cols + col]
    }

    /// Iterate statuses in row-major order with their coordinates
    pub fn iter_statuses(&self) -> impl Iterator<Item = (CellCoord, SuppressionStatus)> + '_ {
        self.statuses
            .iter()
            .enumerate()
            .map(move |(i, &status)| (CellCoord::new(i / self.cols, i % self.cols), status))
    }
}

/// Merge the primary and secondary sets into the final plan.
///
/// Pure: counts statuses and builds a masked copy of the table without
/// touching the input. The two sets are disjoint by construction; overlap
/// or a suppressed empty cell would be a programming bug upstream.
pub fn assemble(table: &Table, primary: &PrimarySet, solve: &SolveResult) -> SuppressionPlan {
    let mut statuses = Vec::with_capacity(table.cell_count());
    let mut masked = Vec::with_capacity(table.cell_count());
    let mut empty_cells = 0;

    for (coord, cell) in table.iter() {
        if cell.is_empty() {
            empty_cells += 1;
        }
        let status = if let Some(&reasons) = primary.get(&coord) {
            SuppressionStatus::PrimarySuppressed(reasons)
        } else if solve.secondary.contains(&coord) {
            SuppressionStatus::SecondarySuppressed
        } else {
            SuppressionStatus::Visible
        };
        debug_assert!(
            !(cell.is_empty() && status.is_suppressed()),
            "empty cell {:?} must never be suppressed",
            coord
        );
        masked.push(match status {
            SuppressionStatus::Visible => MaskedValue::Value(cell.value()),
            _ => MaskedValue::Suppressed,
        });
        statuses.push(status);
    }

    let total_cells = table.cell_count();
    let primary_count = primary.len();
    let secondary_count = solve.secondary.len();
    let stats = SuppressionStats {
        total_cells,
        empty_cells,
        primary_count,
        secondary_count,
        suppression_rate: (primary_count + secondary_count) as f64 / total_cells as f64,
        shortfall_cells: solve.shortfalls.iter().map(|s| s.missing).sum(),
    };
    info!(
        primary = primary_count,
        secondary = secondary_count,
        rate = stats.suppression_rate,
        "suppression plan assembled"
    );

    SuppressionPlan {
        rows: table.rows(),
        cols: table.cols(),
        statuses,
        masked,
        outcome: solve.outcome.clone(),
        stats,
    }
}
