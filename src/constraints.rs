use serde::{Deserialize, Serialize};

use crate::rules::PrimarySet;
use crate::types::{CellCoord, Table};

/// Identity of an additive constraint group: one row or one column whose
/// member cells sum to a publicly known total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupId {
    Row(usize),
    Col(usize),
}

/// One additive constraint group.
///
/// `candidates` are the members eligible for secondary suppression:
/// non-primary and non-empty, kept in row-major order so tie-breaks are
/// deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintGroup {
    pub id: GroupId,
    pub members: Vec<CellCoord>,
    pub candidates: Vec<CellCoord>,
    pub primary_count: usize,
}

impl ConstraintGroup {
    /// Minimum number of secondary suppressions this group requires.
    ///
    /// A single primary combined with a known total is solvable with one
    /// equation, so two companions must also be hidden. With several
    /// primaries the bound is deliberately looser so that small dense groups
    /// do not produce an infeasible program; it still leaves the group with
    /// more unknowns than its one equation.
    pub fn required_secondary(&self) -> usize {
        let available = self.candidates.len();
        match self.primary_count {
            0 => 0,
            1 => 2.min(available),
            p => p.min(1.max(available.saturating_sub(1))),
        }
    }

    /// True when the requirement exceeds what the group can provide; the
    /// engine suppresses everything available and reports the shortfall
    /// instead of failing.
    pub fn is_unsatisfiable(&self) -> bool {
        self.required_secondary() > self.candidates.len()
    }
}

/// Derive the additive groups from the table shape: one group per row, one
/// per column, row groups first. Pure and linear in cell count.
pub fn build_groups(table: &Table, primary: &PrimarySet) -> Vec<ConstraintGroup> {
    let mut groups = Vec::with_capacity(table.rows() + table.cols());

    for row in 0..table.rows() {
        let members: Vec<CellCoord> = (0..table.cols())
            .map(|col| CellCoord::new(row, col))
            .collect();
        groups.push(make_group(GroupId::Row(row), members, table, primary));
    }
    for col in 0..table.cols() {
        let members: Vec<CellCoord> = (0..table.rows())
            .map(|row| CellCoord::new(row, col))
            .collect();
        groups.push(make_group(GroupId::Col(col), members, table, primary));
    }

    groups
}

fn make_group(
    id: GroupId,
    members: Vec<CellCoord>,
    table: &Table,
    primary: &PrimarySet,
) -> ConstraintGroup {
    let primary_count = members.iter().filter(|c| primary.contains_key(c)).count();
    let candidates = members
        .iter()
        .copied()
        .filter(|c| !primary.contains_key(c) && !table.cell_at(*c).is_empty())
        .collect();
    ConstraintGroup {
        id,
        members,
        candidates,
        primary_count,
    }
}
