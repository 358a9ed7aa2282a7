use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constraints::{ConstraintGroup, GroupId};
use crate::types::CellCoord;

/// A group whose requirement could not be met even after suppressing every
/// candidate it has. Reported, never silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    pub group: GroupId,
    pub missing: usize,
}

/// Outcome of the greedy pass
#[derive(Debug, Clone, PartialEq)]
pub struct GreedyResult {
    pub secondary: BTreeSet<CellCoord>,
    pub shortfalls: Vec<Shortfall>,
}

/// Deterministic greedy secondary suppression.
///
/// Groups are visited in fixed order (all rows ascending, then all columns
/// ascending). For each unsatisfied requirement the cheapest remaining
/// candidate is taken, tie-broken by ascending cost then row-major
/// coordinate. Cells already selected for an earlier group count toward the
/// requirement, so overlapping row/column constraints share suppressions.
///
/// Always terminates and satisfies every group whose candidate pool is large
/// enough; groups that run dry are reported as shortfalls.
pub fn greedy_cover(
    groups: &[ConstraintGroup],
    costs: &BTreeMap<CellCoord, f64>,
) -> GreedyResult {
    let mut secondary: BTreeSet<CellCoord> = BTreeSet::new();
    let mut shortfalls = Vec::new();

    for group in groups {
        let required = group.required_secondary();
        if required == 0 {
            continue;
        }

        let mut have = group
            .candidates
            .iter()
            .filter(|c| secondary.contains(c))
            .count();
        if have >= required {
            continue;
        }

        let mut available: Vec<CellCoord> = group
            .candidates
            .iter()
            .copied()
            .filter(|c| !secondary.contains(c))
            .collect();
        available.sort_by(|a, b| costs[a].total_cmp(&costs[b]).then_with(|| a.cmp(b)));

        for coord in available {
            if have >= required {
                break;
            }
            secondary.insert(coord);
            have += 1;
        }

        if have < required {
            warn!(
                group = ?group.id,
                required,
                have,
                "group cannot meet its protection requirement"
            );
            shortfalls.push(Shortfall {
                group: group.id,
                missing: required - have,
            });
        }
    }

    GreedyResult {
        secondary,
        shortfalls,
    }
}
