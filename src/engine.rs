use std::time::Duration;

use tracing::debug;

use crate::constraints::build_groups;
use crate::cost::{CostFn, UniformCost};
use crate::plan::{assemble, SuppressionPlan};
use crate::rules::classify;
use crate::solver::{solve, CancelFlag};
use crate::types::{Result, RuleConfig, Table, DEFAULT_TIME_BUDGET_SECS};

/// Per-request knobs: cost strategy, solver time budget, and a cancel
/// handle. Everything else about a run is determined by the table and the
/// rule thresholds.
pub struct EngineOptions {
    pub cost: Box<dyn CostFn>,
    pub time_budget: Duration,
    pub cancel: CancelFlag,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            cost: Box::new(UniformCost),
            time_budget: Duration::from_secs(DEFAULT_TIME_BUDGET_SECS),
            cancel: CancelFlag::new(),
        }
    }
}

/// Run the full suppression pipeline on one table.
///
/// Synchronous and single-threaded from the caller's point of view:
/// classify, build the additive groups, solve for secondaries, assemble.
/// Each stage consumes the complete output of the previous one. Requests
/// share no mutable state, so distinct tables can be processed in parallel
/// by running this function on separate threads.
///
/// The only failure mode is an invalid configuration or table; solver
/// trouble of any kind is recovered internally and recorded in the plan's
/// outcome.
pub fn suppress(
    table: &Table,
    config: &RuleConfig,
    options: &EngineOptions,
) -> Result<SuppressionPlan> {
    config.validate()?;

    let primary = classify(table, config);
    let groups = build_groups(table, &primary);
    debug!(
        groups = groups.len(),
        constrained = groups.iter().filter(|g| g.primary_count > 0).count(),
        "constraint groups built"
    );
    let solve_result = solve(
        table,
        &groups,
        &primary,
        options.cost.as_ref(),
        options.time_budget,
        &options.cancel,
    );
    Ok(assemble(table, &primary, &solve_result))
}
