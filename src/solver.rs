use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use good_lp::{default_solver, variable, variables, Expression, ResolutionError, Solution, SolverModel, Variable};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constraints::ConstraintGroup;
use crate::cost::CostFn;
use crate::heuristic::{greedy_cover, Shortfall};
use crate::rules::PrimarySet;
use crate::types::{CellCoord, Table};

/// How long the caller waits between polls of the solver thread
const SOLVER_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Why the engine abandoned the integer program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    Infeasible,
    Timeout,
    Cancelled,
    SolverError,
}

/// How the secondary set was obtained.
///
/// All three variants are valid plans; callers that care about optimality
/// inspect this field. The bundled backend proves optimality or errors, so
/// `Feasible` is reserved for backends that hand back time-limited
/// incumbents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SolveOutcome {
    Optimal,
    Feasible,
    HeuristicFallback {
        reason: FallbackReason,
        shortfalls: Vec<Shortfall>,
    },
}

/// Cooperative cancellation handle for a running solve.
///
/// Clone it, hand one copy to the engine, and flip it from any thread; the
/// engine abandons the integer program and falls back to the greedy
/// heuristic deterministically.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Result of the secondary-suppression stage
#[derive(Debug, Clone, PartialEq)]
pub struct SolveResult {
    pub secondary: BTreeSet<CellCoord>,
    pub outcome: SolveOutcome,
    pub shortfalls: Vec<Shortfall>,
}

/// Plain-data form of the 0/1 program, detached from the table so it can be
/// moved onto the solver thread.
#[derive(Debug, Clone)]
struct IpProblem {
    /// Cost per candidate, indexed by candidate id
    costs: Vec<f64>,
    /// One row per constrained group: candidate ids and the required minimum
    rows: Vec<(Vec<usize>, usize)>,
}

/// Select the secondary suppression set.
///
/// Formulates a 0/1 integer program over the non-primary, non-empty cells
/// and solves it on a worker thread under `time_budget`. Infeasibility,
/// solver errors, timeout, and cancellation are all recovered by the greedy
/// heuristic; the caller always receives a usable plan.
pub fn solve(
    table: &Table,
    groups: &[ConstraintGroup],
    primary: &PrimarySet,
    cost_fn: &dyn CostFn,
    time_budget: Duration,
    cancel: &CancelFlag,
) -> SolveResult {
    // Evaluate costs once, on the caller's thread
    let mut costs: BTreeMap<CellCoord, f64> = BTreeMap::new();
    for group in groups {
        for &coord in &group.candidates {
            costs
                .entry(coord)
                .or_insert_with(|| cost_fn.cost(coord, table.cell_at(coord)));
        }
    }
    debug_assert!(
        costs.values().all(|c| c.is_finite() && *c >= 0.0),
        "cost function produced a negative or non-finite cost"
    );

    let index: BTreeMap<CellCoord, usize> = costs
        .keys()
        .enumerate()
        .map(|(i, &coord)| (coord, i))
        .collect();

    let mut shortfalls = Vec::new();
    let mut rows = Vec::new();
    for group in groups {
        let required = group.required_secondary();
        if required == 0 {
            continue;
        }
        if group.is_unsatisfiable() {
            // Take everything the group has (possibly nothing) and report
            // the gap; an impossible row would poison the whole program.
            shortfalls.push(Shortfall {
                group: group.id,
                missing: required - group.candidates.len(),
            });
            if group.candidates.is_empty() {
                continue;
            }
        }
        let ids: Vec<usize> = group.candidates.iter().map(|c| index[c]).collect();
        let bound = required.min(ids.len());
        rows.push((ids, bound));
    }

    if rows.is_empty() {
        debug!("no constrained groups; secondary suppression not needed");
        return SolveResult {
            secondary: BTreeSet::new(),
            outcome: SolveOutcome::Optimal,
            shortfalls,
        };
    }

    if cancel.is_cancelled() {
        return fallback(groups, &costs, FallbackReason::Cancelled);
    }

    let problem = IpProblem {
        costs: costs.values().copied().collect(),
        rows,
    };
    info!(
        variables = problem.costs.len(),
        constraints = problem.rows.len(),
        "solving secondary-suppression integer program"
    );

    match solve_with_budget(problem, time_budget, cancel) {
        Ok(selected) => {
            let coords: Vec<CellCoord> = index.keys().copied().collect();
            let secondary: BTreeSet<CellCoord> =
                selected.into_iter().map(|i| coords[i]).collect();
            info!(secondary = secondary.len(), "optimal secondary set found");
            SolveResult {
                secondary,
                outcome: SolveOutcome::Optimal,
                shortfalls,
            }
        }
        Err(reason) => fallback(groups, &costs, reason),
    }
}

/// Run the integer program on a worker thread, waiting at most
/// `time_budget` and honouring the cancel flag while waiting.
fn solve_with_budget(
    problem: IpProblem,
    time_budget: Duration,
    cancel: &CancelFlag,
) -> Result<Vec<usize>, FallbackReason> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(solve_ip(&problem));
    });

    let deadline = Instant::now() + time_budget;
    loop {
        if cancel.is_cancelled() {
            return Err(FallbackReason::Cancelled);
        }
        if Instant::now() >= deadline {
            warn!("integer program exceeded its time budget");
            return Err(FallbackReason::Timeout);
        }
        match rx.recv_timeout(SOLVER_POLL_INTERVAL) {
            Ok(Ok(selected)) => return Ok(selected),
            Ok(Err(ResolutionError::Infeasible)) => {
                warn!("integer program is infeasible");
                return Err(FallbackReason::Infeasible);
            }
            Ok(Err(err)) => {
                warn!(error = %err, "solver failed");
                return Err(FallbackReason::SolverError);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                warn!("solver thread terminated without a result");
                return Err(FallbackReason::SolverError);
            }
        }
    }
}

/// Build and solve the 0/1 program with the bundled backend
fn solve_ip(problem: &IpProblem) -> Result<Vec<usize>, ResolutionError> {
    let mut vars = variables!();
    let xs: Vec<Variable> = problem
        .costs
        .iter()
        .map(|_| vars.add(variable().binary()))
        .collect();

    let objective: Expression = xs
        .iter()
        .zip(&problem.costs)
        .map(|(&x, &c)| Expression::from(x) * c)
        .sum();

    let mut model = vars.minimise(objective).using(default_solver);
    for (ids, required) in &problem.rows {
        let lhs: Expression = ids.iter().map(|&i| Expression::from(xs[i])).sum();
        model = model.with(good_lp::constraint::geq(lhs, *required as f64));
    }

    let solution = model.solve()?;
    Ok(xs
        .iter()
        .enumerate()
        .filter(|(_, &x)| solution.value(x) > 0.5)
        .map(|(i, _)| i)
        .collect())
}

fn fallback(
    groups: &[ConstraintGroup],
    costs: &BTreeMap<CellCoord, f64>,
    reason: FallbackReason,
) -> SolveResult {
    info!(?reason, "falling back to greedy secondary suppression");
    let greedy = greedy_cover(groups, costs);
    SolveResult {
        secondary: greedy.secondary,
        shortfalls: greedy.shortfalls.clone(),
        outcome: SolveOutcome::HeuristicFallback {
            reason,
            shortfalls: greedy.shortfalls,
        },
    }
}
