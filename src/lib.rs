//! Cell suppression engine for statistical disclosure control.
//!
//! Given a flat two-dimensional table whose rows and columns sum to
//! publicly known totals, the engine flags individually disclosive cells
//! under three protection rules (frequency, dominance, p-percent), then
//! selects a minimal set of additional cells to hide so that the flagged
//! values cannot be reconstructed from the remaining totals. Secondary
//! selection runs as a 0/1 integer program with a deterministic greedy
//! fallback on infeasibility, timeout, or cancellation.
//!
//! The crate consumes an in-memory [`Table`] and produces an immutable
//! [`SuppressionPlan`]; parsing input formats and rendering the plan are
//! the caller's concern.

pub mod constraints;
pub mod cost;
pub mod engine;
pub mod error;
pub mod heuristic;
pub mod plan;
pub mod rules;
pub mod solver;
pub mod types;

pub use constraints::{build_groups, ConstraintGroup, GroupId};
pub use cost::{CostFn, UniformCost, ValueCost};
pub use engine::{suppress, EngineOptions};
pub use error::Error;
pub use heuristic::Shortfall;
pub use plan::{MaskedValue, SuppressionPlan, SuppressionStats, SuppressionStatus};
pub use rules::{classify, PrimarySet, ReasonSet, SuppressionReason};
pub use solver::{solve, CancelFlag, FallbackReason, SolveOutcome, SolveResult};
pub use types::{
    Cell, CellCoord, ContributorBreakdown, Result, RuleConfig, Table,
};
