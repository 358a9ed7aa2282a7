use thiserror::Error;

/// Engine error type.
///
/// Only configuration and table-shape problems are surfaced as errors;
/// solver failures are always recovered internally by the greedy fallback
/// and recorded in the plan's outcome instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("table must have at least one row and one column")]
    EmptyTable,

    #[error("cell vector has {got} entries, expected {rows}x{cols}")]
    ShapeMismatch { got: usize, rows: usize, cols: usize },
}
