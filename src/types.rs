use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Default minimum number of contributors before a cell is publishable
pub const DEFAULT_MIN_FREQUENCY: u32 = 3;

/// Default number of top contributors considered by the dominance rule
pub const DEFAULT_DOMINANCE_N: usize = 1;

/// Default dominance threshold (top-n share of the group total, in percent)
pub const DEFAULT_DOMINANCE_K: f64 = 80.0;

/// Default p-percent protection tolerance
pub const DEFAULT_P_PERCENT: f64 = 10.0;

/// Default wall-clock budget for the integer-programming solve, in seconds
pub const DEFAULT_TIME_BUDGET_SECS: u64 = 10;

/// Result type for the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Coordinate of a cell within a table.
///
/// Ordered row-major so that every map or set keyed by coordinates iterates
/// deterministically; tie-breaks throughout the solver rely on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellCoord {
    pub row: usize,
    pub col: usize,
}

impl CellCoord {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Per-cell contributor magnitudes, either in full or reduced to the single
/// largest contributor ("shadow" value) when microdata is not available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "magnitudes", rename_all = "snake_case")]
pub enum ContributorBreakdown {
    /// Individual contributor magnitudes
    Full(Vec<f64>),
    /// Largest single contributor only
    Shadow(f64),
}

impl ContributorBreakdown {
    /// Magnitude of the largest single contributor, if any is known
    pub fn largest(&self) -> Option<f64> {
        match self {
            ContributorBreakdown::Full(values) => values
                .iter()
                .copied()
                .max_by(|a, b| a.total_cmp(b)),
            ContributorBreakdown::Shadow(value) => Some(*value),
        }
    }
}

/// A single table cell: published value, number of underlying contributors,
/// and the contributor breakdown used by the dominance and p-percent rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    value: f64,
    contributor_count: u32,
    contributors: ContributorBreakdown,
}

impl Cell {
    pub fn new(value: f64, contributor_count: u32, contributors: ContributorBreakdown) -> Self {
        Self {
            value,
            contributor_count,
            contributors,
        }
    }

    /// A structurally empty cell: no contributors, nothing to protect
    pub fn empty() -> Self {
        Self {
            value: 0.0,
            contributor_count: 0,
            contributors: ContributorBreakdown::Full(Vec::new()),
        }
    }

    /// A frequency-table cell: the value is the contributor count and every
    /// contributor has unit magnitude.
    pub fn frequency(count: u32) -> Self {
        Self {
            value: count as f64,
            contributor_count: count,
            contributors: ContributorBreakdown::Full(vec![1.0; count as usize]),
        }
    }

    /// A magnitude-table cell with the full contributor list
    pub fn magnitude(value: f64, contributors: Vec<f64>) -> Self {
        Self {
            value,
            contributor_count: contributors.len() as u32,
            contributors: ContributorBreakdown::Full(contributors),
        }
    }

    /// A magnitude-table cell where only the largest contributor is known
    pub fn with_shadow(value: f64, contributor_count: u32, largest: f64) -> Self {
        Self {
            value,
            contributor_count,
            contributors: ContributorBreakdown::Shadow(largest),
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn contributor_count(&self) -> u32 {
        self.contributor_count
    }

    pub fn contributors(&self) -> &ContributorBreakdown {
        &self.contributors
    }

    /// Structurally empty cells are exempt from every rule and are never
    /// suppressible.
    pub fn is_empty(&self) -> bool {
        self.contributor_count == 0
    }
}

/// An immutable rectangular table of additive cells.
///
/// Row and column sums are assumed to be publicly known totals; that is what
/// makes secondary suppression necessary in the first place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    rows: usize,
    cols: usize,
    cells: Vec<Cell>,
}

impl Table {
    /// Build a table from row-major cells, validating the shape
    pub fn new(rows: usize, cols: usize, cells: Vec<Cell>) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(Error::EmptyTable);
        }
        if cells.len() != rows * cols {
            return Err(Error::ShapeMismatch {
                got: cells.len(),
                rows,
                cols,
            });
        }
        Ok(Self { rows, cols, cells })
    }

    /// Build a frequency table from row-major counts
    pub fn from_counts(rows: usize, cols: usize, counts: Vec<u32>) -> Result<Self> {
        let cells = counts.into_iter().map(Cell::frequency).collect();
        Self::new(rows, cols, cells)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        &self.cells[row * self.cols + col]
    }

    pub fn cell_at(&self, coord: CellCoord) -> &Cell {
        self.cell(coord.row, coord.col)
    }

    /// Iterate cells in row-major order with their coordinates
    pub fn iter(&self) -> impl Iterator<Item = (CellCoord, &Cell)> {
        self.cells.iter().enumerate().map(move |(i, cell)| {
            (CellCoord::new(i / self.cols, i % self.cols), cell)
        })
    }
}

/// Protection rule thresholds.
///
/// The three rules are evaluated independently and their triggers are
/// unioned; a cell may be flagged for several reasons at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Threshold rule: minimum number of contributors
    pub min_frequency: u32,

    /// Dominance rule: number of top contributors considered
    pub dominance_n: usize,

    /// Dominance rule: share threshold in percent, in (0, 100]
    pub dominance_k: f64,

    /// P-percent rule: protection tolerance in percent, in (0, 100]
    pub p_percent: f64,
}

impl RuleConfig {
    /// Reject out-of-range thresholds before any processing starts
    pub fn validate(&self) -> Result<()> {
        if self.min_frequency < 1 {
            return Err(Error::InvalidConfiguration(
                "min_frequency must be at least 1".to_string(),
            ));
        }
        if self.dominance_n < 1 {
            return Err(Error::InvalidConfiguration(
                "dominance_n must be at least 1".to_string(),
            ));
        }
        if !(self.dominance_k > 0.0 && self.dominance_k <= 100.0) {
            return Err(Error::InvalidConfiguration(format!(
                "dominance_k must be in (0, 100], got {}",
                self.dominance_k
            )));
        }
        if !(self.p_percent > 0.0 && self.p_percent <= 100.0) {
            return Err(Error::InvalidConfiguration(format!(
                "p_percent must be in (0, 100], got {}",
                self.p_percent
            )));
        }
        Ok(())
    }
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            min_frequency: DEFAULT_MIN_FREQUENCY,
            dominance_n: DEFAULT_DOMINANCE_N,
            dominance_k: DEFAULT_DOMINANCE_K,
            p_percent: DEFAULT_P_PERCENT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coord_ordering_is_row_major() {
        let mut coords = vec![
            CellCoord::new(1, 0),
            CellCoord::new(0, 2),
            CellCoord::new(0, 0),
            CellCoord::new(1, 2),
        ];
        coords.sort();
        assert_eq!(
            coords,
            vec![
                CellCoord::new(0, 0),
                CellCoord::new(0, 2),
                CellCoord::new(1, 0),
                CellCoord::new(1, 2),
            ]
        );
    }

    #[test]
    fn test_largest_contributor_full() {
        let breakdown = ContributorBreakdown::Full(vec![3.0, 11.5, 7.0]);
        assert_eq!(breakdown.largest(), Some(11.5));
    }

    #[test]
    fn test_largest_contributor_shadow() {
        let breakdown = ContributorBreakdown::Shadow(42.0);
        assert_eq!(breakdown.largest(), Some(42.0));
    }

    #[test]
    fn test_largest_contributor_empty() {
        let breakdown = ContributorBreakdown::Full(vec![]);
        assert_eq!(breakdown.largest(), None);
    }

    #[test]
    fn test_frequency_cell() {
        let cell = Cell::frequency(4);
        assert_eq!(cell.value(), 4.0);
        assert_eq!(cell.contributor_count(), 4);
        assert!(!cell.is_empty());
        assert_eq!(cell.contributors().largest(), Some(1.0));
    }

    #[test]
    fn test_empty_cell() {
        let cell = Cell::empty();
        assert!(cell.is_empty());
        assert_eq!(cell.contributors().largest(), None);
    }

    #[test]
    fn test_table_rejects_zero_dimensions() {
        assert!(matches!(
            Table::new(0, 3, vec![]),
            Err(Error::EmptyTable)
        ));
        assert!(matches!(
            Table::new(3, 0, vec![]),
            Err(Error::EmptyTable)
        ));
    }

    #[test]
    fn test_table_rejects_shape_mismatch() {
        let cells = vec![Cell::frequency(1); 5];
        assert!(matches!(
            Table::new(2, 3, cells),
            Err(Error::ShapeMismatch { got: 5, rows: 2, cols: 3 })
        ));
    }

    #[test]
    fn test_table_iteration_order() {
        let table = Table::from_counts(2, 2, vec![1, 2, 3, 4]).unwrap();
        let coords: Vec<CellCoord> = table.iter().map(|(c, _)| c).collect();
        assert_eq!(
            coords,
            vec![
                CellCoord::new(0, 0),
                CellCoord::new(0, 1),
                CellCoord::new(1, 0),
                CellCoord::new(1, 1),
            ]
        );
        assert_eq!(table.cell(1, 0).value(), 3.0);
    }

    #[test]
    fn test_config_default_is_valid() {
        assert!(RuleConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_rejects_zero_min_frequency() {
        let config = RuleConfig {
            min_frequency: 0,
            ..RuleConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_config_rejects_out_of_range_dominance_k() {
        for k in [0.0, -5.0, 100.1, f64::NAN] {
            let config = RuleConfig {
                dominance_k: k,
                ..RuleConfig::default()
            };
            assert!(config.validate().is_err(), "dominance_k {} accepted", k);
        }
    }

    #[test]
    fn test_config_accepts_boundary_percentages() {
        let config = RuleConfig {
            dominance_k: 100.0,
            p_percent: 100.0,
            ..RuleConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_out_of_range_p_percent() {
        let config = RuleConfig {
            p_percent: 0.0,
            ..RuleConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
