use crate::types::{Cell, CellCoord};

/// Suppression cost strategy.
///
/// The solver minimises the summed cost of the selected secondary cells, so
/// the strategy decides what "information loss" means for a table. Costs
/// must be non-negative and finite.
pub trait CostFn {
    fn cost(&self, coord: CellCoord, cell: &Cell) -> f64;
}

/// Every cell costs the same: minimises the number of suppressed cells.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformCost;

impl CostFn for UniformCost {
    fn cost(&self, _coord: CellCoord, _cell: &Cell) -> f64 {
        1.0
    }
}

/// Value-proportional cost: large cells are expensive to hide, so the solver
/// prefers sacrificing small cells. Clamped below by 1 so that zero-valued
/// cells still carry weight in the objective.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueCost;

impl CostFn for ValueCost {
    fn cost(&self, _coord: CellCoord, cell: &Cell) -> f64 {
        cell.value().abs().max(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Cell;

    #[test]
    fn test_uniform_cost() {
        let coord = CellCoord::new(0, 0);
        assert_eq!(UniformCost.cost(coord, &Cell::frequency(3)), 1.0);
        assert_eq!(UniformCost.cost(coord, &Cell::frequency(300)), 1.0);
    }

    #[test]
    fn test_value_cost_tracks_magnitude() {
        let coord = CellCoord::new(0, 0);
        assert_eq!(ValueCost.cost(coord, &Cell::frequency(25)), 25.0);
        assert_eq!(
            ValueCost.cost(coord, &Cell::magnitude(-40.0, vec![-40.0])),
            40.0
        );
    }

    #[test]
    fn test_value_cost_floor() {
        let coord = CellCoord::new(0, 0);
        assert_eq!(
            ValueCost.cost(coord, &Cell::magnitude(0.0, vec![0.0, 0.0])),
            1.0
        );
    }
}
