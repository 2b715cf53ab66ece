//! Breadth-first reachability over the torus used to validate obstacle fields.

use std::collections::VecDeque;

use torus_walk_core::{CellCoord, GridSize, ObstacleField, ValidationError};

/// Dense visited map produced by a breadth-first search from a single origin.
///
/// The field keeps its buffers between rebuilds so generators can test many
/// candidate layouts without reallocating.
#[derive(Clone, Debug, Default)]
pub struct ReachabilityField {
    grid: Option<GridSize>,
    visited: Vec<bool>,
    reached: usize,
    frontier: VecDeque<CellCoord>,
}

impl ReachabilityField {
    /// Creates an empty field.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the visited map with a breadth-first search from `origin`.
    ///
    /// Cells for which `is_blocked` returns `true` are never entered. A blocked
    /// origin leaves every cell unreached.
    pub fn rebuild_with<F>(&mut self, grid: GridSize, origin: CellCoord, mut is_blocked: F)
    where
        F: FnMut(CellCoord) -> bool,
    {
        let cell_count = grid.cell_count();
        if self.visited.len() != cell_count {
            self.visited = vec![false; cell_count];
        } else {
            self.visited.fill(false);
        }

        self.grid = Some(grid);
        self.reached = 0;
        self.frontier.clear();

        let Some(origin_index) = grid.index(origin) else {
            return;
        };

        if is_blocked(origin) {
            return;
        }

        self.visited[origin_index] = true;
        self.reached = 1;
        self.frontier.push_back(origin);

        while let Some(cell) = self.frontier.pop_front() {
            for neighbor in grid.neighbors(cell) {
                let Some(neighbor_index) = grid.index(neighbor) else {
                    continue;
                };

                if self.visited[neighbor_index] || is_blocked(neighbor) {
                    continue;
                }

                self.visited[neighbor_index] = true;
                self.reached += 1;
                self.frontier.push_back(neighbor);
            }
        }
    }

    /// Reports whether the last search reached the cell.
    #[must_use]
    pub fn is_reachable(&self, cell: CellCoord) -> bool {
        self.grid
            .and_then(|grid| grid.index(cell))
            .and_then(|index| self.visited.get(index).copied())
            .unwrap_or(false)
    }

    /// Number of cells reached by the last search, origin included.
    #[must_use]
    pub fn reached_count(&self) -> usize {
        self.reached
    }
}

/// Checks that the center of the field's grid is open and that every open
/// cell can reach it.
pub fn check_connected(field: &ObstacleField) -> Result<(), ValidationError> {
    let mut reachability = ReachabilityField::new();
    check_connected_with(field, &mut reachability)
}

/// Same as [`check_connected`], reusing the provided search buffers.
pub fn check_connected_with(
    field: &ObstacleField,
    reachability: &mut ReachabilityField,
) -> Result<(), ValidationError> {
    let grid = field.grid();
    let center = grid.center();
    if field.is_blocked(center) {
        return Err(ValidationError::BlockedCenter);
    }

    reachability.rebuild_with(grid, center, |cell| field.is_blocked(cell));

    let open_cells = grid.cell_count() - field.blocked_count();
    let unreachable = open_cells.saturating_sub(reachability.reached_count());
    if unreachable > 0 {
        return Err(ValidationError::Disconnected { unreachable });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_from_rows(rows: &[&str]) -> ObstacleField {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        let grid = GridSize::new(height, width).expect("grid");
        let cells = rows
            .iter()
            .flat_map(|row| row.chars().map(|symbol| symbol == '#'))
            .collect();
        ObstacleField::from_cells(grid, cells).expect("field")
    }

    #[test]
    fn rebuild_with_reaches_every_open_cell() {
        let grid = GridSize::new(3, 4).expect("grid");
        let mut field = ReachabilityField::new();

        field.rebuild_with(grid, grid.center(), |_| false);

        assert_eq!(field.reached_count(), 12);
        assert!(field.is_reachable(CellCoord::new(0, 0)));
    }

    #[test]
    fn rebuild_with_respects_walls() {
        let grid = GridSize::new(3, 3).expect("grid");
        let wall = CellCoord::new(0, 1);
        let mut field = ReachabilityField::new();

        field.rebuild_with(grid, grid.center(), |cell| cell == wall);

        assert!(!field.is_reachable(wall));
        assert_eq!(field.reached_count(), 8);
    }

    #[test]
    fn blocked_origin_reaches_nothing() {
        let grid = GridSize::new(3, 3).expect("grid");
        let mut field = ReachabilityField::new();

        field.rebuild_with(grid, grid.center(), |_| true);

        assert_eq!(field.reached_count(), 0);
        assert!(!field.is_reachable(grid.center()));
    }

    #[test]
    fn wraparound_links_opposite_edges() {
        // The left column is only reachable by wrapping across the right edge.
        let field = field_from_rows(&[".#..", ".#..", ".#.."]);
        assert_eq!(check_connected(&field), Ok(()));
    }

    #[test]
    fn enclosed_cell_is_reported() {
        // The corner is walled off on all four torus sides.
        let pocket = field_from_rows(&[".#..#", "#....", ".....", ".....", "#...."]);
        assert_eq!(
            check_connected(&pocket),
            Err(ValidationError::Disconnected { unreachable: 1 })
        );
    }

    #[test]
    fn blocked_center_is_rejected() {
        let field = field_from_rows(&["...", ".#.", "..."]);
        assert_eq!(check_connected(&field), Err(ValidationError::BlockedCenter));
    }
}
