#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the torus walk engine.
//!
//! This crate defines the grid model and the message surface that connects the
//! session adapter, the authoritative world, and the pure systems. Systems read
//! immutable views of the world, compute walk outcomes, and hand them back as
//! [`Command`] values; the world applies those commands through its `apply`
//! entry point and reports the result as [`Event`] values.

use std::path::PathBuf;

use thiserror::Error;

/// Maximum deviation of the move probabilities' sum from one.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Highest obstacle density the generator accepts; larger requests are clamped.
pub const MAX_OBSTACLE_DENSITY: f64 = 0.80;

/// Commands that express all permissible mutations of a live simulation.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Commits one complete replication sweep.
    ///
    /// `outcomes` is laid out in row-major order and must hold exactly one
    /// entry per grid cell: `Some` for every open cell and `None` for every
    /// obstacle.
    RecordSweep {
        /// Walk outcomes for every cell of the grid.
        outcomes: Vec<Option<WalkOutcome>>,
    },
    /// Replaces the advisory path used when the simulation is ended.
    SetResultPath {
        /// New result path, or `None` to fall back to the server default.
        path: Option<PathBuf>,
    },
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Confirms that a sweep was folded into the accumulators.
    SweepRecorded {
        /// Replications completed after the sweep was committed.
        replications_done: u64,
    },
    /// Reports that a sweep was rejected and nothing was accumulated.
    SweepRejected {
        /// Specific reason the sweep was refused.
        reason: SweepRejection,
    },
    /// Confirms that the result path changed.
    ResultPathChanged,
}

/// Reasons a sweep may be refused by the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SweepRejection {
    /// The outcome vector does not match the grid's cell count.
    LengthMismatch {
        /// Number of cells in the simulation grid.
        expected: usize,
        /// Number of outcomes supplied.
        actual: usize,
    },
    /// An obstacle cell carried an outcome.
    OutcomeOnObstacle {
        /// Row-major index of the offending cell.
        index: usize,
    },
    /// An open cell was skipped.
    MissingOutcome {
        /// Row-major index of the skipped cell.
        index: usize,
    },
}

/// Wraps a signed coordinate onto an axis of length `modulus`.
///
/// `modulus` must be non-zero; [`GridSize`] guarantees this for every axis it
/// hands out.
#[must_use]
pub fn wrap(value: i64, modulus: u32) -> u32 {
    let modulus = i64::from(modulus);
    (((value % modulus) + modulus) % modulus) as u32
}

/// Location of a single grid cell expressed as row and column coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellCoord {
    row: u32,
    column: u32,
}

impl CellCoord {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }

    /// Zero-based row index of the cell.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }

    /// Zero-based column index of the cell.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }
}

/// Cardinal moves available to a walker, in the order the move
/// probabilities are declared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Movement toward decreasing row indices.
    Up,
    /// Movement toward increasing row indices.
    Down,
    /// Movement toward decreasing column indices.
    Left,
    /// Movement toward increasing column indices.
    Right,
}

impl Direction {
    /// Every direction in probability-vector order.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Row and column delta applied by the move.
    #[must_use]
    pub const fn offset(self) -> (i64, i64) {
        match self {
            Self::Up => (-1, 0),
            Self::Down => (1, 0),
            Self::Left => (0, -1),
            Self::Right => (0, 1),
        }
    }
}

/// Dimensions of the toroidal grid.
///
/// Both axes are strictly positive and the total cell count fits in `usize`,
/// so every coordinate helper below is infallible for cells inside the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridSize {
    height: u32,
    width: u32,
}

impl GridSize {
    /// Validates the provided dimensions.
    pub fn new(height: u32, width: u32) -> Result<Self, ValidationError> {
        if height == 0 || width == 0 {
            return Err(ValidationError::Dimensions { height, width });
        }

        let height_usize = usize::try_from(height).ok();
        let width_usize = usize::try_from(width).ok();
        match (height_usize, width_usize) {
            (Some(h), Some(w)) if h.checked_mul(w).is_some() => Ok(Self { height, width }),
            _ => Err(ValidationError::Dimensions { height, width }),
        }
    }

    /// Number of rows.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Number of columns.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Total number of cells.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.height as usize * self.width as usize
    }

    /// Absorbing cell every walk tries to reach.
    #[must_use]
    pub const fn center(&self) -> CellCoord {
        CellCoord::new(self.height / 2, self.width / 2)
    }

    /// Row-major index of the cell, if it lies within the grid.
    #[must_use]
    pub fn index(&self, cell: CellCoord) -> Option<usize> {
        if cell.row() >= self.height || cell.column() >= self.width {
            return None;
        }

        Some(cell.row() as usize * self.width as usize + cell.column() as usize)
    }

    /// Cell stored at the provided row-major index.
    #[must_use]
    pub fn coord(&self, index: usize) -> Option<CellCoord> {
        if index >= self.cell_count() {
            return None;
        }

        let width = self.width as usize;
        Some(CellCoord::new((index / width) as u32, (index % width) as u32))
    }

    /// Destination of a single move, wrapping across both edges.
    #[must_use]
    pub fn step(&self, cell: CellCoord, direction: Direction) -> CellCoord {
        let (row_delta, column_delta) = direction.offset();
        CellCoord::new(
            wrap(i64::from(cell.row()) + row_delta, self.height),
            wrap(i64::from(cell.column()) + column_delta, self.width),
        )
    }

    /// Torus neighbours of the cell in direction order.
    ///
    /// On axes of length one or two the same neighbour may be yielded more
    /// than once.
    pub fn neighbors(&self, cell: CellCoord) -> impl Iterator<Item = CellCoord> {
        let grid = *self;
        Direction::ALL
            .into_iter()
            .map(move |direction| grid.step(cell, direction))
    }

    /// Every cell of the grid in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = CellCoord> {
        let width = self.width;
        (0..self.height).flat_map(move |row| (0..width).map(move |column| CellCoord::new(row, column)))
    }
}

/// Allocates a per-cell vector, reporting allocation failure instead of
/// aborting the process.
pub fn try_cell_vec<T: Clone>(count: usize, value: T) -> Result<Vec<T>, AllocationError> {
    let mut cells = Vec::new();
    cells
        .try_reserve_exact(count)
        .map_err(|_| AllocationError { cells: count })?;
    cells.resize(count, value);
    Ok(cells)
}

/// Dense obstacle bitmap covering every cell of a grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObstacleField {
    grid: GridSize,
    blocked: Vec<bool>,
}

impl ObstacleField {
    /// Creates a field with no obstacles.
    pub fn clear(grid: GridSize) -> Result<Self, AllocationError> {
        Ok(Self {
            grid,
            blocked: try_cell_vec(grid.cell_count(), false)?,
        })
    }

    /// Wraps an existing row-major bitmap.
    pub fn from_cells(grid: GridSize, blocked: Vec<bool>) -> Result<Self, ValidationError> {
        if blocked.len() != grid.cell_count() {
            return Err(ValidationError::CellCount {
                what: "obstacle bitmap",
                expected: grid.cell_count(),
                actual: blocked.len(),
            });
        }

        Ok(Self { grid, blocked })
    }

    /// Grid the field was built for.
    #[must_use]
    pub const fn grid(&self) -> GridSize {
        self.grid
    }

    /// Reports whether the cell holds an obstacle. Cells outside the grid are
    /// treated as open.
    #[must_use]
    pub fn is_blocked(&self, cell: CellCoord) -> bool {
        self.grid
            .index(cell)
            .and_then(|index| self.blocked.get(index).copied())
            .unwrap_or(false)
    }

    /// Marks or clears the obstacle at the provided cell.
    pub fn set_blocked(&mut self, cell: CellCoord, blocked: bool) {
        if let Some(slot) = self
            .grid
            .index(cell)
            .and_then(|index| self.blocked.get_mut(index))
        {
            *slot = blocked;
        }
    }

    /// Clears every obstacle while keeping the allocation.
    pub fn reset(&mut self) {
        self.blocked.fill(false);
    }

    /// Number of obstacle cells.
    #[must_use]
    pub fn blocked_count(&self) -> usize {
        self.blocked.iter().filter(|blocked| **blocked).count()
    }

    /// Row-major bitmap backing the field.
    #[must_use]
    pub fn cells(&self) -> &[bool] {
        &self.blocked
    }
}

/// Categorical distribution over the four moves (up, down, left, right).
///
/// Construction does not validate; call [`MoveProbabilities::validate`] before
/// sampling. Snapshots may carry vectors that only fail once a run is
/// attempted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoveProbabilities {
    up: f64,
    down: f64,
    left: f64,
    right: f64,
}

impl MoveProbabilities {
    /// Creates a probability vector from its four components.
    #[must_use]
    pub const fn new(up: f64, down: f64, left: f64, right: f64) -> Self {
        Self {
            up,
            down,
            left,
            right,
        }
    }

    /// Equal probability for every direction.
    #[must_use]
    pub const fn uniform() -> Self {
        Self::new(0.25, 0.25, 0.25, 0.25)
    }

    /// Components in direction order.
    #[must_use]
    pub const fn as_array(&self) -> [f64; 4] {
        [self.up, self.down, self.left, self.right]
    }

    /// Probability assigned to a single direction.
    #[must_use]
    pub const fn probability(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Up => self.up,
            Direction::Down => self.down,
            Direction::Left => self.left,
            Direction::Right => self.right,
        }
    }

    /// Checks that every component is finite and non-negative and that the
    /// components sum to one within [`PROBABILITY_TOLERANCE`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        let components = self.as_array();
        if components
            .iter()
            .any(|value| !value.is_finite() || *value < 0.0)
        {
            return Err(ValidationError::Probabilities {
                probabilities: components,
            });
        }

        let sum: f64 = components.iter().sum();
        if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(ValidationError::Probabilities {
                probabilities: components,
            });
        }

        Ok(())
    }
}

impl Default for MoveProbabilities {
    fn default() -> Self {
        Self::uniform()
    }
}

/// Step budget K used by the hit-within-K metric.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StepBudget(u32);

impl StepBudget {
    /// Validates a strictly positive budget.
    pub fn new(value: u32) -> Result<Self, ValidationError> {
        if value == 0 {
            return Err(ValidationError::StepBudget);
        }
        Ok(Self(value))
    }

    /// Numeric value of the budget.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Reports whether a walk absorbed after `steps` steps counts as a hit.
    #[must_use]
    pub fn is_hit(&self, steps: u64) -> bool {
        steps <= u64::from(self.0)
    }
}

/// Read-only view of everything a walker needs from the simulation.
#[derive(Clone, Copy, Debug)]
pub struct WalkView<'a> {
    grid: GridSize,
    obstacles: Option<&'a ObstacleField>,
    probabilities: MoveProbabilities,
    step_budget: StepBudget,
}

impl<'a> WalkView<'a> {
    /// Captures a new walk view.
    #[must_use]
    pub const fn new(
        grid: GridSize,
        obstacles: Option<&'a ObstacleField>,
        probabilities: MoveProbabilities,
        step_budget: StepBudget,
    ) -> Self {
        Self {
            grid,
            obstacles,
            probabilities,
            step_budget,
        }
    }

    /// Grid the walk runs on.
    #[must_use]
    pub const fn grid(&self) -> GridSize {
        self.grid
    }

    /// Move probabilities used for every step.
    #[must_use]
    pub const fn probabilities(&self) -> MoveProbabilities {
        self.probabilities
    }

    /// Step budget deciding whether an absorbed walk counts as a hit.
    #[must_use]
    pub const fn step_budget(&self) -> StepBudget {
        self.step_budget
    }

    /// Reports whether the cell blocks movement. Always `false` when the
    /// simulation runs without obstacles.
    #[must_use]
    pub fn is_blocked(&self, cell: CellCoord) -> bool {
        self.obstacles
            .map_or(false, |field| field.is_blocked(cell))
    }
}

/// Result of a single absorbing walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WalkOutcome {
    /// Steps taken before absorption, or the step cap for truncated walks.
    pub steps: u64,
    /// Whether the walk was absorbed within the step budget.
    pub hit: bool,
    /// Whether the walk was cut off by the step cap before absorption.
    pub truncated: bool,
}

impl WalkOutcome {
    /// Outcome of a walk that starts on the absorbing cell.
    pub const ABSORBED_AT_START: WalkOutcome = WalkOutcome {
        steps: 0,
        hit: true,
        truncated: false,
    };
}

/// Whether a simulation places obstacles on its grid. Fixed for the
/// simulation's lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ObstacleMode {
    /// Every cell is open.
    #[default]
    Disabled,
    /// Obstacles are generated at creation time.
    Enabled,
}

/// Presentation flag toggled by front ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DisplayMode {
    /// Only aggregated summaries are shown.
    #[default]
    Summary,
    /// Front ends step through individual walks.
    Interactive,
}

/// Statistic rendered by a summary query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SummaryKind {
    /// Mean number of steps to reach the center.
    MeanSteps,
    /// Empirical probability of reaching the center within K steps.
    HitProbability,
}

/// Source of seeds for the randomized components.
///
/// The server draws from the clock; tests inject fixed sequences so replays
/// are reproducible.
pub trait SeedSource: Send {
    /// Produces the seed for the next randomized operation.
    fn next_seed(&mut self) -> u64;
}

/// Deterministic seed stream derived from a single starting value.
#[derive(Clone, Debug)]
pub struct SeedSequence {
    state: u64,
}

impl SeedSequence {
    /// Creates a stream starting at `seed`.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self { state: seed }
    }
}

impl SeedSource for SeedSequence {
    fn next_seed(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }
}

/// Malformed or out-of-range simulation parameters.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Grid dimensions are zero or too large to address.
    #[error("invalid grid dimensions {height}x{width}")]
    Dimensions {
        /// Requested number of rows.
        height: u32,
        /// Requested number of columns.
        width: u32,
    },
    /// Move probabilities are negative, non-finite or do not sum to one.
    #[error("move probabilities {probabilities:?} must be non-negative and sum to 1")]
    Probabilities {
        /// Offending components in direction order.
        probabilities: [f64; 4],
    },
    /// The step budget K was zero.
    #[error("step budget K must be positive")]
    StepBudget,
    /// A replication count was zero where more work was required.
    #[error("replication count must be positive")]
    Replications,
    /// An obstacle density was not a finite number.
    #[error("obstacle density {0} is not a number")]
    Density(f64),
    /// A per-cell array did not match its grid.
    #[error("{what} hold {actual} cells, expected {expected}")]
    CellCount {
        /// Array that was checked.
        what: &'static str,
        /// Cells in the grid.
        expected: usize,
        /// Cells in the bitmap.
        actual: usize,
    },
    /// The center cell carries an obstacle.
    #[error("center cell must not be an obstacle")]
    BlockedCenter,
    /// Some open cells cannot reach the center.
    #[error("{unreachable} open cells cannot reach the center")]
    Disconnected {
        /// Number of open cells outside the center's component.
        unreachable: usize,
    },
    /// A command argument could not be parsed.
    #[error("bad {command} params: {detail}")]
    Arguments {
        /// Command keyword whose arguments were rejected.
        command: &'static str,
        /// Human readable description of the problem.
        detail: String,
    },
}

/// Per-cell arrays for the requested grid could not be allocated.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("could not allocate per-cell storage for {cells} cells")]
pub struct AllocationError {
    /// Number of cells requested.
    pub cells: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_handles_negative_and_overflowing_values() {
        assert_eq!(wrap(-1, 5), 4);
        assert_eq!(wrap(5, 5), 0);
        assert_eq!(wrap(-11, 5), 4);
        assert_eq!(wrap(3, 5), 3);
    }

    #[test]
    fn grid_rejects_zero_dimensions() {
        assert!(GridSize::new(0, 3).is_err());
        assert!(GridSize::new(3, 0).is_err());
        assert!(GridSize::new(1, 1).is_ok());
    }

    #[test]
    fn index_is_row_major() {
        let grid = GridSize::new(3, 4).expect("grid");
        assert_eq!(grid.index(CellCoord::new(0, 0)), Some(0));
        assert_eq!(grid.index(CellCoord::new(1, 2)), Some(6));
        assert_eq!(grid.index(CellCoord::new(3, 0)), None);
        assert_eq!(grid.coord(6), Some(CellCoord::new(1, 2)));
        assert_eq!(grid.coord(12), None);
    }

    #[test]
    fn center_uses_integer_halves() {
        assert_eq!(GridSize::new(3, 3).expect("grid").center(), CellCoord::new(1, 1));
        assert_eq!(GridSize::new(4, 6).expect("grid").center(), CellCoord::new(2, 3));
        assert_eq!(GridSize::new(1, 1).expect("grid").center(), CellCoord::new(0, 0));
    }

    #[test]
    fn steps_wrap_across_edges() {
        let grid = GridSize::new(3, 4).expect("grid");
        let corner = CellCoord::new(0, 0);
        assert_eq!(grid.step(corner, Direction::Up), CellCoord::new(2, 0));
        assert_eq!(grid.step(corner, Direction::Left), CellCoord::new(0, 3));
        assert_eq!(grid.step(CellCoord::new(2, 3), Direction::Down), CellCoord::new(0, 3));
        assert_eq!(grid.step(CellCoord::new(2, 3), Direction::Right), CellCoord::new(2, 0));
    }

    #[test]
    fn neighbors_follow_direction_order() {
        let grid = GridSize::new(3, 3).expect("grid");
        let neighbors: Vec<_> = grid.neighbors(CellCoord::new(1, 1)).collect();
        assert_eq!(
            neighbors,
            vec![
                CellCoord::new(0, 1),
                CellCoord::new(2, 1),
                CellCoord::new(1, 0),
                CellCoord::new(1, 2),
            ]
        );
    }

    #[test]
    fn probabilities_accept_tolerance() {
        assert!(MoveProbabilities::uniform().validate().is_ok());
        assert!(MoveProbabilities::new(0.1, 0.2, 0.3, 0.4000005).validate().is_ok());
        assert!(MoveProbabilities::new(0.1, 0.2, 0.3, 0.41).validate().is_err());
        assert!(MoveProbabilities::new(-0.1, 0.4, 0.3, 0.4).validate().is_err());
        assert!(MoveProbabilities::new(f64::NAN, 0.4, 0.3, 0.3).validate().is_err());
    }

    #[test]
    fn step_budget_hit_is_inclusive() {
        let budget = StepBudget::new(4).expect("budget");
        assert!(budget.is_hit(0));
        assert!(budget.is_hit(4));
        assert!(!budget.is_hit(5));
        assert_eq!(StepBudget::new(0), Err(ValidationError::StepBudget));
    }

    #[test]
    fn obstacle_field_tracks_blocked_cells() {
        let grid = GridSize::new(2, 3).expect("grid");
        let mut field = ObstacleField::clear(grid).expect("field");
        field.set_blocked(CellCoord::new(1, 2), true);
        field.set_blocked(CellCoord::new(5, 5), true);
        assert!(field.is_blocked(CellCoord::new(1, 2)));
        assert_eq!(field.blocked_count(), 1);
        field.reset();
        assert_eq!(field.blocked_count(), 0);
        assert!(ObstacleField::from_cells(grid, vec![false; 5]).is_err());
    }

    #[test]
    fn seed_sequence_is_reproducible() {
        let mut first = SeedSequence::new(7);
        let mut second = SeedSequence::new(7);
        let a: Vec<u64> = (0..4).map(|_| first.next_seed()).collect();
        let b: Vec<u64> = (0..4).map(|_| second.next_seed()).collect();
        assert_eq!(a, b);
        assert_ne!(a[0], a[1]);
    }
}
