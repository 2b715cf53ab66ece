#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Absorbing random walk sampler.

use rand::Rng;
use rand_distr::{Distribution, WeightedIndex};
use torus_walk_core::{CellCoord, Direction, ValidationError, WalkOutcome, WalkView};

/// Per-walk step cap used when no explicit configuration is supplied.
pub const DEFAULT_STEP_CAP: u64 = 10_000_000;

/// Configuration parameters required to construct a walker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    step_cap: u64,
}

impl Config {
    /// Creates a configuration that stops every walk after `step_cap` steps.
    #[must_use]
    pub const fn new(step_cap: u64) -> Self {
        Self { step_cap }
    }

    /// Maximum number of steps a single walk may take.
    #[must_use]
    pub const fn step_cap(&self) -> u64 {
        self.step_cap
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_STEP_CAP)
    }
}

/// Samples walks toward the grid center over a fixed simulation view.
///
/// Each step draws a direction from the move probabilities and attempts the
/// wrapped move; a move into an obstacle leaves the walker in place but still
/// costs a step. Walks that hit the step cap are cut off, reported as
/// truncated and never count as hits.
#[derive(Clone, Debug)]
pub struct Walker<'a> {
    view: WalkView<'a>,
    directions: WeightedIndex<f64>,
    step_cap: u64,
}

impl<'a> Walker<'a> {
    /// Prepares a walker, validating the view's move probabilities.
    pub fn new(view: WalkView<'a>, config: Config) -> Result<Self, ValidationError> {
        let probabilities = view.probabilities();
        probabilities.validate()?;

        let directions = WeightedIndex::new(probabilities.as_array()).map_err(|_| {
            ValidationError::Probabilities {
                probabilities: probabilities.as_array(),
            }
        })?;

        Ok(Self {
            view,
            directions,
            step_cap: config.step_cap,
        })
    }

    /// Simulates a single walk from `start` until it reaches the center.
    pub fn walk<R>(&self, start: CellCoord, rng: &mut R) -> WalkOutcome
    where
        R: Rng + ?Sized,
    {
        let grid = self.view.grid();
        let center = grid.center();
        if start == center {
            return WalkOutcome::ABSORBED_AT_START;
        }

        let mut cell = start;
        let mut steps: u64 = 0;
        while cell != center {
            if steps >= self.step_cap {
                return WalkOutcome {
                    steps,
                    hit: false,
                    truncated: true,
                };
            }

            let direction = Direction::ALL[self.directions.sample(rng)];
            let next = grid.step(cell, direction);
            if !self.view.is_blocked(next) {
                cell = next;
            }
            steps += 1;
        }

        WalkOutcome {
            steps,
            hit: self.view.step_budget().is_hit(steps),
            truncated: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use torus_walk_core::{GridSize, MoveProbabilities, ObstacleField, StepBudget};

    fn view(grid: GridSize, probabilities: MoveProbabilities, budget: u32) -> WalkView<'static> {
        WalkView::new(
            grid,
            None,
            probabilities,
            StepBudget::new(budget).expect("budget"),
        )
    }

    const ALWAYS_RIGHT: MoveProbabilities = MoveProbabilities::new(0.0, 0.0, 0.0, 1.0);

    #[test]
    fn walk_from_center_is_an_immediate_hit() {
        let grid = GridSize::new(5, 5).expect("grid");
        let walker = Walker::new(view(grid, MoveProbabilities::uniform(), 1), Config::default())
            .expect("walker");
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        assert_eq!(walker.walk(grid.center(), &mut rng), WalkOutcome::ABSORBED_AT_START);
    }

    #[test]
    fn deterministic_walk_wraps_around_the_edge() {
        // Center is column 2; starting at column 3 the walker wraps 3 -> 4 -> 0 -> 1 -> 2.
        let grid = GridSize::new(1, 5).expect("grid");
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        let within = Walker::new(view(grid, ALWAYS_RIGHT, 4), Config::default()).expect("walker");
        assert_eq!(
            within.walk(CellCoord::new(0, 3), &mut rng),
            WalkOutcome {
                steps: 4,
                hit: true,
                truncated: false
            }
        );

        let beyond = Walker::new(view(grid, ALWAYS_RIGHT, 3), Config::default()).expect("walker");
        assert_eq!(
            beyond.walk(CellCoord::new(0, 3), &mut rng),
            WalkOutcome {
                steps: 4,
                hit: false,
                truncated: false
            }
        );
    }

    #[test]
    fn obstacles_consume_a_step_without_moving() {
        // The walker pushes right into a wall it can never pass; only the cap ends the walk.
        let grid = GridSize::new(1, 5).expect("grid");
        let mut field = ObstacleField::clear(grid).expect("field");
        field.set_blocked(CellCoord::new(0, 4), true);
        let view = WalkView::new(
            grid,
            Some(&field),
            ALWAYS_RIGHT,
            StepBudget::new(100).expect("budget"),
        );
        let walker = Walker::new(view, Config::new(25)).expect("walker");
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        assert_eq!(
            walker.walk(CellCoord::new(0, 3), &mut rng),
            WalkOutcome {
                steps: 25,
                hit: false,
                truncated: true
            }
        );
    }

    #[test]
    fn step_cap_truncates_walks_as_misses() {
        let grid = GridSize::new(1, 5).expect("grid");
        let walker = Walker::new(view(grid, ALWAYS_RIGHT, 50), Config::new(2)).expect("walker");
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let outcome = walker.walk(CellCoord::new(0, 3), &mut rng);

        assert!(outcome.truncated);
        assert!(!outcome.hit);
        assert_eq!(outcome.steps, 2);
    }

    #[test]
    fn invalid_probabilities_are_rejected() {
        let grid = GridSize::new(3, 3).expect("grid");
        let skewed = MoveProbabilities::new(0.5, 0.5, 0.5, 0.5);

        assert!(Walker::new(view(grid, skewed, 5), Config::default()).is_err());
    }

    #[test]
    fn same_seed_replays_same_walks() {
        let grid = GridSize::new(7, 7).expect("grid");
        let walker = Walker::new(view(grid, MoveProbabilities::uniform(), 20), Config::default())
            .expect("walker");
        let mut first = ChaCha8Rng::seed_from_u64(99);
        let mut second = ChaCha8Rng::seed_from_u64(99);

        for cell in grid.cells() {
            assert_eq!(walker.walk(cell, &mut first), walker.walk(cell, &mut second));
        }
    }
}
