#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Randomized obstacle placement that keeps every open cell connected to the
//! grid center.
//!
//! Candidate layouts are drawn cell by cell from a Bernoulli distribution and
//! accepted only when a breadth-first search from the center reaches every
//! open cell. The search is bounded; dense requests may legitimately exhaust
//! the attempt budget, which is reported as [`GenerationError::Exhausted`].

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Bernoulli, Distribution};
use thiserror::Error;
use torus_walk_core::{AllocationError, GridSize, ObstacleField, ObstacleMode, MAX_OBSTACLE_DENSITY};
use torus_walk_world::connectivity::{check_connected_with, ReachabilityField};

/// Attempt budget used when no explicit configuration is supplied.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5_000;

/// Configuration parameters required to construct the generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    max_attempts: u32,
}

impl Config {
    /// Creates a configuration bounding the number of candidate layouts.
    #[must_use]
    pub const fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    /// Maximum number of candidate layouts drawn per request.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

/// Accepted layout together with the number of candidates drawn to find it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    /// Generated field, `None` when obstacles are disabled.
    pub field: Option<ObstacleField>,
    /// Candidate layouts drawn, zero when obstacles are disabled.
    pub attempts: u32,
}

/// Reasons the generator could not produce a layout.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum GenerationError {
    /// The requested density was not a number.
    #[error("obstacle density {0} is not a number")]
    InvalidDensity(f64),
    /// The obstacle bitmap could not be allocated.
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    /// No connected layout was found within the attempt budget.
    #[error("no connected obstacle layout found in {attempts} attempts at density {density:.2}")]
    Exhausted {
        /// Candidate layouts drawn.
        attempts: u32,
        /// Density after clamping.
        density: f64,
    },
}

/// Clamps a requested density into the supported range.
#[must_use]
pub fn clamp_density(density: f64) -> f64 {
    density.clamp(0.0, MAX_OBSTACLE_DENSITY)
}

/// Generate-and-test obstacle generator.
#[derive(Debug, Default)]
pub struct ObstacleGenerator {
    config: Config,
    reachability: ReachabilityField,
}

impl ObstacleGenerator {
    /// Creates a generator using the supplied configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            reachability: ReachabilityField::new(),
        }
    }

    /// Produces an obstacle layout for the grid.
    ///
    /// Returns an empty layout without drawing anything when `mode` is
    /// [`ObstacleMode::Disabled`]. The same `seed` always yields the same
    /// layout.
    pub fn generate(
        &mut self,
        grid: GridSize,
        mode: ObstacleMode,
        density: f64,
        seed: u64,
    ) -> Result<Layout, GenerationError> {
        if mode == ObstacleMode::Disabled {
            return Ok(Layout {
                field: None,
                attempts: 0,
            });
        }

        if density.is_nan() {
            return Err(GenerationError::InvalidDensity(density));
        }

        let density = clamp_density(density);
        let bernoulli =
            Bernoulli::new(density).map_err(|_| GenerationError::InvalidDensity(density))?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut field = ObstacleField::clear(grid)?;
        let center = grid.center();

        for attempt in 1..=self.config.max_attempts {
            field.reset();
            for cell in grid.cells() {
                if cell == center {
                    continue;
                }
                if bernoulli.sample(&mut rng) {
                    field.set_blocked(cell, true);
                }
            }

            if check_connected_with(&field, &mut self.reachability).is_ok() {
                return Ok(Layout {
                    field: Some(field),
                    attempts: attempt,
                });
            }
        }

        Err(GenerationError::Exhausted {
            attempts: self.config.max_attempts,
            density,
        })
    }
}
