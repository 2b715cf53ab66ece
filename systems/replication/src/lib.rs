#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Replication controller that drives sweeps of walks and commits them to the
//! world.
//!
//! A sweep samples exactly one walk from every open cell and is handed to the
//! world as a single [`Command::RecordSweep`], so the accumulators only ever
//! observe whole replications.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use torus_walk_core::{
    try_cell_vec, AllocationError, Command, Event, SweepRejection, ValidationError, WalkOutcome,
};
use torus_walk_system_walker::{Config as WalkerConfig, Walker};
use torus_walk_world::{query, Simulation};

/// Configuration parameters required to construct the controller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Config {
    walker: WalkerConfig,
}

impl Config {
    /// Creates a configuration that caps every walk at `walk_step_cap` steps.
    #[must_use]
    pub const fn new(walk_step_cap: u64) -> Self {
        Self {
            walker: WalkerConfig::new(walk_step_cap),
        }
    }

    /// Per-walk step cap.
    #[must_use]
    pub const fn walk_step_cap(&self) -> u64 {
        self.walker.step_cap()
    }
}

/// Work performed by a single call to [`Replication::run`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Sweeps committed.
    pub sweeps: u32,
    /// Walks sampled across all sweeps.
    pub walks: u64,
    /// Walks stopped by the step cap.
    pub truncated_walks: u64,
    /// Replications completed by the simulation after the run.
    pub replications_done: u64,
}

/// Reasons a run could not be performed.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ReplicationError {
    /// Run arguments or simulation parameters were invalid.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The per-sweep outcome buffer could not be allocated.
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    /// The world refused a sweep.
    #[error("sweep rejected by the simulation: {reason:?}")]
    Rejected {
        /// Reason reported by the world.
        reason: SweepRejection,
    },
}

/// Runs replications against a simulation.
#[derive(Clone, Copy, Debug, Default)]
pub struct Replication {
    config: Config,
}

impl Replication {
    /// Creates a controller using the supplied configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Performs `additional` sweeps and commits each one to the simulation.
    ///
    /// Nothing is recorded when `additional` is zero or the move probabilities
    /// are invalid. The walks of the run are drawn from a single stream seeded
    /// with `seed`.
    pub fn run(
        &self,
        simulation: &mut Simulation,
        additional: u32,
        seed: u64,
    ) -> Result<RunReport, ReplicationError> {
        if additional == 0 {
            return Err(ValidationError::Replications.into());
        }
        query::probabilities(simulation).validate()?;

        let grid = query::grid(simulation);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut report = RunReport {
            replications_done: query::replications_done(simulation),
            ..RunReport::default()
        };
        let mut events = Vec::new();

        for _ in 0..additional {
            let mut outcomes: Vec<Option<WalkOutcome>> = try_cell_vec(grid.cell_count(), None)?;
            {
                let walker = Walker::new(query::walk_view(simulation), self.config.walker)?;
                for (slot, cell) in outcomes.iter_mut().zip(grid.cells()) {
                    if query::is_blocked(simulation, cell) {
                        continue;
                    }
                    let outcome = walker.walk(cell, &mut rng);
                    report.walks += 1;
                    report.truncated_walks += u64::from(outcome.truncated);
                    *slot = Some(outcome);
                }
            }

            events.clear();
            torus_walk_world::apply(simulation, Command::RecordSweep { outcomes }, &mut events);
            for event in events.drain(..) {
                match event {
                    Event::SweepRecorded { replications_done } => {
                        report.replications_done = replications_done;
                    }
                    Event::SweepRejected { reason } => {
                        return Err(ReplicationError::Rejected { reason });
                    }
                    Event::ResultPathChanged => {}
                }
            }
            report.sweeps += 1;
        }

        Ok(report)
    }
}
