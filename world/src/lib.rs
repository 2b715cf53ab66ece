#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative simulation state for the torus walk engine.
//!
//! The [`Simulation`] owns the grid, the optional obstacle field, the walk
//! parameters and the per-cell accumulators. It is only mutated through
//! [`apply`]; everything else reads it through the [`query`] module.

pub mod connectivity;

use std::path::PathBuf;

use thiserror::Error;
use torus_walk_core::{
    try_cell_vec, AllocationError, Command, Event, GridSize, MoveProbabilities, ObstacleField,
    StepBudget, SweepRejection, ValidationError, WalkOutcome,
};

/// Parameters describing a fresh simulation.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationParams {
    /// Dimensions of the torus.
    pub grid: GridSize,
    /// Move probabilities in up, down, left, right order.
    pub probabilities: MoveProbabilities,
    /// Step budget K for the hit metric.
    pub step_budget: StepBudget,
    /// Advisory path used when the simulation is ended.
    pub result_path: Option<PathBuf>,
}

/// Plain-data image of a simulation, used for persistence.
///
/// The obstacle bitmap is always present and holds one entry per cell; it is
/// all clear when `obstacle_mode` is off.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationSnapshot {
    /// Dimensions of the torus.
    pub grid: GridSize,
    /// Whether the simulation runs with obstacles.
    pub obstacle_mode: bool,
    /// Step budget K.
    pub step_budget: StepBudget,
    /// Move probabilities.
    pub probabilities: MoveProbabilities,
    /// High-water mark of completed replications.
    pub replications_max: u64,
    /// Completed replications.
    pub replications_done: u64,
    /// Row-major obstacle bitmap.
    pub obstacles: Vec<bool>,
    /// Row-major per-cell step sums.
    pub steps_sum: Vec<u64>,
    /// Row-major per-cell hit counts.
    pub hits_sum: Vec<u64>,
}

/// Reasons a simulation could not be built.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SimulationError {
    /// Parameters or restored data were inconsistent.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The per-cell arrays could not be allocated.
    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

/// Represents the authoritative simulation state.
#[derive(Clone, Debug, PartialEq)]
pub struct Simulation {
    grid: GridSize,
    obstacles: Option<ObstacleField>,
    probabilities: MoveProbabilities,
    step_budget: StepBudget,
    steps_sum: Vec<u64>,
    hits_sum: Vec<u64>,
    replications_done: u64,
    replications_max: u64,
    result_path: Option<PathBuf>,
}

impl Simulation {
    /// Creates an empty simulation with zeroed accumulators.
    ///
    /// `obstacles` selects the obstacle mode; a provided field must match the
    /// grid, keep the center open and leave every open cell connected to it.
    pub fn new(
        params: SimulationParams,
        obstacles: Option<ObstacleField>,
    ) -> Result<Self, SimulationError> {
        params.probabilities.validate()?;
        if let Some(field) = &obstacles {
            check_field(params.grid, field)?;
        }

        let cell_count = params.grid.cell_count();
        Ok(Self {
            grid: params.grid,
            obstacles,
            probabilities: params.probabilities,
            step_budget: params.step_budget,
            steps_sum: try_cell_vec(cell_count, 0)?,
            hits_sum: try_cell_vec(cell_count, 0)?,
            replications_done: 0,
            replications_max: 0,
            result_path: params.result_path,
        })
    }

    /// Rebuilds a simulation from a persisted snapshot.
    ///
    /// Move probabilities are not validated here; a restored simulation with
    /// an invalid vector refuses to run instead.
    /// The obstacle bitmap is ignored when the snapshot has obstacles
    /// disabled.
    pub fn restore(snapshot: SimulationSnapshot) -> Result<Self, SimulationError> {
        let cell_count = snapshot.grid.cell_count();
        for (what, actual) in [
            ("step sums", snapshot.steps_sum.len()),
            ("hit sums", snapshot.hits_sum.len()),
        ] {
            if actual != cell_count {
                return Err(ValidationError::CellCount {
                    what,
                    expected: cell_count,
                    actual,
                }
                .into());
            }
        }

        let obstacles = if snapshot.obstacle_mode {
            let field = ObstacleField::from_cells(snapshot.grid, snapshot.obstacles)?;
            check_field(snapshot.grid, &field)?;
            Some(field)
        } else {
            None
        };

        Ok(Self {
            grid: snapshot.grid,
            obstacles,
            probabilities: snapshot.probabilities,
            step_budget: snapshot.step_budget,
            steps_sum: snapshot.steps_sum,
            hits_sum: snapshot.hits_sum,
            replications_done: snapshot.replications_done,
            replications_max: snapshot.replications_max,
            result_path: None,
        })
    }

    fn record_sweep(&mut self, outcomes: &[Option<WalkOutcome>]) -> Result<(), SweepRejection> {
        let expected = self.grid.cell_count();
        if outcomes.len() != expected {
            return Err(SweepRejection::LengthMismatch {
                expected,
                actual: outcomes.len(),
            });
        }

        for (index, outcome) in outcomes.iter().enumerate() {
            let blocked = self.is_blocked_index(index);
            match (blocked, outcome) {
                (true, Some(_)) => return Err(SweepRejection::OutcomeOnObstacle { index }),
                (false, None) => return Err(SweepRejection::MissingOutcome { index }),
                _ => {}
            }
        }

        for (index, outcome) in outcomes.iter().enumerate() {
            let Some(outcome) = outcome else {
                continue;
            };
            self.steps_sum[index] = self.steps_sum[index].saturating_add(outcome.steps);
            self.hits_sum[index] = self.hits_sum[index].saturating_add(u64::from(outcome.hit));
        }

        self.replications_done = self.replications_done.saturating_add(1);
        self.replications_max = self.replications_max.max(self.replications_done);
        Ok(())
    }

    fn is_blocked_index(&self, index: usize) -> bool {
        self.obstacles
            .as_ref()
            .and_then(|field| field.cells().get(index).copied())
            .unwrap_or(false)
    }
}

fn check_field(grid: GridSize, field: &ObstacleField) -> Result<(), ValidationError> {
    if field.grid() != grid {
        return Err(ValidationError::CellCount {
            what: "obstacle bitmap",
            expected: grid.cell_count(),
            actual: field.grid().cell_count(),
        });
    }
    connectivity::check_connected(field)
}

/// Applies the provided command to the simulation.
pub fn apply(simulation: &mut Simulation, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::RecordSweep { outcomes } => match simulation.record_sweep(&outcomes) {
            Ok(()) => out_events.push(Event::SweepRecorded {
                replications_done: simulation.replications_done,
            }),
            Err(reason) => out_events.push(Event::SweepRejected { reason }),
        },
        Command::SetResultPath { path } => {
            simulation.result_path = path;
            out_events.push(Event::ResultPathChanged);
        }
    }
}

/// Query functions that provide read-only access to the simulation.
pub mod query {
    use std::path::Path;

    use super::{Simulation, SimulationSnapshot};
    use torus_walk_core::{
        CellCoord, GridSize, MoveProbabilities, ObstacleField, StepBudget, SummaryKind, WalkView,
    };

    /// Dimensions of the simulated torus.
    #[must_use]
    pub fn grid(simulation: &Simulation) -> GridSize {
        simulation.grid
    }

    /// Obstacle field, if the simulation runs with obstacles.
    #[must_use]
    pub fn obstacles(simulation: &Simulation) -> Option<&ObstacleField> {
        simulation.obstacles.as_ref()
    }

    /// Reports whether the cell is an obstacle.
    #[must_use]
    pub fn is_blocked(simulation: &Simulation, cell: CellCoord) -> bool {
        simulation
            .obstacles
            .as_ref()
            .map_or(false, |field| field.is_blocked(cell))
    }

    /// Move probabilities in up, down, left, right order.
    #[must_use]
    pub fn probabilities(simulation: &Simulation) -> MoveProbabilities {
        simulation.probabilities
    }

    /// Step budget K.
    #[must_use]
    pub fn step_budget(simulation: &Simulation) -> StepBudget {
        simulation.step_budget
    }

    /// Completed replications.
    #[must_use]
    pub fn replications_done(simulation: &Simulation) -> u64 {
        simulation.replications_done
    }

    /// High-water mark of completed replications.
    #[must_use]
    pub fn replications_max(simulation: &Simulation) -> u64 {
        simulation.replications_max
    }

    /// Advisory result path, if one was configured.
    #[must_use]
    pub fn result_path(simulation: &Simulation) -> Option<&Path> {
        simulation.result_path.as_deref()
    }

    /// Per-cell step sums in row-major order.
    #[must_use]
    pub fn steps_sum(simulation: &Simulation) -> &[u64] {
        &simulation.steps_sum
    }

    /// Per-cell hit counts in row-major order.
    #[must_use]
    pub fn hits_sum(simulation: &Simulation) -> &[u64] {
        &simulation.hits_sum
    }

    /// Captures the view a walker needs to sample walks.
    #[must_use]
    pub fn walk_view(simulation: &Simulation) -> WalkView<'_> {
        WalkView::new(
            simulation.grid,
            simulation.obstacles.as_ref(),
            simulation.probabilities,
            simulation.step_budget,
        )
    }

    /// Computes the per-cell summary statistic.
    #[must_use]
    pub fn summary(simulation: &Simulation, kind: SummaryKind) -> SummaryView {
        let sums = match kind {
            SummaryKind::MeanSteps => &simulation.steps_sum,
            SummaryKind::HitProbability => &simulation.hits_sum,
        };
        let replications = simulation.replications_done;

        let values = sums
            .iter()
            .enumerate()
            .map(|(index, sum)| {
                if simulation.is_blocked_index(index) {
                    None
                } else if replications == 0 {
                    Some(0.0)
                } else {
                    Some(*sum as f64 / replications as f64)
                }
            })
            .collect();

        SummaryView {
            kind,
            grid: simulation.grid,
            step_budget: simulation.step_budget,
            replications,
            values,
        }
    }

    /// Captures a persistable image of the simulation.
    #[must_use]
    pub fn snapshot(simulation: &Simulation) -> SimulationSnapshot {
        let obstacles = match &simulation.obstacles {
            Some(field) => field.cells().to_vec(),
            None => vec![false; simulation.grid.cell_count()],
        };

        SimulationSnapshot {
            grid: simulation.grid,
            obstacle_mode: simulation.obstacles.is_some(),
            step_budget: simulation.step_budget,
            probabilities: simulation.probabilities,
            replications_max: simulation.replications_max,
            replications_done: simulation.replications_done,
            obstacles,
            steps_sum: simulation.steps_sum.clone(),
            hits_sum: simulation.hits_sum.clone(),
        }
    }

    /// Per-cell summary statistic captured at a single point in time.
    #[derive(Clone, Debug, PartialEq)]
    pub struct SummaryView {
        kind: SummaryKind,
        grid: GridSize,
        step_budget: StepBudget,
        replications: u64,
        values: Vec<Option<f64>>,
    }

    impl SummaryView {
        /// Statistic held by the view.
        #[must_use]
        pub fn kind(&self) -> SummaryKind {
            self.kind
        }

        /// Grid the statistic covers.
        #[must_use]
        pub fn grid(&self) -> GridSize {
            self.grid
        }

        /// Step budget the hit probability refers to.
        #[must_use]
        pub fn step_budget(&self) -> StepBudget {
            self.step_budget
        }

        /// Replications the statistic averages over.
        #[must_use]
        pub fn replications(&self) -> u64 {
            self.replications
        }

        /// Value for a single cell; `None` marks an obstacle.
        #[must_use]
        pub fn value(&self, cell: CellCoord) -> Option<f64> {
            self.grid
                .index(cell)
                .and_then(|index| self.values.get(index).copied().flatten())
        }

        /// Rows of the grid in order, each holding one value per column.
        pub fn rows(&self) -> impl Iterator<Item = &[Option<f64>]> {
            self.values.chunks(self.grid.width() as usize)
        }
    }
}
