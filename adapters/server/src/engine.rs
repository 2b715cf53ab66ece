//! Process-wide simulation state guarded by a single lock.
//!
//! Every accessor takes the lock for its whole duration, including the
//! replications a request runs and the full summary it writes, so concurrent
//! sessions only ever observe whole requests. A poisoned lock is recovered:
//! sweeps commit atomically and replacements are swapped in only after they
//! are complete, so the state behind the lock is always consistent.

use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use torus_walk_core::{Command, DisplayMode, SeedSource, SummaryKind};
use torus_walk_snapshot::SnapshotError;
use torus_walk_system_obstacles::{Config as GenerationConfig, ObstacleGenerator};
use torus_walk_system_replication::{Config as ReplicationConfig, Replication};
use torus_walk_world::{self as world, query, Simulation, SimulationParams, SimulationSnapshot};

use crate::{
    protocol::{write_summary, NewSimulation},
    SessionError, StateError,
};

/// Engine settings shared by every session.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Obstacle generator bounds.
    pub generation: GenerationConfig,
    /// Replication settings, including the per-walk step cap.
    pub replication: ReplicationConfig,
    /// Obstacle density used when a request does not pass one.
    pub default_density: f64,
    /// Snapshot path used at the end of a simulation that has none.
    pub fallback_result_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            generation: GenerationConfig::default(),
            replication: ReplicationConfig::default(),
            default_density: 0.2,
            fallback_result_path: PathBuf::from("result.txt"),
        }
    }
}

/// Result of ending the live simulation.
#[derive(Debug)]
pub enum EndOutcome {
    /// There was nothing to end.
    NoSimulation,
    /// The simulation was saved and discarded.
    Saved {
        /// Snapshot file written.
        path: PathBuf,
    },
    /// The simulation was discarded but its snapshot could not be written.
    SaveFailed {
        /// Snapshot file attempted.
        path: PathBuf,
        /// Reason the write failed.
        error: SnapshotError,
    },
}

struct EngineState {
    simulation: Option<Simulation>,
    display_mode: DisplayMode,
    seeds: Box<dyn SeedSource>,
}

/// The single live simulation and its display flag, shared by all sessions.
pub struct SharedEngine {
    config: EngineConfig,
    state: Mutex<EngineState>,
}

impl SharedEngine {
    /// Creates an engine without a simulation.
    #[must_use]
    pub fn new(config: EngineConfig, seeds: Box<dyn SeedSource>) -> Self {
        Self {
            config,
            state: Mutex::new(EngineState {
                simulation: None,
                display_mode: DisplayMode::default(),
                seeds,
            }),
        }
    }

    /// Engine settings.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the live simulation with a fresh one and runs its initial
    /// replications. Returns the replications completed.
    ///
    /// The previous simulation is kept when any step fails.
    pub fn new_simulation(&self, request: NewSimulation) -> Result<u64, SessionError> {
        let mut state = self.lock();
        let generation_seed = state.seeds.next_seed();
        let run_seed = state.seeds.next_seed();

        let density = request.density.unwrap_or(self.config.default_density);
        let layout = ObstacleGenerator::new(self.config.generation).generate(
            request.grid,
            request.obstacle_mode,
            density,
            generation_seed,
        )?;

        let params = SimulationParams {
            grid: request.grid,
            probabilities: request.probabilities,
            step_budget: request.step_budget,
            result_path: Some(request.result_path),
        };
        let mut simulation = Simulation::new(params, layout.field)?;
        self.run_initial(&mut simulation, request.replications, run_seed)?;

        let replications_done = query::replications_done(&simulation);
        state.simulation = Some(simulation);
        Ok(replications_done)
    }

    /// Replaces the live simulation with one loaded from `path` and runs
    /// `replications` more. Returns the replications completed.
    ///
    /// The previous simulation is kept when any step fails.
    pub fn resume_simulation(
        &self,
        path: &Path,
        replications: u32,
        result_path: PathBuf,
    ) -> Result<u64, SessionError> {
        let mut state = self.lock();
        let run_seed = state.seeds.next_seed();

        let snapshot = torus_walk_snapshot::load(path)?;
        let mut simulation = Simulation::restore(snapshot)?;
        let mut events = Vec::new();
        world::apply(
            &mut simulation,
            Command::SetResultPath {
                path: Some(result_path),
            },
            &mut events,
        );
        self.run_initial(&mut simulation, replications, run_seed)?;

        let replications_done = query::replications_done(&simulation);
        state.simulation = Some(simulation);
        Ok(replications_done)
    }

    fn run_initial(
        &self,
        simulation: &mut Simulation,
        replications: u32,
        seed: u64,
    ) -> Result<(), SessionError> {
        let _ = Replication::new(self.config.replication).run(simulation, replications, seed)?;
        Ok(())
    }

    /// Runs more replications on the live simulation. Returns the
    /// replications completed.
    pub fn run_more(&self, replications: u32) -> Result<u64, SessionError> {
        let mut state = self.lock();
        let seed = state.seeds.next_seed();
        let simulation = state
            .simulation
            .as_mut()
            .ok_or(StateError::NoSimulation)?;

        let report = Replication::new(self.config.replication).run(simulation, replications, seed)?;
        Ok(report.replications_done)
    }

    /// Sets the display flag.
    pub fn set_display_mode(&self, mode: DisplayMode) {
        self.lock().display_mode = mode;
    }

    /// Current display flag.
    #[must_use]
    pub fn display_mode(&self) -> DisplayMode {
        self.lock().display_mode
    }

    /// Writes the requested summary table to `out` while holding the lock.
    pub fn write_summary<W: Write + ?Sized>(
        &self,
        kind: SummaryKind,
        out: &mut W,
    ) -> Result<(), SessionError> {
        let state = self.lock();
        let simulation = state
            .simulation
            .as_ref()
            .ok_or(StateError::NoSimulation)?;

        write_summary(out, &query::summary(simulation, kind))?;
        out.flush()?;
        Ok(())
    }

    /// Saves the live simulation to its result path, then discards it.
    ///
    /// The simulation is discarded even when the snapshot cannot be written.
    pub fn end_simulation(&self) -> EndOutcome {
        let mut state = self.lock();
        let Some(simulation) = state.simulation.take() else {
            return EndOutcome::NoSimulation;
        };

        let path = query::result_path(&simulation)
            .filter(|path| !path.as_os_str().is_empty())
            .map_or_else(|| self.config.fallback_result_path.clone(), Path::to_path_buf);
        match torus_walk_snapshot::save(&path, &query::snapshot(&simulation)) {
            Ok(()) => EndOutcome::Saved { path },
            Err(error) => EndOutcome::SaveFailed { path, error },
        }
    }

    /// Persistable image of the live simulation, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<SimulationSnapshot> {
        self.lock().simulation.as_ref().map(query::snapshot)
    }
}
