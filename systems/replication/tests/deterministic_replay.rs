use torus_walk_core::{GridSize, MoveProbabilities, ObstacleMode, SeedSequence, SeedSource, StepBudget};
use torus_walk_system_obstacles::ObstacleGenerator;
use torus_walk_system_replication::Replication;
use torus_walk_world::{query, Simulation, SimulationParams, SimulationSnapshot};

#[test]
fn deterministic_replay_produces_identical_state() {
    let first = replay(0x5eed);
    let second = replay(0x5eed);

    assert_eq!(first, second, "replay diverged between runs");
    assert_eq!(first.replications_done, 12);
}

#[test]
fn different_seeds_produce_different_sums() {
    let first = replay(1);
    let second = replay(2);

    assert_ne!(first.steps_sum, second.steps_sum);
}

fn replay(seed: u64) -> SimulationSnapshot {
    let mut seeds = SeedSequence::new(seed);
    let params = SimulationParams {
        grid: GridSize::new(6, 7).expect("grid"),
        probabilities: MoveProbabilities::new(0.3, 0.2, 0.25, 0.25),
        step_budget: StepBudget::new(15).expect("budget"),
        result_path: None,
    };
    let layout = ObstacleGenerator::default()
        .generate(params.grid, ObstacleMode::Enabled, 0.2, seeds.next_seed())
        .expect("layout");
    let mut simulation = Simulation::new(params, layout.field).expect("simulation");

    let replication = Replication::default();
    for additional in [5, 4, 3] {
        let _ = replication
            .run(&mut simulation, additional, seeds.next_seed())
            .expect("run");
    }

    query::snapshot(&simulation)
}
