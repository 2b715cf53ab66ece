use std::{
    env, fs,
    io::{BufRead, BufReader, Write},
    net::{TcpListener, TcpStream},
    path::PathBuf,
    process, thread,
    time::{SystemTime, UNIX_EPOCH},
};

use torus_walk_core::SeedSequence;
use torus_walk_server::{
    session::{self, SessionEnd},
    EngineConfig, SharedEngine,
};
use torus_walk_world::Simulation;

const UNIFORM: &str = "0.25 0.25 0.25 0.25";

fn engine(seed: u64) -> SharedEngine {
    SharedEngine::new(EngineConfig::default(), Box::new(SeedSequence::new(seed)))
}

fn run_script(engine: &SharedEngine, script: &str) -> Vec<String> {
    let mut output = Vec::new();
    let _ = session::serve(engine, "RandomWalkServer", script.as_bytes(), &mut output)
        .expect("session");
    String::from_utf8(output)
        .expect("utf8")
        .lines()
        .map(str::to_owned)
        .collect()
}

fn scratch_dir() -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    env::temp_dir().join(format!("torus-walk-server-{}-{nanos}", process::id()))
}

fn cells(row: &str) -> Vec<&str> {
    row.split(' ').collect()
}

#[test]
fn open_grid_summaries_follow_protocol() {
    let engine = engine(11);
    let script = format!(
        "NEW_SIM 3 3 0 {UNIFORM} 50 100 result.txt\nGET_SUMMARY_AVG\nGET_SUMMARY_PROB\nQUIT\n"
    );

    let lines = run_script(&engine, &script);

    assert_eq!(lines[0], "HELLO RandomWalkServer");
    assert_eq!(lines[1], "OK NEW_SIM REPS=100");
    assert_eq!(lines[2], "OK SUMMARY_AVG H=3 W=3 REPS=100");
    assert_eq!(cells(&lines[4])[1], "0.0");
    for row in &lines[3..6] {
        assert_eq!(cells(row).len(), 3);
        for value in cells(row) {
            let value: f64 = value.parse().expect("mean");
            assert!(value >= 0.0);
        }
    }

    assert_eq!(lines[6], "OK SUMMARY_PROB H=3 W=3 K=50 REPS=100");
    assert_eq!(cells(&lines[8])[1], "1.00");
    for row in &lines[7..10] {
        for value in cells(row) {
            let value: f64 = value.parse().expect("probability");
            assert!((0.0..=1.0).contains(&value));
        }
    }
    assert_eq!(lines[10], "OK BYE");
    assert_eq!(lines.len(), 11);
}

#[test]
fn summaries_are_idempotent() {
    let engine = engine(3);
    let _ = run_script(&engine, &format!("NEW_SIM 4 5 0 {UNIFORM} 8 20 r.txt\n"));

    let first = run_script(&engine, "GET_SUMMARY_AVG\nGET_SUMMARY_PROB\n");
    let second = run_script(&engine, "GET_SUMMARY_AVG\nGET_SUMMARY_PROB\n");

    assert_eq!(first, second);
    assert_eq!(first.len(), 1 + 2 * (1 + 4));
}

#[test]
fn dense_obstacles_are_connected_or_reported() {
    let engine = engine(5);
    let lines = run_script(
        &engine,
        &format!("NEW_SIM 5 5 1 {UNIFORM} 10 5 r.txt 0.5\nGET_SUMMARY_AVG\n"),
    );

    if lines[1] == "OK NEW_SIM REPS=5" {
        let snapshot = engine.snapshot().expect("simulation");
        assert!(snapshot.obstacle_mode);
        assert!(Simulation::restore(snapshot).is_ok());
        assert!(!cells(&lines[5])[2].starts_with('X'));
    } else {
        assert!(lines[1].starts_with("ERR "), "unexpected {}", lines[1]);
        assert_eq!(lines[2], "ERR No simulation");
    }
}

#[test]
fn invalid_requests_report_errors_and_keep_state() {
    let engine = engine(8);
    let script = format!(
        "NEW_SIM 3 3 0 {UNIFORM} 5 4 r.txt\n\
         NEW_SIM 3 3 0 0.5 0.5 0.5 0.5 5 4 r.txt\n\
         RUN_MORE 0\n\
         RUN_MORE 2\n\
         RESUME_SIM /definitely/missing/state.txt 1 out.txt\n\
         RUN_MORE 1\n\
         SET_MODE 7\n\
         HELLO\n"
    );

    let lines = run_script(&engine, &script);

    assert_eq!(lines[1], "OK NEW_SIM REPS=4");
    assert!(lines[2].starts_with("ERR "), "{}", lines[2]);
    assert_eq!(lines[3], "ERR bad RUN_MORE params: reps must be positive");
    assert_eq!(lines[4], "OK RUN_MORE REPS=6");
    assert!(lines[5].starts_with("ERR could not read snapshot"), "{}", lines[5]);
    assert_eq!(lines[6], "OK RUN_MORE REPS=7");
    assert_eq!(lines[7], "ERR bad SET_MODE params: mode must be 0 or 1");
    assert_eq!(lines[8], "ERR Unknown command HELLO");
}

#[test]
fn zero_replications_are_rejected_without_replacing() {
    let engine = engine(9);
    let lines = run_script(
        &engine,
        &format!(
            "NEW_SIM 3 3 0 {UNIFORM} 5 3 r.txt\n\
             NEW_SIM 4 4 0 {UNIFORM} 5 0 r.txt\n\
             RESUME_SIM state.txt 0 out.txt\n\
             GET_SUMMARY_AVG\n"
        ),
    );

    assert_eq!(lines[1], "OK NEW_SIM REPS=3");
    assert_eq!(lines[2], "ERR bad NEW_SIM params: reps must be positive");
    assert_eq!(lines[3], "ERR bad RESUME_SIM params: reps must be positive");
    assert_eq!(lines[4], "OK SUMMARY_AVG H=3 W=3 REPS=3");
}

#[test]
fn ended_simulation_can_be_resumed() {
    let dir = scratch_dir();
    let first = dir.join("first/state.txt");
    let second = dir.join("second.txt");
    let engine = engine(21);

    let lines = run_script(
        &engine,
        &format!(
            "NEW_SIM 4 4 1 {UNIFORM} 6 10 {} 0.2\nEND_SIM\nRUN_MORE 1\nRESUME_SIM {} 5 {}\nGET_SUMMARY_PROB\nEND_SIM\n",
            first.display(),
            first.display(),
            second.display()
        ),
    );

    assert_eq!(lines[1], "OK NEW_SIM REPS=10");
    assert_eq!(lines[2], "OK END_SIM");
    assert_eq!(lines[3], "ERR No simulation");
    assert_eq!(lines[4], "OK RESUME_SIM REPS=15");
    assert_eq!(lines[5], "OK SUMMARY_PROB H=4 W=4 K=6 REPS=15");
    assert_eq!(lines[10], "OK END_SIM");

    let saved = torus_walk_snapshot::load(&second).expect("second snapshot");
    assert_eq!(saved.replications_done, 15);
    let original = torus_walk_snapshot::load(&first).expect("first snapshot");
    assert_eq!(original.replications_done, 10);
    assert_eq!(original.obstacles, saved.obstacles);

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn concurrent_sessions_see_whole_commands() {
    let engine = engine(13);
    let _ = run_script(&engine, &format!("NEW_SIM 6 6 0 {UNIFORM} 12 1 r.txt\n"));

    let engine = &engine;
    let outputs: Vec<Vec<String>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(move || {
                    run_script(
                        engine,
                        "RUN_MORE 5\nGET_SUMMARY_AVG\nRUN_MORE 5\nGET_SUMMARY_PROB\nQUIT\n",
                    )
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("session thread"))
            .collect()
    });

    for lines in &outputs {
        assert_eq!(lines.len(), 1 + 1 + 7 + 1 + 7 + 1);
        assert!(lines[1].starts_with("OK RUN_MORE REPS="));
        assert!(lines[2].starts_with("OK SUMMARY_AVG H=6 W=6 REPS="));
        for row in &lines[3..9] {
            assert_eq!(cells(row).len(), 6);
        }
        assert!(lines[10].starts_with("OK SUMMARY_PROB H=6 W=6 K=12 REPS="));
        assert_eq!(lines[17], "OK BYE");
    }
    assert_eq!(engine.snapshot().expect("simulation").replications_done, 41);
}

#[test]
fn tcp_connection_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let address = listener.local_addr().expect("address");
    let server = thread::spawn(move || {
        let engine = engine(1);
        let (stream, _) = listener.accept().expect("accept");
        let reader = BufReader::new(stream.try_clone().expect("clone"));
        session::serve(&engine, "RandomWalkServer", reader, stream).expect("session")
    });

    let mut client = TcpStream::connect(address).expect("connect");
    client
        .write_all(format!("NEW_SIM 3 3 0 {UNIFORM} 4 2 r.txt\r\nQUIT\r\n").as_bytes())
        .expect("write");
    let lines: Vec<String> = BufReader::new(client)
        .lines()
        .collect::<Result<_, _>>()
        .expect("read");

    assert_eq!(lines, vec!["HELLO RandomWalkServer", "OK NEW_SIM REPS=2", "OK BYE"]);
    assert_eq!(server.join().expect("server thread"), SessionEnd::Quit);
}
