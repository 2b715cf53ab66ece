#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Line-oriented text format for persisting simulations.
//!
//! A snapshot starts with the [`SNAPSHOT_MARKER`] line followed by the header
//! (dimensions, obstacle mode, step budget, move probabilities and replication
//! counters), one row of `0`/`1` digits per grid row for the obstacle bitmap,
//! and finally the step sums and hit sums as whitespace separated rows.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    str::{FromStr, Lines},
};

use thiserror::Error;
use torus_walk_core::{GridSize, MoveProbabilities, StepBudget, ValidationError};
use torus_walk_world::SimulationSnapshot;

/// First line of every snapshot.
pub const SNAPSHOT_MARKER: &str = "DWALK1";

/// Errors that can occur while reading or writing snapshots.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The snapshot file could not be read.
    #[error("could not read snapshot {}: {source}", .path.display())]
    Read {
        /// File that was accessed.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The snapshot file could not be written.
    #[error("could not write snapshot {}: {source}", .path.display())]
    Write {
        /// File that was accessed.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The first line did not carry the expected marker.
    #[error("snapshot marker '{0}' is not supported")]
    BadMarker(String),
    /// A header line did not hold the expected values.
    #[error("malformed snapshot header: {field}")]
    Header {
        /// Header field that failed to parse.
        field: &'static str,
    },
    /// An obstacle row had the wrong length, a symbol other than `0`/`1`, or
    /// a blocked cell while obstacles are disabled.
    #[error("obstacle row {row} is malformed")]
    ObstacleRow {
        /// Zero-based row index.
        row: u32,
    },
    /// A row of accumulators had the wrong number of values or a malformed one.
    #[error("{what} row {row} is malformed")]
    ValueRow {
        /// Section holding the row.
        what: &'static str,
        /// Zero-based row index.
        row: u32,
    },
    /// The input ended before the named section was complete.
    #[error("snapshot ended inside the {0}")]
    Truncated(&'static str),
    /// Non-blank input followed the last section.
    #[error("unexpected data after the hit sums")]
    TrailingData,
    /// Header values were out of range.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Renders the snapshot in the text format.
#[must_use]
pub fn encode(snapshot: &SimulationSnapshot) -> String {
    Encoded(snapshot).to_string()
}

struct Encoded<'a>(&'a SimulationSnapshot);

impl fmt::Display for Encoded<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.0;
        let grid = snapshot.grid;
        let width = grid.width() as usize;
        let [up, down, left, right] = snapshot.probabilities.as_array();

        writeln!(f, "{SNAPSHOT_MARKER}")?;
        writeln!(f, "{} {}", grid.height(), grid.width())?;
        writeln!(f, "{}", u8::from(snapshot.obstacle_mode))?;
        writeln!(f, "{}", snapshot.step_budget.get())?;
        writeln!(f, "{up} {down} {left} {right}")?;
        writeln!(
            f,
            "{} {}",
            snapshot.replications_max, snapshot.replications_done
        )?;

        for row in snapshot.obstacles.chunks(width) {
            for blocked in row {
                f.write_str(if *blocked { "1" } else { "0" })?;
            }
            writeln!(f)?;
        }

        for sums in [&snapshot.steps_sum, &snapshot.hits_sum] {
            for row in sums.chunks(width) {
                for (column, value) in row.iter().enumerate() {
                    if column > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{value}")?;
                }
                writeln!(f)?;
            }
        }

        Ok(())
    }
}

/// Parses a snapshot from its text form.
///
/// Structural checks happen here; obstacle connectivity and accumulator
/// consistency are checked when the snapshot is restored into a simulation.
pub fn decode(text: &str) -> Result<SimulationSnapshot, SnapshotError> {
    let mut reader = Reader {
        lines: text.lines(),
    };

    let marker = reader.line("header")?.trim();
    if marker != SNAPSHOT_MARKER {
        return Err(SnapshotError::BadMarker(marker.to_owned()));
    }

    let [height, width] = reader.header::<u32, 2>("dimensions")?;
    let grid = GridSize::new(height, width)?;
    let [mode] = reader.header::<u8, 1>("obstacle mode")?;
    let obstacle_mode = match mode {
        0 => false,
        1 => true,
        _ => {
            return Err(SnapshotError::Header {
                field: "obstacle mode",
            })
        }
    };
    let [budget] = reader.header::<u32, 1>("step budget")?;
    let step_budget = StepBudget::new(budget)?;
    let [up, down, left, right] = reader.header::<f64, 4>("move probabilities")?;
    let [replications_max, replications_done] = reader.header::<u64, 2>("replication counters")?;
    if replications_done > replications_max {
        return Err(SnapshotError::Header {
            field: "replication counters",
        });
    }

    let obstacles = reader.obstacle_rows(grid, obstacle_mode)?;
    let steps_sum = reader.value_rows(grid, "step sums")?;
    let hits_sum = reader.value_rows(grid, "hit sums")?;

    if reader.lines.any(|line| !line.trim().is_empty()) {
        return Err(SnapshotError::TrailingData);
    }

    Ok(SimulationSnapshot {
        grid,
        obstacle_mode,
        step_budget,
        probabilities: MoveProbabilities::new(up, down, left, right),
        replications_max,
        replications_done,
        obstacles,
        steps_sum,
        hits_sum,
    })
}

/// Writes the snapshot to `path`, creating missing parent directories.
pub fn save(path: &Path, snapshot: &SimulationSnapshot) -> Result<(), SnapshotError> {
    let write_error = |source| SnapshotError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_error)?;
    }
    fs::write(path, encode(snapshot)).map_err(write_error)
}

/// Reads and decodes the snapshot stored at `path`.
pub fn load(path: &Path) -> Result<SimulationSnapshot, SnapshotError> {
    let text = fs::read_to_string(path).map_err(|source| SnapshotError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    decode(&text)
}

struct Reader<'a> {
    lines: Lines<'a>,
}

impl<'a> Reader<'a> {
    fn line(&mut self, section: &'static str) -> Result<&'a str, SnapshotError> {
        self.lines.next().ok_or(SnapshotError::Truncated(section))
    }

    fn header<T: FromStr + Copy + Default, const N: usize>(
        &mut self,
        field: &'static str,
    ) -> Result<[T; N], SnapshotError> {
        let line = self.line("header")?;
        let mut values = [T::default(); N];
        let mut tokens = line.split_whitespace();
        for slot in &mut values {
            *slot = tokens
                .next()
                .and_then(|token| token.parse().ok())
                .ok_or(SnapshotError::Header { field })?;
        }
        if tokens.next().is_some() {
            return Err(SnapshotError::Header { field });
        }
        Ok(values)
    }

    fn obstacle_rows(
        &mut self,
        grid: GridSize,
        obstacle_mode: bool,
    ) -> Result<Vec<bool>, SnapshotError> {
        let mut obstacles = Vec::new();
        for row in 0..grid.height() {
            let line = self.line("obstacle rows")?.trim();
            if line.len() != grid.width() as usize {
                return Err(SnapshotError::ObstacleRow { row });
            }
            for symbol in line.bytes() {
                match symbol {
                    b'0' => obstacles.push(false),
                    b'1' if obstacle_mode => obstacles.push(true),
                    _ => return Err(SnapshotError::ObstacleRow { row }),
                }
            }
        }
        Ok(obstacles)
    }

    fn value_rows(&mut self, grid: GridSize, what: &'static str) -> Result<Vec<u64>, SnapshotError> {
        let width = grid.width() as usize;
        let mut values = Vec::new();
        for row in 0..grid.height() {
            let line = self.line(what)?;
            let start = values.len();
            for token in line.split_whitespace() {
                let value = token
                    .parse()
                    .map_err(|_| SnapshotError::ValueRow { what, row })?;
                values.push(value);
            }
            if values.len() - start != width {
                return Err(SnapshotError::ValueRow { what, row });
            }
        }
        Ok(values)
    }
}
