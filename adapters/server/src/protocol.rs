//! Request parsing and response rendering for the line protocol.
//!
//! Each request is one line: a keyword followed by whitespace separated
//! arguments. Every response starts with `OK` or `ERR`; summaries add one line
//! per grid row after the header.

use std::{
    fmt,
    io::{self, Write},
    path::PathBuf,
    str::FromStr,
};

use thiserror::Error;
use torus_walk_core::{
    DisplayMode, GridSize, MoveProbabilities, ObstacleMode, StepBudget, SummaryKind,
    ValidationError,
};
use torus_walk_world::query::SummaryView;

/// Lines that could not be mapped to a request.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The keyword is not part of the protocol.
    #[error("Unknown command {0}")]
    UnknownCommand(String),
    /// The request line did not end within the byte limit.
    #[error("Request line exceeds {limit} bytes")]
    LineTooLong {
        /// Longest accepted line, terminator included.
        limit: u64,
    },
}

/// Arguments of `NEW_SIM`.
#[derive(Clone, Debug, PartialEq)]
pub struct NewSimulation {
    /// Dimensions of the torus.
    pub grid: GridSize,
    /// Whether obstacles are generated.
    pub obstacle_mode: ObstacleMode,
    /// Move probabilities, validated when the simulation is built.
    pub probabilities: MoveProbabilities,
    /// Step budget K.
    pub step_budget: StepBudget,
    /// Replications to run right away, always positive.
    pub replications: u32,
    /// Snapshot path used when the simulation ends.
    pub result_path: PathBuf,
    /// Obstacle density overriding the server default.
    pub density: Option<f64>,
}

/// Parsed protocol request.
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    /// Replace the simulation with a fresh one.
    NewSim(NewSimulation),
    /// Replace the simulation with one loaded from a snapshot.
    ResumeSim {
        /// Snapshot to load.
        path: PathBuf,
        /// Replications to run after loading, always positive.
        replications: u32,
        /// Snapshot path used when the simulation ends.
        result_path: PathBuf,
    },
    /// Run more replications on the live simulation.
    RunMore {
        /// Replications to run, always positive.
        replications: u32,
    },
    /// Change the display flag.
    SetMode(DisplayMode),
    /// Emit a summary table.
    Summary(SummaryKind),
    /// Snapshot and discard the live simulation.
    EndSim,
    /// Close the session.
    Quit,
}

impl Request {
    /// Protocol keyword of the request.
    #[must_use]
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::NewSim(_) => "NEW_SIM",
            Self::ResumeSim { .. } => "RESUME_SIM",
            Self::RunMore { .. } => "RUN_MORE",
            Self::SetMode(_) => "SET_MODE",
            Self::Summary(SummaryKind::MeanSteps) => "GET_SUMMARY_AVG",
            Self::Summary(SummaryKind::HitProbability) => "GET_SUMMARY_PROB",
            Self::EndSim => "END_SIM",
            Self::Quit => "QUIT",
        }
    }
}

/// Parses a single request line. Trailing line terminators are ignored.
pub fn parse(line: &str) -> Result<Request, crate::SessionError> {
    let line = line.trim_end_matches(&['\r', '\n'][..]);
    let mut tokens = line.split_whitespace();
    let keyword = tokens.next().unwrap_or_default();
    let arguments: Vec<&str> = tokens.collect();

    let request = match keyword {
        "NEW_SIM" => Request::NewSim(parse_new_sim(&arguments)?),
        "RESUME_SIM" => {
            let args = Arguments::new("RESUME_SIM", &arguments, 3, 3)?;
            Request::ResumeSim {
                path: PathBuf::from(args.token(0)),
                replications: args.replications(1)?,
                result_path: PathBuf::from(args.token(2)),
            }
        }
        "RUN_MORE" => {
            let args = Arguments::new("RUN_MORE", &arguments, 1, 1)?;
            Request::RunMore {
                replications: args.replications(0)?,
            }
        }
        "SET_MODE" => {
            let args = Arguments::new("SET_MODE", &arguments, 1, 1)?;
            match args.token(0) {
                "0" => Request::SetMode(DisplayMode::Summary),
                "1" => Request::SetMode(DisplayMode::Interactive),
                _ => return Err(args.invalid("mode must be 0 or 1").into()),
            }
        }
        "GET_SUMMARY_AVG" => Request::Summary(SummaryKind::MeanSteps),
        "GET_SUMMARY_PROB" => Request::Summary(SummaryKind::HitProbability),
        "END_SIM" => Request::EndSim,
        "QUIT" => Request::Quit,
        other => return Err(ProtocolError::UnknownCommand(other.to_owned()).into()),
    };

    Ok(request)
}

fn parse_new_sim(arguments: &[&str]) -> Result<NewSimulation, ValidationError> {
    let args = Arguments::new("NEW_SIM", arguments, 10, 11)?;

    let grid = GridSize::new(args.number(0, "height")?, args.number(1, "width")?)?;
    let obstacle_mode = match args.token(2) {
        "0" => ObstacleMode::Disabled,
        "1" => ObstacleMode::Enabled,
        _ => return Err(args.invalid("obstacle mode must be 0 or 1")),
    };
    let probabilities = MoveProbabilities::new(
        args.number(3, "pU")?,
        args.number(4, "pD")?,
        args.number(5, "pL")?,
        args.number(6, "pR")?,
    );
    let step_budget = StepBudget::new(args.number(7, "K")?)?;
    let replications = args.replications(8)?;
    let result_path = PathBuf::from(args.token(9));
    let density = match args.optional(10) {
        Some(_) => {
            let density: f64 = args.number(10, "density")?;
            if !density.is_finite() {
                return Err(ValidationError::Density(density));
            }
            Some(density)
        }
        None => None,
    };

    Ok(NewSimulation {
        grid,
        obstacle_mode,
        probabilities,
        step_budget,
        replications,
        result_path,
        density,
    })
}

struct Arguments<'a> {
    command: &'static str,
    tokens: &'a [&'a str],
}

impl<'a> Arguments<'a> {
    fn new(
        command: &'static str,
        tokens: &'a [&'a str],
        min: usize,
        max: usize,
    ) -> Result<Self, ValidationError> {
        let args = Self { command, tokens };
        if tokens.len() < min || tokens.len() > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{min} to {max}")
            };
            return Err(args.invalid(&format!(
                "expected {expected} arguments, got {}",
                tokens.len()
            )));
        }
        Ok(args)
    }

    fn token(&self, index: usize) -> &'a str {
        self.tokens.get(index).copied().unwrap_or_default()
    }

    fn optional(&self, index: usize) -> Option<&'a str> {
        self.tokens.get(index).copied()
    }

    fn number<T: FromStr>(&self, index: usize, name: &str) -> Result<T, ValidationError> {
        let token = self.token(index);
        token
            .parse()
            .map_err(|_| self.invalid(&format!("{name} '{token}' is not a valid number")))
    }

    fn replications(&self, index: usize) -> Result<u32, ValidationError> {
        match self.number(index, "reps")? {
            0 => Err(self.invalid("reps must be positive")),
            replications => Ok(replications),
        }
    }

    fn invalid(&self, detail: &str) -> ValidationError {
        ValidationError::Arguments {
            command: self.command,
            detail: detail.to_owned(),
        }
    }
}

/// Successful single-line responses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// Greeting sent when a session opens.
    Hello {
        /// Announced server name.
        server_name: String,
    },
    /// A request that ran replications finished.
    Replicated {
        /// Keyword of the request.
        command: &'static str,
        /// Replications completed by the simulation.
        replications_done: u64,
    },
    /// The display flag changed.
    ModeSet,
    /// The simulation was ended.
    Ended,
    /// The session is closing.
    Bye,
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hello { server_name } => write!(f, "HELLO {server_name}"),
            Self::Replicated {
                command,
                replications_done,
            } => write!(f, "OK {command} REPS={replications_done}"),
            Self::ModeSet => f.write_str("OK SET_MODE"),
            Self::Ended => f.write_str("OK END_SIM"),
            Self::Bye => f.write_str("OK BYE"),
        }
    }
}

/// Writes a summary header followed by one line per grid row.
///
/// Mean steps use one decimal, hit probabilities two; obstacles are written as
/// `X`.
pub fn write_summary<W: Write + ?Sized>(out: &mut W, summary: &SummaryView) -> io::Result<()> {
    let grid = summary.grid();
    match summary.kind() {
        SummaryKind::MeanSteps => writeln!(
            out,
            "OK SUMMARY_AVG H={} W={} REPS={}",
            grid.height(),
            grid.width(),
            summary.replications()
        )?,
        SummaryKind::HitProbability => writeln!(
            out,
            "OK SUMMARY_PROB H={} W={} K={} REPS={}",
            grid.height(),
            grid.width(),
            summary.step_budget().get(),
            summary.replications()
        )?,
    }

    let precision: usize = match summary.kind() {
        SummaryKind::MeanSteps => 1,
        SummaryKind::HitProbability => 2,
    };
    let mut line = String::new();
    for row in summary.rows() {
        line.clear();
        for (column, value) in row.iter().enumerate() {
            if column > 0 {
                line.push(' ');
            }
            match value {
                Some(value) => line.push_str(&format!("{value:.precision$}")),
                None => line.push('X'),
            }
        }
        writeln!(out, "{line}")?;
    }
    Ok(())
}
