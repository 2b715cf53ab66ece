#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Session manager exposing the torus walk engine over a line protocol.
//!
//! A [`SharedEngine`] owns the single live simulation behind one mutex.
//! [`session::serve`] drives one connection: it greets the peer, parses each
//! request line, runs it against the engine and writes the response. The
//! session is generic over any buffered reader and writer; the binary wires it
//! to TCP streams with one thread per connection.

pub mod config;
pub mod engine;
pub mod protocol;
pub mod session;

use std::io;

use thiserror::Error;
use torus_walk_core::ValidationError;
use torus_walk_snapshot::SnapshotError;
use torus_walk_system_obstacles::GenerationError;
use torus_walk_system_replication::ReplicationError;
use torus_walk_world::SimulationError;

pub use config::ServerConfig;
pub use engine::{EngineConfig, SharedEngine};
pub use protocol::{ProtocolError, Request};

/// Requests that need a live simulation when none exists.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum StateError {
    /// No simulation has been created or resumed.
    #[error("No simulation")]
    NoSimulation,
}

/// Any failure a request can produce; rendered to the peer as `ERR <reason>`.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The request line could not be understood.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Request arguments were out of range.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The request needs a simulation.
    #[error(transparent)]
    State(#[from] StateError),
    /// The simulation could not be built or restored.
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    /// No connected obstacle layout was found.
    #[error(transparent)]
    Generation(#[from] GenerationError),
    /// Replications could not be run.
    #[error(transparent)]
    Replication(#[from] ReplicationError),
    /// A snapshot could not be read or written.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    /// The connection failed while a response was being written.
    #[error("connection error: {0}")]
    Io(#[from] io::Error),
}
