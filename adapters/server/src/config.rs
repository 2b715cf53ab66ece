//! Server configuration loaded from TOML.

use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use torus_walk_system_obstacles::{Config as GenerationConfig, DEFAULT_MAX_ATTEMPTS};
use torus_walk_system_replication::Config as ReplicationConfig;

use crate::engine::EngineConfig;

/// Port the server listens on when nothing else is configured.
pub const DEFAULT_PORT: u16 = 5555;

/// Settings for the server binary and the engine it hosts.
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind: SocketAddr,
    /// Name announced in the greeting line.
    pub server_name: String,
    /// Obstacle density used when `NEW_SIM` does not pass one.
    pub default_density: f64,
    /// Candidate layouts the obstacle generator may draw per request.
    pub generation_attempts: u32,
    /// Steps after which a single walk is cut off.
    pub walk_step_cap: u64,
    /// Snapshot path used by `END_SIM` when the simulation has none.
    pub fallback_result_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            server_name: "RandomWalkServer".to_owned(),
            default_density: 0.2,
            generation_attempts: DEFAULT_MAX_ATTEMPTS,
            walk_step_cap: 10_000_000,
            fallback_result_path: PathBuf::from("result.txt"),
        }
    }
}

impl ServerConfig {
    /// Reads a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read server config at {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("invalid server config at {}", path.display()))
    }

    /// Parses a configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(contents).context("failed to parse server config toml contents")?;
        if !config.default_density.is_finite() {
            bail!("default_density must be a finite number");
        }
        if config.generation_attempts == 0 {
            bail!("generation_attempts must be positive");
        }
        if config.walk_step_cap == 0 {
            bail!("walk_step_cap must be positive");
        }
        let name = config.server_name.as_str();
        if name.trim().is_empty() || name.contains(|symbol: char| symbol == '\r' || symbol == '\n') {
            bail!("server_name must be a non-empty single line");
        }
        Ok(config)
    }

    /// Engine settings derived from this configuration.
    #[must_use]
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            generation: GenerationConfig::new(self.generation_attempts),
            replication: ReplicationConfig::new(self.walk_step_cap),
            default_density: self.default_density,
            fallback_result_path: self.fallback_result_path.clone(),
        }
    }
}
