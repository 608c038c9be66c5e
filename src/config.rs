use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::raft::{NodeId, RaftConfig, RaftError, RotationConfig};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tick interval must be positive")]
    InvalidTickInterval,

    #[error(transparent)]
    Invalid(#[from] RaftError),
}

/// Cluster-wide settings shared by the simulation and the live runner.
/// Node ids are `1..=nodes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub nodes: u64,
    pub tick_interval_ms: u64,
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub rotation: Option<RotationConfig>,
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nodes: 5,
            tick_interval_ms: 1000,
            election_timeout_min_ms: 3000,
            election_timeout_max_ms: 5999,
            rotation: Some(RotationConfig {
                lease_ms: 5000,
                cool_down_ms: 5000,
            }),
            seed: None,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        (1..=self.nodes).collect()
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn raft_config(&self, node_id: NodeId) -> RaftConfig {
        let mut config = RaftConfig::new(node_id)
            .with_peers(self.node_ids())
            .with_election_timeout(self.election_timeout_min_ms, self.election_timeout_max_ms);
        config.rotation = self.rotation;
        config
    }

    /// Checks everything a driver needs before it starts. A cluster of zero
    /// nodes is rejected here rather than discovered later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes == 0 {
            return Err(RaftError::EmptyCluster.into());
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidTickInterval);
        }
        // Every node shares the same settings, so one check covers them all
        self.raft_config(1).validate()?;
        Ok(())
    }
}
