use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{NodeId, RaftError};

/// Voluntary leadership rotation: a leader steps down after `lease_ms` and
/// sleeps for `cool_down_ms` before it may campaign again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationConfig {
    pub lease_ms: u64,
    pub cool_down_ms: u64,
}

impl RotationConfig {
    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_ms)
    }

    pub fn cool_down(&self) -> Duration {
        Duration::from_millis(self.cool_down_ms)
    }
}

#[derive(Debug, Clone)]
pub struct RaftConfig {
    pub node_id: NodeId,
    pub peers: Vec<NodeId>,
    pub election_timeout_min: u64, // in milliseconds
    pub election_timeout_max: u64, // in milliseconds, inclusive
    pub rotation: Option<RotationConfig>,
}

impl RaftConfig {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            peers: Vec::new(),
            election_timeout_min: 3000,
            election_timeout_max: 5999,
            rotation: None,
        }
    }

    pub fn add_peer(&mut self, peer_id: NodeId) {
        self.peers.push(peer_id);
    }

    pub fn with_peers(mut self, peers: impl IntoIterator<Item = NodeId>) -> Self {
        self.peers.extend(peers.into_iter().filter(|&p| p != self.node_id));
        self
    }

    pub fn with_election_timeout(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.election_timeout_min = min_ms;
        self.election_timeout_max = max_ms;
        self
    }

    pub fn with_rotation(mut self, lease_ms: u64, cool_down_ms: u64) -> Self {
        self.rotation = Some(RotationConfig {
            lease_ms,
            cool_down_ms,
        });
        self
    }

    /// Number of voting members, this node included.
    pub fn cluster_size(&self) -> usize {
        self.peers.len() + 1
    }

    /// Smallest vote count that is a strict majority of the cluster.
    pub fn quorum(&self) -> usize {
        self.cluster_size() / 2 + 1
    }

    pub fn validate(&self) -> Result<(), RaftError> {
        if self.election_timeout_min == 0 || self.election_timeout_min > self.election_timeout_max
        {
            return Err(RaftError::InvalidTimeoutRange {
                min: self.election_timeout_min,
                max: self.election_timeout_max,
            });
        }

        let mut seen = BTreeSet::new();
        for &peer in &self.peers {
            if peer == self.node_id {
                return Err(RaftError::SelfAsPeer(peer));
            }
            if !seen.insert(peer) {
                return Err(RaftError::DuplicatePeer(peer));
            }
        }

        if let Some(rotation) = self.rotation {
            if rotation.lease_ms == 0 || rotation.cool_down_ms == 0 {
                return Err(RaftError::InvalidRotation);
            }
        }

        Ok(())
    }
}
