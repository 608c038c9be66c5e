use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::{sleep, Instant};

use crate::config::{Config, ConfigError};
use crate::network::ChannelNetwork;
use crate::raft::{NodeId, NodeRole, NodeStatus, Raft, RaftNode, SystemClock};

/// A live cluster on the current tokio runtime, nodes talking over
/// [`ChannelNetwork`] mailboxes and driven by wall-clock timers.
pub struct LocalCluster {
    config: Config,
    network: ChannelNetwork,
    nodes: BTreeMap<NodeId, Raft>,
    rng: StdRng,
}

impl LocalCluster {
    /// Validates `config`, then builds and starts every node.
    pub fn start(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut cluster = Self {
            config,
            network: ChannelNetwork::new(),
            nodes: BTreeMap::new(),
            rng,
        };

        for id in cluster.config.node_ids() {
            cluster.spawn_node(id)?;
        }
        info!(
            "Started cluster of {} nodes ticking every {:?}",
            cluster.nodes.len(),
            cluster.config.tick_interval()
        );
        Ok(cluster)
    }

    fn spawn_node(&mut self, id: NodeId) -> Result<(), ConfigError> {
        let (endpoint, inbox) = self.network.register(id);
        let node = RaftNode::with_parts(
            self.config.raft_config(id),
            endpoint,
            Arc::new(SystemClock),
            &mut self.rng,
        )?;
        let raft = Raft::new(node, self.config.tick_interval());
        raft.start(inbox);
        self.nodes.insert(id, raft);
        Ok(())
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn statuses(&self) -> Vec<NodeStatus> {
        self.nodes.values().map(Raft::status).collect()
    }

    /// Running nodes that currently believe they lead.
    pub fn leaders(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, raft)| raft.is_running() && raft.status().role == NodeRole::Leader)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Polls until exactly one running node leads, or `timeout` passes.
    pub async fn wait_for_leader(&self, timeout: Duration) -> Option<NodeId> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            let leaders = self.leaders();
            if leaders.len() == 1 {
                return Some(leaders[0]);
            }
            sleep(Duration::from_millis(10)).await;
        }
        None
    }

    /// Stops `id`'s tasks and closes its mailbox, as if the process died.
    pub fn crash(&mut self, id: NodeId) -> bool {
        match self.nodes.get(&id) {
            Some(raft) => {
                info!("Crashing node {id}");
                raft.stop();
                self.network.disconnect(id);
                true
            }
            None => false,
        }
    }

    /// Brings `id` back as a newly joined node at term 0.
    pub fn restart(&mut self, id: NodeId) -> Result<bool, ConfigError> {
        match self.nodes.remove(&id) {
            Some(old) => {
                old.stop();
                info!("Restarting node {id}");
                self.spawn_node(id)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn shutdown(&mut self) {
        for raft in self.nodes.values() {
            raft.stop();
        }
    }
}

impl Drop for LocalCluster {
    fn drop(&mut self) {
        self.shutdown();
    }
}
