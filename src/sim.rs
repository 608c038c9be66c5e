//! Deterministic driver loop over the in-memory network.
//!
//! Every [`Simulation::step`] ticks each live node, delivers queued messages
//! until the network goes quiet, then advances the shared [`ManualClock`] by
//! one tick interval. Timeouts come from a seeded RNG, so a run is fully
//! reproducible from its seed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::config::{Config, ConfigError};
use crate::network::{Envelope, MemoryNetwork};
use crate::raft::{ManualClock, NodeId, NodeStatus, RaftConfig, RaftError, RaftNode};

// Responses and heartbeats settle within a few passes; this only guards
// against a livelock bug turning into a hang.
const MAX_DELIVERY_PASSES: usize = 64;

/// How the simulated network mistreats messages.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeliveryPolicy {
    /// Deliver each batch in random order.
    pub shuffle: bool,
    /// Chance that a message is delivered twice.
    pub duplicate_probability: f64,
}

pub struct Simulation {
    clock: ManualClock,
    network: MemoryNetwork,
    nodes: BTreeMap<NodeId, RaftNode>,
    configs: BTreeMap<NodeId, RaftConfig>,
    crashed: BTreeSet<NodeId>,
    rng: StdRng,
    policy: DeliveryPolicy,
    tick_interval: Duration,
    round: u64,
}

impl Simulation {
    pub fn new(seed: u64, tick_interval: Duration) -> Self {
        Self {
            clock: ManualClock::new(),
            network: MemoryNetwork::new(),
            nodes: BTreeMap::new(),
            configs: BTreeMap::new(),
            crashed: BTreeSet::new(),
            rng: StdRng::seed_from_u64(seed),
            policy: DeliveryPolicy::default(),
            tick_interval,
            round: 0,
        }
    }

    /// Builds a simulation with every node described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut sim = Self::new(config.seed.unwrap_or_default(), config.tick_interval());
        for id in config.node_ids() {
            sim.add_node(config.raft_config(id))?;
        }
        Ok(sim)
    }

    pub fn with_policy(mut self, policy: DeliveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn add_node(&mut self, config: RaftConfig) -> Result<(), RaftError> {
        let id = config.node_id;
        let node = self.build_node(config.clone())?;
        self.configs.insert(id, config);
        self.nodes.insert(id, node);
        Ok(())
    }

    fn build_node(&mut self, config: RaftConfig) -> Result<RaftNode, RaftError> {
        let endpoint = self.network.register(config.node_id);
        RaftNode::with_parts(
            config,
            endpoint,
            Arc::new(self.clock.clone()),
            &mut self.rng,
        )
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn node(&self, id: NodeId) -> Option<&RaftNode> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut RaftNode> {
        self.nodes.get_mut(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &RaftNode> {
        self.nodes.values()
    }

    pub fn is_crashed(&self, id: NodeId) -> bool {
        self.crashed.contains(&id)
    }

    /// One round of the driver loop.
    pub fn step(&mut self) {
        self.round += 1;
        self.tick_all();
        self.deliver();
        self.advance(self.tick_interval);
    }

    pub fn tick_all(&mut self) {
        for (id, node) in self.nodes.iter_mut() {
            if !self.crashed.contains(id) {
                node.on_timer_tick();
            }
        }
    }

    /// Delivers queued messages, and whatever they provoke, until nothing is
    /// left in flight. Returns the number of deliveries made.
    pub fn deliver(&mut self) -> usize {
        let mut delivered = 0;
        for _ in 0..MAX_DELIVERY_PASSES {
            let mut batch = self.network.take_pending();
            if batch.is_empty() {
                return delivered;
            }
            self.mistreat(&mut batch);
            for Envelope { to, message, .. } in batch {
                if self.crashed.contains(&to) {
                    continue;
                }
                if let Some(node) = self.nodes.get_mut(&to) {
                    node.on_message(message);
                    delivered += 1;
                }
            }
        }
        debug!("Network still busy after {MAX_DELIVERY_PASSES} delivery passes");
        delivered
    }

    fn mistreat(&mut self, batch: &mut Vec<Envelope>) {
        if self.policy.duplicate_probability > 0.0 {
            let p = self.policy.duplicate_probability.min(1.0);
            let duplicates: Vec<Envelope> = batch
                .iter()
                .filter(|_| self.rng.random_bool(p))
                .cloned()
                .collect();
            batch.extend(duplicates);
        }
        if self.policy.shuffle {
            batch.shuffle(&mut self.rng);
        }
    }

    pub fn advance(&mut self, by: Duration) {
        self.clock.advance(by);
    }

    /// Stops ticking `id` and drops everything addressed to it.
    pub fn crash(&mut self, id: NodeId) -> bool {
        if !self.nodes.contains_key(&id) {
            return false;
        }
        info!("Crashing node {id} at round {}", self.round);
        self.crashed.insert(id)
    }

    /// Replaces `id` with a fresh node: term 0, no vote, new timeout.
    pub fn restart(&mut self, id: NodeId) -> Result<bool, RaftError> {
        let Some(config) = self.configs.get(&id).cloned() else {
            return Ok(false);
        };
        info!("Restarting node {id} at round {}", self.round);
        let node = self.build_node(config)?;
        self.nodes.insert(id, node);
        self.crashed.remove(&id);
        Ok(true)
    }

    /// Live nodes that currently believe they lead.
    pub fn leaders(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(id, node)| !self.crashed.contains(id) && node.is_leader())
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn statuses(&self) -> Vec<NodeStatus> {
        self.nodes.values().map(RaftNode::status).collect()
    }

    /// Steps until `done` holds, for at most `max_rounds`. Returns the round
    /// at which it first held.
    pub fn run_until<F>(&mut self, max_rounds: u64, mut done: F) -> Option<u64>
    where
        F: FnMut(&Simulation) -> bool,
    {
        for _ in 0..max_rounds {
            self.step();
            if done(self) {
                return Some(self.round);
            }
        }
        None
    }
}
