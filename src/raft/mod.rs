mod clock;
mod config;
mod error;
mod message;
mod node;
mod state;
mod timer;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::config::{RaftConfig, RotationConfig};
pub use self::error::RaftError;
pub use self::message::{Message, NodeId, Target, Term};
pub use self::node::RaftNode;
pub use self::state::{ElectionState, NodeRole, NodeStatus};
pub use self::timer::random_election_timeout;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use log::{debug, info};
use tracing::Instrument;

/// Runs one [`RaftNode`] on the tokio runtime: a task drains the node's
/// mailbox and another ticks it on a fixed cadence. Both go through the same
/// mutex, so a node never handles a message and a tick concurrently.
pub struct Raft {
    pub node: Arc<Mutex<RaftNode>>,
    tick_interval: Duration,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Raft {
    pub fn new(node: RaftNode, tick_interval: Duration) -> Self {
        Self {
            node: Arc::new(Mutex::new(node)),
            tick_interval,
            tasks: Mutex::new(Vec::new()),
        }
    }

    fn lock_node(node: &Mutex<RaftNode>) -> MutexGuard<'_, RaftNode> {
        node.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns the mailbox and timer tasks. Must be called inside a tokio runtime.
    pub fn start(&self, mut inbox: mpsc::UnboundedReceiver<Message>) {
        let id = Self::lock_node(&self.node).id();
        let span = tracing::info_span!("raft", node = id);

        // Spawn a task to handle incoming messages
        let node_clone = Arc::clone(&self.node);
        let mailbox = tokio::spawn(
            async move {
                while let Some(message) = inbox.recv().await {
                    Self::lock_node(&node_clone).on_message(message);
                }
                debug!("Node {id} mailbox closed");
            }
            .instrument(span.clone()),
        );

        // Spawn a task for the periodic tick
        let node_clone = Arc::clone(&self.node);
        let tick_interval = self.tick_interval;
        let timer = tokio::spawn(
            async move {
                let mut ticker = interval(tick_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    Self::lock_node(&node_clone).on_timer_tick();
                }
            }
            .instrument(span),
        );

        info!("Node {id} started, ticking every {tick_interval:?}");
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.push(mailbox);
        tasks.push(timer);
    }

    /// Aborts the node's tasks. The node's state stays readable.
    pub fn stop(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        !tasks.is_empty() && tasks.iter().all(|t| !t.is_finished())
    }

    pub fn status(&self) -> NodeStatus {
        Self::lock_node(&self.node).status()
    }
}

impl Drop for Raft {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ChannelNetwork;

    #[tokio::test]
    async fn single_node_service_elects_itself() {
        let net = ChannelNetwork::new();
        let (endpoint, inbox) = net.register(1);
        let cfg = RaftConfig::new(1).with_election_timeout(20, 40);
        let raft = Raft::new(
            RaftNode::new(cfg, endpoint).expect("valid config"),
            Duration::from_millis(10),
        );

        raft.start(inbox);
        assert!(raft.is_running());

        let mut elected = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if raft.status().role == NodeRole::Leader {
                elected = true;
                break;
            }
        }
        assert!(elected, "single node never became leader");

        raft.stop();
        assert!(!raft.is_running());
    }
}
