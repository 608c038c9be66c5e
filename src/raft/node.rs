use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::timer::random_election_timeout;
use super::{
    Clock, ElectionState, Message, NodeId, NodeStatus, RaftConfig, RaftError, SystemClock, Target,
    Term,
};
use crate::network::Transport;

pub struct RaftNode {
    // Node identity
    id: NodeId,

    // Election state
    current_term: Term,
    state: ElectionState,
    // Vote cast in `current_term`, including the self-vote of a campaign.
    voted_for: Option<NodeId>,

    // Configuration
    config: RaftConfig,

    // Communication
    transport: Box<dyn Transport>,

    // Timers
    clock: Arc<dyn Clock>,
    last_event: Instant,
    election_timeout: Duration,
    // Extra wait before a candidate campaigns again, redrawn per campaign.
    campaign_backoff: Duration,
    lease_expiry: Option<Instant>,

    rng: StdRng,
}

impl RaftNode {
    /// Creates a node on the system clock with a thread-local random timeout.
    pub fn new(config: RaftConfig, transport: impl Transport + 'static) -> Result<Self, RaftError> {
        Self::with_parts(config, transport, Arc::new(SystemClock), &mut rand::rng())
    }

    /// Creates a node with an explicit clock and random source. The election
    /// timeout is drawn from `rng` once, here. The node keeps its own RNG,
    /// seeded from `rng`, for the backoff between repeated campaigns.
    pub fn with_parts<R: Rng + ?Sized>(
        config: RaftConfig,
        transport: impl Transport + 'static,
        clock: Arc<dyn Clock>,
        rng: &mut R,
    ) -> Result<Self, RaftError> {
        config.validate()?;

        let election_timeout = random_election_timeout(
            rng,
            config.election_timeout_min,
            config.election_timeout_max,
        );
        let last_event = clock.now();
        let node_rng = StdRng::seed_from_u64(rng.random());

        debug!(
            "Node {} created with election timeout {:?} in a cluster of {}",
            config.node_id,
            election_timeout,
            config.cluster_size()
        );

        Ok(Self {
            id: config.node_id,
            current_term: 0,
            state: ElectionState::Uninitialized,
            voted_for: None,
            config,
            transport: Box::new(transport),
            clock,
            last_event,
            election_timeout,
            campaign_backoff: Duration::ZERO,
            lease_expiry: None,
            rng: node_rng,
        })
    }

    pub fn set_transport(&mut self, transport: impl Transport + 'static) {
        self.transport = Box::new(transport);
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn current_term(&self) -> Term {
        self.current_term
    }

    pub fn state(&self) -> &ElectionState {
        &self.state
    }

    pub fn voted_for(&self) -> Option<NodeId> {
        self.voted_for
    }

    pub fn config(&self) -> &RaftConfig {
        &self.config
    }

    pub fn election_timeout(&self) -> Duration {
        self.election_timeout
    }

    pub fn is_leader(&self) -> bool {
        matches!(self.state, ElectionState::ThisNodeIsLeader)
    }

    /// The leader this node currently believes in, if any.
    pub fn leader_id(&self) -> Option<NodeId> {
        match self.state {
            ElectionState::ThisNodeIsLeader => Some(self.id),
            ElectionState::OtherNodeIsLeader { leader_id } => Some(leader_id),
            _ => None,
        }
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            id: self.id,
            term: self.current_term,
            role: self.state.role(),
            state: self.state.to_string(),
            leader_id: self.leader_id(),
        }
    }

    /// Periodic timer entry point. Starts an election when the leader has
    /// been silent for longer than the election timeout, and sends
    /// heartbeats while leading.
    pub fn on_timer_tick(&mut self) {
        let now = self.clock.now();

        if !self.wake_if_rested(now) && self.leader_is_missing(now) {
            self.start_election(now);
        }

        if self.is_leader() {
            self.broadcast(Message::Heartbeat {
                term: self.current_term,
                leader_id: self.id,
            });
            self.last_event = now;

            if self.lease_expired(now) {
                self.relinquish_leadership(now);
            }
        }

        info!(
            "Node {} term={} state={}",
            self.id, self.current_term, self.state
        );
    }

    /// Inbound message entry point.
    pub fn on_message(&mut self, message: Message) {
        debug!(
            "Node {} received term {} message from node {}",
            self.id,
            message.term(),
            message.sender()
        );
        match message {
            Message::RequestVote { term, candidate_id } => {
                self.handle_request_vote(term, candidate_id)
            }
            Message::ResponseVote {
                term,
                voter_id,
                granted,
            } => self.handle_response_vote(term, voter_id, granted),
            Message::Heartbeat { term, leader_id } => self.handle_heartbeat(term, leader_id),
        }
    }

    fn leader_is_missing(&self, now: Instant) -> bool {
        // Leaders do not time out on themselves
        !self.is_leader()
            && now.saturating_duration_since(self.last_event) > self.election_deadline()
    }

    /// How long this node waits without hearing from a leader before it
    /// campaigns. A candidate also waits out its per-campaign backoff.
    fn election_deadline(&self) -> Duration {
        match self.state {
            ElectionState::RunningForLeader { .. } => self.election_timeout + self.campaign_backoff,
            _ => self.election_timeout,
        }
    }

    /// Returns true while the node is (or was until now) sleeping. Sleep ends
    /// lazily: the tick that notices the wakeup time does not campaign.
    fn wake_if_rested(&mut self, now: Instant) -> bool {
        match self.state {
            ElectionState::Sleeping { wakeup_time } => {
                if now >= wakeup_time {
                    debug!("Node {} waking up in term {}", self.id, self.current_term);
                    self.state = ElectionState::Uninitialized;
                }
                true
            }
            _ => false,
        }
    }

    fn lease_expired(&self, now: Instant) -> bool {
        self.lease_expiry.is_some_and(|expiry| now >= expiry)
    }

    fn start_election(&mut self, now: Instant) {
        let Some(term) = self.current_term.checked_add(1) else {
            warn!(
                "Node {} cannot campaign, term {} is exhausted",
                self.id, self.current_term
            );
            return;
        };
        self.current_term = term;
        self.campaign_backoff =
            random_election_timeout(&mut self.rng, 0, self.config.election_timeout_max);
        self.voted_for = Some(self.id);
        self.state = ElectionState::campaign(self.id);
        self.lease_expiry = None;
        self.last_event = now;

        info!(
            "Node {} starting election for term {}",
            self.id, self.current_term
        );

        self.broadcast(Message::RequestVote {
            term: self.current_term,
            candidate_id: self.id,
        });

        // Single node cluster: the self-vote is already a majority
        if self.state.vote_count() >= self.config.quorum() {
            self.become_leader(now);
        }
    }

    fn become_leader(&mut self, now: Instant) {
        info!(
            "Node {} becoming leader for term {}",
            self.id, self.current_term
        );

        self.state = ElectionState::ThisNodeIsLeader;
        self.lease_expiry = self.config.rotation.map(|r| now + r.lease());
        self.last_event = now;

        self.broadcast(Message::Heartbeat {
            term: self.current_term,
            leader_id: self.id,
        });
    }

    fn relinquish_leadership(&mut self, now: Instant) {
        let Some(rotation) = self.config.rotation else {
            return;
        };

        info!(
            "Node {} lease expired, stepping down from term {} for {:?}",
            self.id,
            self.current_term,
            rotation.cool_down()
        );

        self.lease_expiry = None;
        self.state = ElectionState::Sleeping {
            wakeup_time: now + rotation.cool_down(),
        };
    }

    /// Moves to a newer term. The vote cast in the old term no longer binds.
    fn adopt_term(&mut self, term: Term) {
        debug_assert!(term > self.current_term);
        debug!(
            "Node {} adopting term {} (was {})",
            self.id, term, self.current_term
        );
        self.current_term = term;
        self.voted_for = None;
        self.lease_expiry = None;
    }

    fn handle_request_vote(&mut self, term: Term, candidate_id: NodeId) {
        let granted = if term > self.current_term {
            self.adopt_term(term);
            true
        } else if term == self.current_term {
            match self.state {
                // A candidate or leader already spent its vote on itself
                ElectionState::RunningForLeader { .. } | ElectionState::ThisNodeIsLeader => false,
                _ => self.voted_for.map_or(true, |v| v == candidate_id),
            }
        } else {
            false
        };

        if granted {
            self.voted_for = Some(candidate_id);
            self.state = ElectionState::VotedFor { candidate_id };
            self.last_event = self.clock.now();
        } else {
            debug!(
                "Node {} refusing vote to {} for term {} (current term {}, state {})",
                self.id, candidate_id, term, self.current_term, self.state
            );
        }

        self.send(
            Target::Node(candidate_id),
            Message::ResponseVote {
                term: self.current_term,
                voter_id: self.id,
                granted,
            },
        );
    }

    fn handle_response_vote(&mut self, term: Term, voter_id: NodeId, granted: bool) {
        // The responder is ahead of us; any candidacy of ours is stale
        if term > self.current_term {
            self.adopt_term(term);
            self.state = ElectionState::Uninitialized;
            return;
        }

        if term < self.current_term || !granted {
            return;
        }

        if !self.config.peers.contains(&voter_id) {
            debug!("Node {} ignoring vote from unknown node {voter_id}", self.id);
            return;
        }

        let quorum = self.config.quorum();
        if let ElectionState::RunningForLeader { voters } = &mut self.state {
            voters.insert(voter_id);
            if voters.len() >= quorum {
                let now = self.clock.now();
                self.become_leader(now);
            }
        }
    }

    fn handle_heartbeat(&mut self, term: Term, leader_id: NodeId) {
        if term < self.current_term {
            debug!(
                "Node {} ignoring stale heartbeat from {} (term {} < {})",
                self.id, leader_id, term, self.current_term
            );
            return;
        }
        if term > self.current_term {
            self.adopt_term(term);
        }

        if self.is_leader() {
            info!(
                "Node {} stepping down in term {term}, node {leader_id} is leading",
                self.id
            );
        }

        self.lease_expiry = None;
        self.state = ElectionState::OtherNodeIsLeader { leader_id };
        self.last_event = self.clock.now();
    }

    fn broadcast(&self, message: Message) {
        self.send(Target::All, message);
    }

    fn send(&self, target: Target, message: Message) {
        debug!("Node {} sending {message} to {target:?}", self.id);
        if let Err(e) = self.transport.send(target, message) {
            debug!("Node {} failed to send to {target:?}: {e}", self.id);
        }
    }
}
