use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::{NodeId, Term};

/// Election state of a single node. Exactly one variant is active at a time
/// and it is replaced wholesale on every transition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ElectionState {
    #[default]
    Uninitialized,
    VotedFor {
        candidate_id: NodeId,
    },
    /// Campaigning in the current term. `voters` always contains this node.
    RunningForLeader {
        voters: BTreeSet<NodeId>,
    },
    ThisNodeIsLeader,
    OtherNodeIsLeader {
        leader_id: NodeId,
    },
    /// Voluntary step-down after a leader lease; no elections until `wakeup_time`.
    Sleeping {
        wakeup_time: Instant,
    },
}

impl ElectionState {
    pub fn campaign(self_id: NodeId) -> Self {
        ElectionState::RunningForLeader {
            voters: BTreeSet::from([self_id]),
        }
    }

    /// Granted votes accumulated while campaigning, zero otherwise.
    pub fn vote_count(&self) -> usize {
        match self {
            ElectionState::RunningForLeader { voters } => voters.len(),
            _ => 0,
        }
    }

    pub fn role(&self) -> NodeRole {
        match self {
            ElectionState::Uninitialized
            | ElectionState::VotedFor { .. }
            | ElectionState::OtherNodeIsLeader { .. } => NodeRole::Follower,
            ElectionState::RunningForLeader { .. } => NodeRole::Candidate,
            ElectionState::ThisNodeIsLeader => NodeRole::Leader,
            ElectionState::Sleeping { .. } => NodeRole::Sleeping,
        }
    }
}

impl fmt::Display for ElectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElectionState::Uninitialized => write!(f, "Uninitialized"),
            ElectionState::VotedFor { candidate_id } => write!(f, "VotedFor{{ {candidate_id} }}"),
            ElectionState::RunningForLeader { voters } => {
                write!(f, "RunningForLeader{{ {} }}", voters.len())
            }
            ElectionState::ThisNodeIsLeader => write!(f, "ThisNodeIsLeader"),
            ElectionState::OtherNodeIsLeader { leader_id } => {
                write!(f, "OtherNodeIsLeader{{ {leader_id} }}")
            }
            ElectionState::Sleeping { .. } => write!(f, "Sleeping"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Follower,
    Candidate,
    Leader,
    Sleeping,
}

/// Point-in-time snapshot of a node, for monitoring and reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub id: NodeId,
    pub term: Term,
    pub role: NodeRole,
    pub state: String,
    pub leader_id: Option<NodeId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn campaign_counts_self_vote() {
        let state = ElectionState::campaign(7);
        assert_eq!(state.vote_count(), 1);
        assert_eq!(state.role(), NodeRole::Candidate);
        assert_eq!(state.to_string(), "RunningForLeader{ 1 }");
    }

    #[test]
    fn display_matches_status_line_format() {
        assert_eq!(ElectionState::Uninitialized.to_string(), "Uninitialized");
        assert_eq!(
            ElectionState::VotedFor { candidate_id: 3 }.to_string(),
            "VotedFor{ 3 }"
        );
        assert_eq!(
            ElectionState::OtherNodeIsLeader { leader_id: 2 }.to_string(),
            "OtherNodeIsLeader{ 2 }"
        );
        assert_eq!(
            ElectionState::Sleeping {
                wakeup_time: Instant::now()
            }
            .to_string(),
            "Sleeping"
        );
    }

    #[test]
    fn roles_collapse_follower_states() {
        assert_eq!(ElectionState::default().role(), NodeRole::Follower);
        assert_eq!(
            ElectionState::VotedFor { candidate_id: 1 }.role(),
            NodeRole::Follower
        );
        assert_eq!(ElectionState::ThisNodeIsLeader.role(), NodeRole::Leader);
        assert_eq!(ElectionState::ThisNodeIsLeader.vote_count(), 0);
    }
}
