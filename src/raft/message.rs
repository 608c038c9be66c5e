use std::fmt;

use serde::{Deserialize, Serialize};

pub type NodeId = u64;
pub type Term = u64;

/// Destination of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    /// Every node in the cluster except the sender.
    All,
    Node(NodeId),
}

// Message types for leader election
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    RequestVote {
        term: Term,
        candidate_id: NodeId,
    },
    ResponseVote {
        term: Term,
        voter_id: NodeId,
        granted: bool,
    },
    Heartbeat {
        term: Term,
        leader_id: NodeId,
    },
}

impl Message {
    pub fn term(&self) -> Term {
        match self {
            Message::RequestVote { term, .. }
            | Message::ResponseVote { term, .. }
            | Message::Heartbeat { term, .. } => *term,
        }
    }

    /// The node that produced this message.
    pub fn sender(&self) -> NodeId {
        match self {
            Message::RequestVote { candidate_id, .. } => *candidate_id,
            Message::ResponseVote { voter_id, .. } => *voter_id,
            Message::Heartbeat { leader_id, .. } => *leader_id,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::RequestVote { term, candidate_id } => {
                write!(f, "RequestVote{{ term={term} candidate={candidate_id} }}")
            }
            Message::ResponseVote {
                term,
                voter_id,
                granted,
            } => write!(
                f,
                "ResponseVote{{ term={term} voter={voter_id} granted={granted} }}"
            ),
            Message::Heartbeat { term, leader_id } => {
                write!(f, "Heartbeat{{ term={term} leader={leader_id} }}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn term_and_sender_are_read_from_every_variant() {
        let request = Message::RequestVote {
            term: 4,
            candidate_id: 2,
        };
        let response = Message::ResponseVote {
            term: 5,
            voter_id: 3,
            granted: false,
        };
        let heartbeat = Message::Heartbeat {
            term: 6,
            leader_id: 1,
        };

        assert_eq!((request.term(), request.sender()), (4, 2));
        assert_eq!((response.term(), response.sender()), (5, 3));
        assert_eq!((heartbeat.term(), heartbeat.sender()), (6, 1));
    }

    #[test]
    fn message_serializes_as_tagged_json() {
        let msg = Message::Heartbeat {
            term: 1,
            leader_id: 2,
        };
        let json = serde_json::to_string(&msg).expect("serialize");
        assert_eq!(json, r#"{"Heartbeat":{"term":1,"leader_id":2}}"#);

        let back: Message = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, msg);
    }
}
