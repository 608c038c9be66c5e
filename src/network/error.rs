use thiserror::Error;

use crate::raft::NodeId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Unknown peer: {0}")]
    UnknownPeer(NodeId),

    #[error("Peer {0} is disconnected")]
    Disconnected(NodeId),
}
