use thiserror::Error;

use super::NodeId;

#[derive(Error, Debug)]
pub enum RaftError {
    #[error("Cluster must contain at least one node")]
    EmptyCluster,

    #[error("Invalid election timeout range: {min}..={max} ms")]
    InvalidTimeoutRange { min: u64, max: u64 },

    #[error("Node {0} lists itself as a peer")]
    SelfAsPeer(NodeId),

    #[error("Peer {0} is listed more than once")]
    DuplicatePeer(NodeId),

    #[error("Invalid leader rotation: lease and cool-down must be positive")]
    InvalidRotation,
}
