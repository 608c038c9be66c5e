// Election core
pub mod raft;
pub mod network;

// Drivers
pub mod sim;
pub mod cluster;
pub mod config;

// Public exports
pub use cluster::LocalCluster;
pub use config::{Config, ConfigError};
pub use raft::{ElectionState, Message, NodeId, RaftConfig, RaftNode, Target, Term};
pub use sim::{DeliveryPolicy, Simulation};
