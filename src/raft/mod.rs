//! Replication layer: everything built on top of the consensus collaborator.

pub mod cluster;
pub mod command;
pub mod consensus;
pub mod errors;
pub mod fsm;
pub mod local;
pub mod store;

pub use cluster::{ClusterError, ClusterNode, ClusterNodeConfig, JoinClient};
pub use command::Command;
pub use consensus::{
    ClusterConfiguration, Consensus, ConsensusError, Role, Server, ServerAddress, ServerId,
    StateMachine,
};
pub use errors::KvError;
pub use fsm::KvFsm;
pub use local::LocalConsensus;
pub use store::DistStore;
