//! replikv: a replicated key-value store with TTL expiration.
//!
//! The consensus primitive (election, log replication, transport) is an
//! external collaborator consumed through [`raft::Consensus`]. This crate
//! provides the local store engine, the deterministic state machine adapter
//! the collaborator replays committed entries into, the leader-gated
//! distributed store API, and the cluster membership protocol.

pub mod config;
pub mod core;
pub mod raft;

pub use config::{ConfigError, StoreConfig};
pub use core::{Store, StoreSnapshot};
pub use raft::{
    ClusterNode, ClusterNodeConfig, Command, Consensus, DistStore, JoinClient, KvError, KvFsm,
    LocalConsensus, Role,
};
