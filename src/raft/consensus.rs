//! Boundary with the consensus collaborator.
//!
//! Leader election, log replication, durable log storage, and the network
//! between replicas are not this crate's business. They are consumed through
//! [`Consensus`], and the collaborator drives committed entries back into
//! the store through [`StateMachine`].

use crate::raft::errors::KvError;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

/// Stable, unique identity of a cluster member. Assignment is an external
/// configuration decision.
pub type ServerId = String;

/// Address other members use to reach a node.
pub type ServerAddress = String;

/// A node's role at the moment of a check. Never cache it across operations:
/// it can change between any two checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Leader,
    Follower,
    Candidate,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Leader => write!(f, "leader"),
            Role::Follower => write!(f, "follower"),
            Role::Candidate => write!(f, "candidate"),
        }
    }
}

/// One voting member of the cluster configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Server {
    pub id: ServerId,
    pub address: ServerAddress,
}

/// The current voter set. Invariant (maintained by the membership manager):
/// no two members share an id or an address.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterConfiguration {
    pub servers: Vec<Server>,
}

/// Failures reported by the consensus collaborator.
#[derive(Debug, Clone)]
pub enum ConsensusError {
    /// The operation required leadership this node does not hold.
    NotLeader { leader: Option<ServerAddress> },

    /// The entry was not committed within the caller's deadline.
    Timeout,

    /// The state machine rejected a committed entry. The replica must stop
    /// applying the log; skipping would silently desynchronize state.
    Fatal(String),

    /// Any other collaborator failure, propagated opaquely.
    Other(String),
}

impl fmt::Display for ConsensusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusError::NotLeader { leader } => write!(
                f,
                "not leader (leader: {})",
                leader.as_deref().unwrap_or("unknown")
            ),
            ConsensusError::Timeout => write!(f, "apply timed out"),
            ConsensusError::Fatal(reason) => write!(f, "fatal apply failure: {}", reason),
            ConsensusError::Other(reason) => write!(f, "{}", reason),
        }
    }
}

impl std::error::Error for ConsensusError {}

impl From<ConsensusError> for KvError {
    fn from(err: ConsensusError) -> Self {
        match err {
            ConsensusError::NotLeader { leader } => KvError::NotLeader { leader },
            ConsensusError::Timeout => KvError::Timeout,
            ConsensusError::Fatal(reason) | ConsensusError::Other(reason) => {
                KvError::Consensus(reason)
            }
        }
    }
}

/// The deterministic replay target the collaborator invokes.
///
/// `apply` runs on every replica, leader included, once an entry is durably
/// committed. It must be byte-for-byte deterministic given the same log; a
/// failure is not locally recoverable and the collaborator is expected to
/// treat it as fatal to the replica rather than skip the entry.
pub trait StateMachine: Send + Sync {
    /// Replay one committed log entry into local state.
    fn apply(&self, entry: &[u8]) -> Result<(), KvError>;

    /// Serialize a point-in-time snapshot for the collaborator's snapshot
    /// sink.
    fn snapshot(&self) -> Result<Vec<u8>, KvError>;

    /// Replace all local state from a snapshot payload. Used when a replica
    /// is too far behind the log to catch up by incremental replay.
    fn restore(&self, snapshot: &[u8]) -> Result<(), KvError>;
}

/// Operations this crate consumes from the consensus collaborator.
#[async_trait]
pub trait Consensus: Send + Sync {
    /// Append an entry to the replicated log and wait for its commit.
    ///
    /// `timeout` of `None` means an unbounded wait. A timeout is surfaced as
    /// [`ConsensusError::Timeout`], distinct from losing leadership; the
    /// caller decides whether to retry.
    async fn apply(&self, entry: Vec<u8>, timeout: Option<Duration>) -> Result<(), ConsensusError>;

    /// Confirmation round verifying this node still holds leadership. More
    /// expensive than [`Consensus::role`], but catches a replica that lost
    /// leadership silently during a partition.
    async fn verify_leader(&self) -> Result<(), ConsensusError>;

    /// This node's role right now.
    fn role(&self) -> Role;

    /// Best-known address of the current leader, if any.
    fn leader_hint(&self) -> Option<ServerAddress>;

    /// Leadership-change notification stream: `true` when this node gains
    /// leadership, `false` when it loses it.
    ///
    /// Single-consumer: the subscriber must drain promptly or risk stalling
    /// the collaborator's leadership bookkeeping.
    fn leadership_changes(&self) -> mpsc::Receiver<bool>;

    /// Add a voting member to the cluster configuration.
    async fn add_voter(
        &self,
        id: ServerId,
        address: ServerAddress,
    ) -> Result<(), ConsensusError>;

    /// Read the current cluster configuration.
    async fn configuration(&self) -> Result<ClusterConfiguration, ConsensusError>;

    /// Install the initial single-voter configuration on a fresh node.
    async fn bootstrap(&self, id: ServerId, address: ServerAddress)
        -> Result<(), ConsensusError>;

    /// Gracefully stop participating in the cluster.
    async fn shutdown(&self) -> Result<(), ConsensusError>;
}
