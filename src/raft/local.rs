//! In-process, single-node stand-in for the consensus collaborator.
//!
//! Not a consensus implementation: there is no election, no quorum, no
//! durable log. Committed entries go straight to the registered state
//! machine, which keeps the apply-path contract intact: the store layer
//! still never mutates the engine directly. Used by the demo binary and the
//! integration tests; role and faults are settable so leadership-gating and
//! lost-commit paths can be exercised deterministically.

use crate::raft::consensus::{
    ClusterConfiguration, Consensus, ConsensusError, Role, Server, ServerAddress, ServerId,
    StateMachine,
};
use async_trait::async_trait;
use slog::{debug, Logger};
use std::sync::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Shared {
    role: Role,
    leader_hint: Option<ServerAddress>,
    servers: Vec<Server>,
    apply_fault: Option<String>,
    commit_delay: Option<Duration>,
}

/// Single-node collaborator: every accepted entry is immediately committed
/// and applied.
pub struct LocalConsensus {
    fsm: Arc<dyn StateMachine>,
    shared: RwLock<Shared>,
    leadership_tx: Mutex<Option<mpsc::Sender<bool>>>,
    logger: Logger,
}

impl LocalConsensus {
    pub fn new(logger: Logger, fsm: Arc<dyn StateMachine>) -> Self {
        Self {
            fsm,
            shared: RwLock::new(Shared {
                role: Role::Follower,
                leader_hint: None,
                servers: Vec::new(),
                apply_fault: None,
                commit_delay: None,
            }),
            leadership_tx: Mutex::new(None),
            logger: logger.new(slog::o!("component" => "raft.LocalConsensus")),
        }
    }

    /// Force a role, feeding the leadership-change stream on transitions in
    /// or out of leadership.
    pub fn set_role(&self, role: Role) {
        let was_leader = {
            let mut shared = self.shared.write().unwrap_or_else(|e| e.into_inner());
            let was_leader = shared.role == Role::Leader;
            shared.role = role;
            was_leader
        };

        let is_leader = role == Role::Leader;
        if was_leader != is_leader {
            self.notify_leadership(is_leader);
        }
    }

    /// Set the leader address reported in `NotLeader` hints.
    pub fn set_leader_hint(&self, hint: Option<ServerAddress>) {
        let mut shared = self.shared.write().unwrap_or_else(|e| e.into_inner());
        shared.leader_hint = hint;
    }

    /// Make every subsequent `apply` fail without reaching the state
    /// machine, as a commit lost mid-flight would. Cleared with `None`.
    pub fn set_apply_fault(&self, reason: Option<String>) {
        let mut shared = self.shared.write().unwrap_or_else(|e| e.into_inner());
        shared.apply_fault = reason;
    }

    /// Make every subsequent commit take this long, so callers with a
    /// shorter deadline see a timeout. Cleared with `None`.
    pub fn set_commit_delay(&self, delay: Option<Duration>) {
        let mut shared = self.shared.write().unwrap_or_else(|e| e.into_inner());
        shared.commit_delay = delay;
    }

    fn notify_leadership(&self, is_leader: bool) {
        let tx = self.leadership_tx.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = tx.as_ref() {
            // The subscriber drains promptly per the stream contract; if it
            // is gone the notification is moot.
            let _ = tx.try_send(is_leader);
        }
    }
}

#[async_trait]
impl Consensus for LocalConsensus {
    async fn apply(
        &self,
        entry: Vec<u8>,
        timeout: Option<Duration>,
    ) -> Result<(), ConsensusError> {
        let commit_delay = {
            let shared = self.shared.read().unwrap_or_else(|e| e.into_inner());
            if shared.role != Role::Leader {
                return Err(ConsensusError::NotLeader {
                    leader: shared.leader_hint.clone(),
                });
            }
            if let Some(reason) = &shared.apply_fault {
                return Err(ConsensusError::Other(reason.clone()));
            }
            shared.commit_delay
        };

        if let Some(delay) = commit_delay {
            match timeout {
                Some(timeout) if timeout < delay => {
                    tokio::time::sleep(timeout).await;
                    return Err(ConsensusError::Timeout);
                }
                _ => tokio::time::sleep(delay).await,
            }
        }

        // Single node: commit is immediate, apply follows at once.
        self.fsm
            .apply(&entry)
            .map_err(|e| ConsensusError::Fatal(e.to_string()))
    }

    async fn verify_leader(&self) -> Result<(), ConsensusError> {
        let shared = self.shared.read().unwrap_or_else(|e| e.into_inner());
        if shared.role == Role::Leader {
            Ok(())
        } else {
            Err(ConsensusError::NotLeader {
                leader: shared.leader_hint.clone(),
            })
        }
    }

    fn role(&self) -> Role {
        let shared = self.shared.read().unwrap_or_else(|e| e.into_inner());
        shared.role
    }

    fn leader_hint(&self) -> Option<ServerAddress> {
        let shared = self.shared.read().unwrap_or_else(|e| e.into_inner());
        shared.leader_hint.clone()
    }

    fn leadership_changes(&self) -> mpsc::Receiver<bool> {
        let (tx, rx) = mpsc::channel(16);

        // Prime and install under the sender lock: a concurrent role change
        // either lands before the prime reads the role, or blocks in
        // notify_leadership until the new sender is in place. A transition
        // may be reported twice but is never lost; subscribers already
        // tolerate repeated notifications.
        let mut guard = self.leadership_tx.lock().unwrap_or_else(|e| e.into_inner());
        if self.role() == Role::Leader {
            let _ = tx.try_send(true);
        }
        *guard = Some(tx);
        rx
    }

    async fn add_voter(
        &self,
        id: ServerId,
        address: ServerAddress,
    ) -> Result<(), ConsensusError> {
        let mut shared = self.shared.write().unwrap_or_else(|e| e.into_inner());
        debug!(self.logger, "adding voter"; "id" => &id, "address" => &address);
        shared.servers.push(Server { id, address });
        Ok(())
    }

    async fn configuration(&self) -> Result<ClusterConfiguration, ConsensusError> {
        let shared = self.shared.read().unwrap_or_else(|e| e.into_inner());
        Ok(ClusterConfiguration {
            servers: shared.servers.clone(),
        })
    }

    async fn bootstrap(
        &self,
        id: ServerId,
        address: ServerAddress,
    ) -> Result<(), ConsensusError> {
        {
            let mut shared = self.shared.write().unwrap_or_else(|e| e.into_inner());
            if !shared.servers.is_empty() {
                return Err(ConsensusError::Other(
                    "cluster already has a configuration".to_string(),
                ));
            }
            debug!(self.logger, "bootstrapping single-server cluster"; "id" => &id);
            shared.servers.push(Server { id, address });
        }

        // The sole voter of a single-server cluster is its leader.
        self.set_role(Role::Leader);

        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ConsensusError> {
        self.set_role(Role::Follower);

        let mut guard = self.leadership_tx.lock().unwrap_or_else(|e| e.into_inner());
        *guard = None;

        Ok(())
    }
}
