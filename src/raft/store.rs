//! The distributed store: the externally-consumed API over the local engine
//! and the consensus collaborator.
//!
//! Writes are leader-gated and travel through the replicated log; the engine
//! is mutated only when the collaborator hands the committed entry back to
//! the state machine adapter. Reads are served locally, optionally behind a
//! leadership confirmation round.

use crate::core::Store;
use crate::raft::command::Command;
use crate::raft::consensus::{Consensus, Role};
use crate::raft::errors::KvError;
use slog::{debug, info, warn, Logger};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Replicated key-value store facade.
pub struct DistStore {
    store: Arc<Store>,
    consensus: Arc<dyn Consensus>,
    logger: Logger,
}

impl DistStore {
    pub fn new(logger: Logger, consensus: Arc<dyn Consensus>, store: Arc<Store>) -> Self {
        Self {
            store,
            consensus,
            logger: logger.new(slog::o!("component" => "raft.DistStore")),
        }
    }

    /// Eventually-consistent read served from local state. Permitted on any
    /// node regardless of leadership; may return stale data on a partitioned
    /// follower.
    pub fn get(&self, key: &str) -> Result<String, KvError> {
        self.store.get(key).ok_or(KvError::NotFound)
    }

    /// Linearizable read: verifies leadership with a confirmation round
    /// first, then reads locally.
    ///
    /// The confirmation round (not a cached flag) is what catches a replica
    /// that silently lost leadership during a partition.
    pub async fn consistent_get(&self, key: &str) -> Result<String, KvError> {
        if self.consensus.verify_leader().await.is_err() {
            return Err(self.not_leader());
        }

        self.get(key)
    }

    /// Replicated upsert. `ttl` of zero means the key never expires.
    ///
    /// `timeout` bounds the wait for commit (`None` = unbounded). The local
    /// engine is not touched here: the mutation lands on every replica,
    /// this one included, via the state machine adapter once the entry
    /// commits. A write that fails to commit therefore never partially
    /// applies locally.
    pub async fn put(
        &self,
        key: String,
        value: String,
        ttl: Duration,
        timeout: Option<Duration>,
    ) -> Result<(), KvError> {
        if self.consensus.role() != Role::Leader {
            return Err(self.not_leader());
        }

        self.submit(Command::Put { key, value, ttl }, timeout).await
    }

    /// Replicated removal. Same pattern and guarantees as [`DistStore::put`].
    pub async fn delete(&self, key: String, timeout: Option<Duration>) -> Result<(), KvError> {
        if self.consensus.role() != Role::Leader {
            return Err(self.not_leader());
        }

        self.submit(Command::Delete { key }, timeout).await
    }

    async fn submit(&self, command: Command, timeout: Option<Duration>) -> Result<(), KvError> {
        let entry = command.encode()?;

        self.consensus.apply(entry, timeout).await?;

        debug!(self.logger, "command committed";
            "op" => command.op(),
            "key" => command.key(),
        );

        Ok(())
    }

    /// Background task replicating deletions of expired keys.
    ///
    /// Waits on the collaborator's leadership-change stream. Each time this
    /// node becomes leader it drains the engine's expired-keys sweep and
    /// issues a replicated delete per key, so followers converge too. The
    /// moment leadership is lost the remainder of the sweep is abandoned:
    /// the new leader runs its own, and re-deleting a key that is already
    /// gone is a harmless no-op. Best-effort, never a timing guarantee.
    pub async fn run_cleaning(&self, shutdown: watch::Receiver<bool>) {
        let mut leadership = self.consensus.leadership_changes();
        let mut shutdown = shutdown;

        info!(self.logger, "cleaning task started");

        loop {
            let became_leader = tokio::select! {
                _ = shutdown.changed() => {
                    info!(self.logger, "cleaning task stopped");
                    return;
                }
                change = leadership.recv() => match change {
                    Some(is_leader) => is_leader,
                    None => {
                        info!(self.logger, "leadership stream closed, cleaning task stopped");
                        return;
                    }
                },
            };

            if !became_leader {
                continue;
            }

            debug!(self.logger, "gained leadership, draining expired keys");

            // Dropping the receiver at the end of the tenure terminates the
            // engine's sweep task.
            let mut expired = self.store.expired_keys(shutdown.clone());

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!(self.logger, "cleaning task stopped");
                        return;
                    }
                    // Keep consuming leadership notifications promptly even
                    // mid-sweep; the stream is single-consumer.
                    change = leadership.recv() => match change {
                        Some(true) => continue,
                        Some(false) => {
                            debug!(self.logger, "lost leadership, abandoning sweep");
                            break;
                        }
                        None => {
                            info!(self.logger, "leadership stream closed, cleaning task stopped");
                            return;
                        }
                    },
                    key = expired.recv() => match key {
                        Some(key) => {
                            if self.consensus.role() != Role::Leader {
                                debug!(self.logger, "lost leadership, abandoning sweep");
                                break;
                            }
                            if let Err(err) = self.delete(key.clone(), None).await {
                                warn!(self.logger, "failed to delete expired key";
                                    "key" => key,
                                    "error" => %err,
                                );
                            }
                        }
                        None => break,
                    },
                }
            }
        }
    }

    fn not_leader(&self) -> KvError {
        KvError::NotLeader {
            leader: self.consensus.leader_hint(),
        }
    }
}
