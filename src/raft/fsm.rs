//! State machine adapter: the sole authority for turning a committed log
//! entry into a local store mutation.

use crate::core::{Store, StoreSnapshot};
use crate::raft::command::Command;
use crate::raft::consensus::StateMachine;
use crate::raft::errors::KvError;
use slog::{info, warn, Logger};
use std::sync::Arc;

/// Deterministic replay target wrapping the local store engine.
///
/// The consensus collaborator invokes [`StateMachine::apply`] on every
/// replica (the leader included) once an entry is committed; nothing else in
/// the process mutates the engine.
pub struct KvFsm {
    store: Arc<Store>,
    logger: Logger,
}

impl KvFsm {
    pub fn new(logger: Logger, store: Arc<Store>) -> Self {
        Self {
            store,
            logger: logger.new(slog::o!("component" => "raft.KvFsm")),
        }
    }
}

impl StateMachine for KvFsm {
    fn apply(&self, entry: &[u8]) -> Result<(), KvError> {
        let command = match Command::decode(entry) {
            Ok(command) => command,
            Err(err) => {
                // Corruption or a format divergence between replicas. Not
                // locally recoverable; surface it and let the collaborator
                // halt this replica.
                warn!(self.logger, "rejecting committed entry"; "error" => %err);
                return Err(err);
            }
        };

        info!(self.logger, "applying command";
            "op" => command.op(),
            "key" => command.key(),
        );

        match command {
            Command::Put { key, value, ttl } => self.store.put(key, value, ttl),
            Command::Delete { key } => self.store.delete(&key),
        }

        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<u8>, KvError> {
        let snapshot = self.store.snapshot();
        serde_json::to_vec(&snapshot).map_err(|e| KvError::Consensus(e.to_string()))
    }

    fn restore(&self, snapshot: &[u8]) -> Result<(), KvError> {
        let snapshot: StoreSnapshot =
            serde_json::from_slice(snapshot).map_err(|e| KvError::MalformedCommand {
                reason: e.to_string(),
            })?;

        self.store.load(snapshot);

        Ok(())
    }
}
