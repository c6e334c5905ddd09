//! The replicated command: the unit of the consensus log.
//!
//! Wire format is a flat JSON record `{op, key, value, ttl}` where `op` is
//! one of `put` or `delete`, `ttl` is whole nanoseconds (absent or zero
//! meaning "no expiration", present only for put). The format is shared by
//! every replica; changing it is a log-compatibility break.

use crate::raft::errors::KvError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const OP_PUT: &str = "put";
const OP_DELETE: &str = "delete";

/// A single replicated mutation. Closed set: anything else on the wire is
/// rejected as `UnknownCommand`, never silently defaulted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Put {
        key: String,
        value: String,
        ttl: Duration,
    },
    Delete {
        key: String,
    },
}

/// On-wire representation. Kept separate from [`Command`] so an unrecognized
/// `op` tag decodes far enough to be reported by name.
#[derive(Serialize, Deserialize)]
struct Wire {
    op: String,
    key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    value: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    ttl: u64,
}

fn is_zero(ttl: &u64) -> bool {
    *ttl == 0
}

impl Command {
    /// Serialize for the replication log.
    pub fn encode(&self) -> Result<Vec<u8>, KvError> {
        let wire = match self {
            Command::Put { key, value, ttl } => Wire {
                op: OP_PUT.to_string(),
                key: key.clone(),
                value: value.clone(),
                // Saturate rather than truncate: a ttl past u64 nanoseconds
                // is indistinguishable from forever anyway.
                ttl: u64::try_from(ttl.as_nanos()).unwrap_or(u64::MAX),
            },
            Command::Delete { key } => Wire {
                op: OP_DELETE.to_string(),
                key: key.clone(),
                value: String::new(),
                ttl: 0,
            },
        };

        serde_json::to_vec(&wire).map_err(|e| KvError::MalformedCommand {
            reason: e.to_string(),
        })
    }

    /// Decode a committed log entry.
    ///
    /// A payload that is not valid JSON (or misses required fields) is
    /// `MalformedCommand`; a well-formed record whose `op` is outside the
    /// closed set is `UnknownCommand`. Both are fatal to the applying
    /// replica.
    pub fn decode(data: &[u8]) -> Result<Self, KvError> {
        let wire: Wire = serde_json::from_slice(data).map_err(|e| KvError::MalformedCommand {
            reason: e.to_string(),
        })?;

        match wire.op.as_str() {
            OP_PUT => Ok(Command::Put {
                key: wire.key,
                value: wire.value,
                ttl: Duration::from_nanos(wire.ttl),
            }),
            OP_DELETE => Ok(Command::Delete { key: wire.key }),
            _ => Err(KvError::UnknownCommand { op: wire.op }),
        }
    }

    /// The key this command touches.
    pub fn key(&self) -> &str {
        match self {
            Command::Put { key, .. } => key,
            Command::Delete { key } => key,
        }
    }

    /// The wire operation tag, for logging.
    pub fn op(&self) -> &'static str {
        match self {
            Command::Put { .. } => OP_PUT,
            Command::Delete { .. } => OP_DELETE,
        }
    }
}
