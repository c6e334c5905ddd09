//! Typed errors shared by the distributed store and the membership manager.

use std::fmt;

/// Errors surfaced by the replicated store's public operations.
///
/// `NotFound` is a normal outcome of a lookup, not a failure. The transport
/// layer sitting above this crate is responsible for mapping each variant to
/// a wire-level status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvError {
    /// The key is absent or logically expired.
    NotFound,

    /// A write or consistent read reached a node that is not verifiably the
    /// current leader. Carries the best-known leader address, if any.
    NotLeader { leader: Option<String> },

    /// A join request duplicates an existing member's id or address. The
    /// configuration is left untouched.
    NodeExists { id: String, address: String },

    /// A replicated entry carried an operation tag outside the closed
    /// {put, delete} set. Fatal to the applying replica: the log views have
    /// diverged in format.
    UnknownCommand { op: String },

    /// A replicated entry could not be decoded at all. Fatal to the applying
    /// replica for the same reason as `UnknownCommand`.
    MalformedCommand { reason: String },

    /// The consensus collaborator did not commit the entry within the
    /// caller's deadline. Distinct from `NotLeader`; the caller decides
    /// whether to retry.
    Timeout,

    /// An opaque collaborator or transport failure, propagated unchanged.
    Consensus(String),
}

impl KvError {
    /// Render the leader hint the way operators see it.
    pub fn leader_hint(&self) -> Option<&str> {
        match self {
            KvError::NotLeader { leader } => leader.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for KvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KvError::NotFound => write!(f, "error no key"),
            KvError::NotLeader { leader } => write!(
                f,
                "leader={}, this node is not a leader",
                leader.as_deref().unwrap_or("leader was not specified")
            ),
            KvError::NodeExists { id, address } => write!(
                f,
                "node with nodeID - {} or at - {} already member of cluster, ignoring join request",
                id, address
            ),
            KvError::UnknownCommand { op } => write!(f, "error unknown command: {}", op),
            KvError::MalformedCommand { reason } => {
                write!(f, "malformed command payload: {}", reason)
            }
            KvError::Timeout => write!(f, "consensus apply timed out"),
            KvError::Consensus(reason) => write!(f, "consensus error: {}", reason),
        }
    }
}

impl std::error::Error for KvError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_leader_renders_hint() {
        let err = KvError::NotLeader {
            leader: Some("10.0.0.2:7000".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "leader=10.0.0.2:7000, this node is not a leader"
        );
        assert_eq!(err.leader_hint(), Some("10.0.0.2:7000"));
    }

    #[test]
    fn not_leader_without_hint_has_fallback_text() {
        let err = KvError::NotLeader { leader: None };
        assert_eq!(
            err.to_string(),
            "leader=leader was not specified, this node is not a leader"
        );
        assert_eq!(err.leader_hint(), None);
    }

    #[test]
    fn node_exists_names_both_identities() {
        let err = KvError::NodeExists {
            id: "node-2".to_string(),
            address: "10.0.0.2:7000".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("node-2"));
        assert!(text.contains("10.0.0.2:7000"));
    }
}
