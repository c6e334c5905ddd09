//! Point-in-time snapshot of the store's maps.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::SystemTime;

/// An immutable, independently-owned copy of the store's full state.
///
/// Written and read whole; there is no incremental snapshot format. Field
/// names are part of the snapshot wire format and must stay stable across
/// replicas.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Per-key absolute expiration instants. Every key here must also be
    /// present in `mp`.
    pub expirations: HashMap<String, SystemTime>,

    /// The full key-value mapping.
    pub mp: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut snap = StoreSnapshot::default();
        snap.mp.insert("a".to_string(), "1".to_string());
        snap.mp.insert("b".to_string(), "2".to_string());
        snap.expirations
            .insert("b".to_string(), SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000));

        let data = serde_json::to_vec(&snap).unwrap();
        let decoded: StoreSnapshot = serde_json::from_slice(&data).unwrap();
        assert_eq!(decoded, snap);
    }

    #[test]
    fn wire_field_names_are_stable() {
        let mut snap = StoreSnapshot::default();
        snap.mp.insert("k".to_string(), "v".to_string());

        let json: serde_json::Value = serde_json::to_value(&snap).unwrap();
        assert!(json.get("mp").is_some());
        assert!(json.get("expirations").is_some());
    }
}
