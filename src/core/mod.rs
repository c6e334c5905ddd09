//! Local, replication-unaware storage: the in-memory engine and its
//! snapshot type.

pub mod snapshot;
pub mod store;

pub use snapshot::StoreSnapshot;
pub use store::Store;
