#![forbid(unsafe_code)]

pub mod repository;
pub mod snapshot_store;
pub mod sqlite;

pub use repository::{InMemorySessionStore, SessionStore, Storage, StorageError};
pub use snapshot_store::SnapshotStore;
