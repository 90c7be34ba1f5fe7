//! In-memory event store backend for RoadGuard.
//!
//! This crate provides an in-memory implementation of the `EventStore` trait
//! from `roadguard-storage`, backed by a sharded `DashMap`. Conditional
//! updates run under the shard lock of the target event, which makes them
//! atomic with respect to every other writer of that event.
//!
//! # Example
//!
//! ```ignore
//! use roadguard_db_memory::InMemoryEventStore;
//! use roadguard_storage::EventStore;
//!
//! let store = InMemoryEventStore::new();
//! let created = store.create(event).await?;
//! ```

pub mod storage;

pub use roadguard_storage::{EventStore, StorageError};
pub use storage::InMemoryEventStore;

/// Creates a new shareable in-memory event store.
pub fn create_event_store() -> roadguard_storage::DynEventStore {
    std::sync::Arc::new(InMemoryEventStore::new())
}
