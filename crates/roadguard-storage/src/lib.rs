//! # roadguard-storage
//!
//! Storage abstraction layer for RoadGuard accident events.
//!
//! This crate defines the [`EventStore`] trait, the conditional update types
//! every status change is expressed with, and [`EventedStore`], a wrapper that
//! publishes committed writes to the live feed. Backends live in separate
//! crates (`roadguard-db-memory`).

mod error;
pub mod evented;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use evented::EventedStore;
pub use traits::EventStore;
pub use types::{EventMutation, EventPredicate, UpdateOutcome};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared event store trait object.
pub type DynEventStore = std::sync::Arc<dyn EventStore>;
