//! Storage trait for accident events.

use async_trait::async_trait;
use roadguard_core::AccidentEvent;
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::types::{EventMutation, EventPredicate, UpdateOutcome};

/// The contract every event store backend implements.
///
/// Events are never deleted. All status changes go through
/// [`EventStore::update_if`], which must evaluate the predicate and apply the
/// mutation as a single atomic step per event; a fetch-mutate-save sequence
/// without a concurrency guard does not satisfy this trait.
///
/// # Example
///
/// ```ignore
/// use roadguard_storage::{EventMutation, EventPredicate, EventStore};
///
/// async fn escalate(store: &dyn EventStore, id: &str, now: OffsetDateTime) {
///     let outcome = store
///         .update_if(
///             id,
///             &EventPredicate::escalation_due(now - deadline),
///             &EventMutation::new().status(EventStatus::Escalated).escalated_at(now),
///         )
///         .await?;
/// }
/// ```
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persists a new event.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if the id is taken.
    async fn create(&self, event: AccidentEvent) -> Result<AccidentEvent, StorageError>;

    /// Fetches an event by id. Returns `None` if it does not exist.
    async fn get(&self, id: &str) -> Result<Option<AccidentEvent>, StorageError>;

    /// Events reported by a user, most recent first.
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<AccidentEvent>, StorageError>;

    /// The `limit` most recently created events, most recent first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<AccidentEvent>, StorageError>;

    /// Events that are notified, unacknowledged, not escalated, and were
    /// notified at or before `cutoff`, oldest notification first.
    async fn find_escalation_candidates(
        &self,
        cutoff: OffsetDateTime,
        limit: usize,
    ) -> Result<Vec<AccidentEvent>, StorageError>;

    /// Atomically applies `mutation` to event `id` if `predicate` holds.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the event does not exist. A failed
    /// predicate is not an error; it yields `UpdateOutcome::Rejected`.
    async fn update_if(
        &self,
        id: &str,
        predicate: &EventPredicate,
        mutation: &EventMutation,
    ) -> Result<UpdateOutcome, StorageError>;

    /// Returns the name of this backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
