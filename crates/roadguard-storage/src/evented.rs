//! EventedStore - an event store wrapper that publishes committed writes.
//!
//! This wrapper delegates all operations to an inner store and publishes to
//! the live feed after every successful write: `NEW_EVENT` after `create`,
//! `UPDATE_EVENT` after an applied conditional update. Rejected updates and
//! reads publish nothing.
//!
//! # Example
//!
//! ```ignore
//! use roadguard_core::FeedBroadcaster;
//! use roadguard_storage::EventedStore;
//!
//! let broadcaster = FeedBroadcaster::new_shared();
//! let store = EventedStore::new(InMemoryEventStore::new(), broadcaster);
//!
//! // Observers now receive NEW_EVENT for this event
//! store.create(event).await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use roadguard_core::{AccidentEvent, FeedBroadcaster, FeedMessage};
use time::OffsetDateTime;
use tracing::debug;

use crate::error::StorageError;
use crate::traits::EventStore;
use crate::types::{EventMutation, EventPredicate, UpdateOutcome};

/// An event store that publishes every committed write to a [`FeedBroadcaster`].
///
/// Messages are published **after** the inner write succeeds, so every
/// message reflects persisted state. Ordering between concurrent writers of
/// the same event is enforced by the broadcaster's version gate.
pub struct EventedStore<S: EventStore> {
    inner: S,
    broadcaster: Arc<FeedBroadcaster>,
}

impl<S: EventStore> EventedStore<S> {
    /// Create a new evented store wrapper.
    pub fn new(inner: S, broadcaster: Arc<FeedBroadcaster>) -> Self {
        Self { inner, broadcaster }
    }

    /// Get a reference to the inner store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Get a reference to the broadcaster.
    pub fn broadcaster(&self) -> &Arc<FeedBroadcaster> {
        &self.broadcaster
    }

    fn emit(&self, message: FeedMessage) {
        let message_type = message.message_type;
        let event_id = message.payload.id.clone();
        let status = message.payload.status;
        let version = message.payload.version;
        let count = self.broadcaster.publish(message);
        debug!(
            event_id = %event_id,
            message_type = %message_type,
            status = %status,
            version,
            observers = count,
            "Published feed message"
        );
    }
}

#[async_trait]
impl<S: EventStore> EventStore for EventedStore<S> {
    async fn create(&self, event: AccidentEvent) -> Result<AccidentEvent, StorageError> {
        let created = self.inner.create(event).await?;
        self.emit(FeedMessage::new_event(created.clone()));
        Ok(created)
    }

    async fn get(&self, id: &str) -> Result<Option<AccidentEvent>, StorageError> {
        self.inner.get(id).await
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<AccidentEvent>, StorageError> {
        self.inner.list_by_user(user_id).await
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<AccidentEvent>, StorageError> {
        self.inner.list_recent(limit).await
    }

    async fn find_escalation_candidates(
        &self,
        cutoff: OffsetDateTime,
        limit: usize,
    ) -> Result<Vec<AccidentEvent>, StorageError> {
        self.inner.find_escalation_candidates(cutoff, limit).await
    }

    async fn update_if(
        &self,
        id: &str,
        predicate: &EventPredicate,
        mutation: &EventMutation,
    ) -> Result<UpdateOutcome, StorageError> {
        let outcome = self.inner.update_if(id, predicate, mutation).await?;
        if let UpdateOutcome::Applied(event) = &outcome {
            self.emit(FeedMessage::update_event(event.clone()));
        }
        Ok(outcome)
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roadguard_core::{AccidentReport, EventStatus, FeedMessageType, GeoLocation};
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MapStore {
        events: Mutex<HashMap<String, AccidentEvent>>,
    }

    #[async_trait]
    impl EventStore for MapStore {
        async fn create(&self, event: AccidentEvent) -> Result<AccidentEvent, StorageError> {
            self.events
                .lock()
                .await
                .insert(event.id.clone(), event.clone());
            Ok(event)
        }

        async fn get(&self, id: &str) -> Result<Option<AccidentEvent>, StorageError> {
            Ok(self.events.lock().await.get(id).cloned())
        }

        async fn list_by_user(&self, _user_id: &str) -> Result<Vec<AccidentEvent>, StorageError> {
            Ok(Vec::new())
        }

        async fn list_recent(&self, _limit: usize) -> Result<Vec<AccidentEvent>, StorageError> {
            Ok(Vec::new())
        }

        async fn find_escalation_candidates(
            &self,
            _cutoff: OffsetDateTime,
            _limit: usize,
        ) -> Result<Vec<AccidentEvent>, StorageError> {
            Ok(Vec::new())
        }

        async fn update_if(
            &self,
            id: &str,
            predicate: &EventPredicate,
            mutation: &EventMutation,
        ) -> Result<UpdateOutcome, StorageError> {
            let mut events = self.events.lock().await;
            let event = events.get_mut(id).ok_or_else(|| StorageError::not_found(id))?;
            if !predicate.matches(event) {
                return Ok(UpdateOutcome::Rejected(event.clone()));
            }
            mutation.apply(event);
            Ok(UpdateOutcome::Applied(event.clone()))
        }

        fn backend_name(&self) -> &'static str {
            "map"
        }
    }

    fn event() -> AccidentEvent {
        let report = AccidentReport::new(
            "u1",
            GeoLocation { lat: 0.5, lng: 0.5 },
            0.3,
            OffsetDateTime::now_utc(),
        )
        .unwrap();
        AccidentEvent::from_report("e1", report, OffsetDateTime::now_utc())
    }

    #[tokio::test]
    async fn test_create_publishes_new_event() {
        let broadcaster = FeedBroadcaster::new_shared();
        let mut rx = broadcaster.subscribe();
        let store = EventedStore::new(MapStore::default(), broadcaster);

        store.create(event()).await.unwrap();

        let message = rx.recv().await.unwrap();
        assert_eq!(message.message_type, FeedMessageType::NewEvent);
        assert_eq!(message.payload.status, EventStatus::Reported);
    }

    #[tokio::test]
    async fn test_only_applied_updates_publish() {
        let broadcaster = FeedBroadcaster::new_shared();
        let store = EventedStore::new(MapStore::default(), broadcaster.clone());
        store.create(event()).await.unwrap();
        let mut rx = broadcaster.subscribe();

        let rejected = store
            .update_if(
                "e1",
                &EventPredicate::any().status_in(&[EventStatus::Notified]),
                &EventMutation::new().status(EventStatus::Escalated),
            )
            .await
            .unwrap();
        assert!(!rejected.is_applied());

        let applied = store
            .update_if(
                "e1",
                &EventPredicate::any().status_in(&[EventStatus::Reported]),
                &EventMutation::new().status(EventStatus::Assigned),
            )
            .await
            .unwrap();
        assert!(applied.is_applied());

        let message = rx.recv().await.unwrap();
        assert_eq!(message.message_type, FeedMessageType::UpdateEvent);
        assert_eq!(message.payload.status, EventStatus::Assigned);
        assert_eq!(message.payload.version, 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_event_propagates_not_found() {
        let store = EventedStore::new(MapStore::default(), FeedBroadcaster::new_shared());
        let err = store
            .update_if("nope", &EventPredicate::any(), &EventMutation::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.backend_name(), "map");
    }
}
