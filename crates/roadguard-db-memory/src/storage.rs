use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use roadguard_core::AccidentEvent;
use roadguard_storage::{EventMutation, EventPredicate, EventStore, StorageError, UpdateOutcome};
use time::OffsetDateTime;
use tracing::trace;

/// A stored event plus its insertion sequence number.
#[derive(Debug, Clone)]
struct StoredEntry {
    event: AccidentEvent,
    seq: u64,
}

/// In-memory event store using a sharded concurrent map.
///
/// This backend provides:
/// - Concurrent reads across shards
/// - Atomic conditional updates under the entry's shard lock
/// - Creation order tracking for "most recent first" listings
///
/// Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: DashMap<String, StoredEntry>,
    /// Monotonic insertion counter
    seq: AtomicU64,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Entries matching `filter`, most recently created first.
    fn collect_newest_first<F>(&self, filter: F) -> Vec<StoredEntry>
    where
        F: Fn(&AccidentEvent) -> bool,
    {
        let mut entries: Vec<StoredEntry> = self
            .events
            .iter()
            .filter(|entry| filter(&entry.event))
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by(|a, b| b.seq.cmp(&a.seq));
        entries
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn create(&self, event: AccidentEvent) -> Result<AccidentEvent, StorageError> {
        use dashmap::mapref::entry::Entry;

        match self.events.entry(event.id.clone()) {
            Entry::Occupied(_) => Err(StorageError::already_exists(&event.id)),
            Entry::Vacant(slot) => {
                let seq = self.next_seq();
                slot.insert(StoredEntry {
                    event: event.clone(),
                    seq,
                });
                trace!(event_id = %event.id, seq, "Stored new event");
                Ok(event)
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Option<AccidentEvent>, StorageError> {
        Ok(self.events.get(id).map(|entry| entry.event.clone()))
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<AccidentEvent>, StorageError> {
        Ok(self
            .collect_newest_first(|event| event.user_id == user_id)
            .into_iter()
            .map(|entry| entry.event)
            .collect())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<AccidentEvent>, StorageError> {
        Ok(self
            .collect_newest_first(|_| true)
            .into_iter()
            .take(limit)
            .map(|entry| entry.event)
            .collect())
    }

    async fn find_escalation_candidates(
        &self,
        cutoff: OffsetDateTime,
        limit: usize,
    ) -> Result<Vec<AccidentEvent>, StorageError> {
        let predicate = EventPredicate::escalation_due(cutoff);
        let mut candidates: Vec<AccidentEvent> = self
            .events
            .iter()
            .filter(|entry| predicate.matches(&entry.event))
            .map(|entry| entry.event.clone())
            .collect();
        candidates.sort_by_key(|event| event.contacts_notified_at);
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn update_if(
        &self,
        id: &str,
        predicate: &EventPredicate,
        mutation: &EventMutation,
    ) -> Result<UpdateOutcome, StorageError> {
        // The write guard covers the check and the mutation.
        let mut entry = self
            .events
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found(id))?;

        if !predicate.matches(&entry.event) {
            trace!(event_id = %id, status = %entry.event.status, "Conditional update rejected");
            return Ok(UpdateOutcome::Rejected(entry.event.clone()));
        }

        mutation.apply(&mut entry.event);
        trace!(
            event_id = %id,
            status = %entry.event.status,
            version = entry.event.version,
            "Conditional update applied"
        );
        Ok(UpdateOutcome::Applied(entry.event.clone()))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roadguard_core::{AccidentReport, EventStatus, GeoLocation};
    use std::sync::Arc;
    use time::Duration;
    use time::macros::datetime;

    fn event(id: &str, user: &str) -> AccidentEvent {
        let report = AccidentReport::new(
            user,
            GeoLocation { lat: 51.5, lng: -0.12 },
            0.7,
            datetime!(2026-02-01 08:00 UTC),
        )
        .unwrap();
        AccidentEvent::from_report(id, report, datetime!(2026-02-01 08:00 UTC))
    }

    fn notified(id: &str, at: OffsetDateTime) -> AccidentEvent {
        let mut e = event(id, "u1");
        e.status = EventStatus::Notified;
        e.contacts_notified_at = Some(at);
        e
    }

    #[tokio::test]
    async fn test_store_basic_operations() {
        let store = InMemoryEventStore::new();
        assert!(store.is_empty());

        store.create(event("e1", "u1")).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("e1").await.unwrap().unwrap().user_id, "u1");
        assert!(store.get("missing").await.unwrap().is_none());
        assert_eq!(store.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_duplicate_id_conflicts() {
        let store = InMemoryEventStore::new();
        store.create(event("e1", "u1")).await.unwrap();
        let err = store.create(event("e1", "u2")).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));
        assert_eq!(store.get("e1").await.unwrap().unwrap().user_id, "u1");
    }

    #[tokio::test]
    async fn test_listings_are_newest_first() {
        let store = InMemoryEventStore::new();
        store.create(event("a", "u1")).await.unwrap();
        store.create(event("b", "u2")).await.unwrap();
        store.create(event("c", "u1")).await.unwrap();

        let ids: Vec<_> = store
            .list_by_user("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, ["c", "a"]);

        let recent: Vec<_> = store
            .list_recent(2)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(recent, ["c", "b"]);
        assert!(store.list_by_user("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_escalation_candidates_oldest_first() {
        let store = InMemoryEventStore::new();
        let now = datetime!(2026-02-01 09:00 UTC);
        let cutoff = now - Duration::minutes(2);

        store.create(notified("late", now - Duration::minutes(3))).await.unwrap();
        store.create(notified("early", now - Duration::minutes(10))).await.unwrap();
        store.create(notified("fresh", now - Duration::seconds(30))).await.unwrap();
        let mut acked = notified("acked", now - Duration::minutes(5));
        acked.acknowledged = true;
        store.create(acked).await.unwrap();
        store.create(event("reported", "u1")).await.unwrap();

        let ids: Vec<_> = store
            .find_escalation_candidates(cutoff, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, ["early", "late"]);

        let limited = store.find_escalation_candidates(cutoff, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, "early");
    }

    #[tokio::test]
    async fn test_update_if_applies_and_rejects() {
        let store = InMemoryEventStore::new();
        store.create(event("e1", "u1")).await.unwrap();

        let outcome = store
            .update_if(
                "e1",
                &EventPredicate::any().status_in(&[EventStatus::Reported]),
                &EventMutation::new().status(EventStatus::Dispatched),
            )
            .await
            .unwrap();
        assert!(outcome.is_applied());
        assert_eq!(outcome.event().version, 2);

        let outcome = store
            .update_if(
                "e1",
                &EventPredicate::any().status_in(&[EventStatus::Reported]),
                &EventMutation::new().status(EventStatus::Assigned),
            )
            .await
            .unwrap();
        assert!(!outcome.is_applied());
        assert_eq!(outcome.event().status, EventStatus::Dispatched);
        assert_eq!(outcome.event().version, 2);

        let err = store
            .update_if("nope", &EventPredicate::any(), &EventMutation::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_escalation_applies_once() {
        let store = Arc::new(InMemoryEventStore::new());
        let now = datetime!(2026-02-01 09:00 UTC);
        store.create(notified("e1", now - Duration::minutes(5))).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update_if(
                        "e1",
                        &EventPredicate::escalation_due(now - Duration::minutes(2)),
                        &EventMutation::new()
                            .status(EventStatus::Escalated)
                            .escalated_at(now),
                    )
                    .await
                    .unwrap()
                    .is_applied()
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
        let stored = store.get("e1").await.unwrap().unwrap();
        assert_eq!(stored.status, EventStatus::Escalated);
        assert_eq!(stored.version, 2);
    }
}
