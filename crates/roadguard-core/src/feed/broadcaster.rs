//! Broadcaster for the live event feed.
//!
//! The `FeedBroadcaster` is the bus every committed event write goes through.
//! It uses tokio's broadcast channel for multi-subscriber delivery and a
//! per-event version gate so observers never see an older state of an event
//! after a newer one.
//!
//! Gate entries of events in a terminal status are dropped once they have
//! been settled for the retention period, so the gate only tracks events
//! that can still change.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::FeedMessage;

/// Default buffer size for the broadcast channel.
/// Slow observers that fall further behind skip the oldest messages.
const DEFAULT_BUFFER_SIZE: usize = 1024;

/// How long a settled event keeps its gate entry.
const DEFAULT_SETTLED_RETENTION: Duration = Duration::from_secs(10 * 60);

/// Publishes between two sweeps of settled gate entries.
const PRUNE_EVERY: u64 = 256;

#[derive(Debug, Default)]
struct GateEntry {
    version: u64,
    /// Set while the last published status is terminal
    settled_at: Option<Instant>,
}

/// Broadcaster for feed messages.
///
/// Cheap to clone; all clones share the channel and the version gate.
///
/// # Example
///
/// ```
/// use roadguard_core::feed::FeedBroadcaster;
///
/// let broadcaster = FeedBroadcaster::new();
/// let _receiver = broadcaster.subscribe();
/// assert_eq!(broadcaster.subscriber_count(), 1);
/// ```
#[derive(Clone)]
pub struct FeedBroadcaster {
    sender: broadcast::Sender<FeedMessage>,
    /// Last published version per event id
    published: Arc<DashMap<String, GateEntry>>,
    publishes: Arc<AtomicU64>,
    retention: Duration,
}

impl FeedBroadcaster {
    /// Create a new broadcaster with default buffer size.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    /// Create a new broadcaster with custom buffer size.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: Arc::new(DashMap::new()),
            publishes: Arc::new(AtomicU64::new(0)),
            retention: DEFAULT_SETTLED_RETENTION,
        }
    }

    /// Keep gate entries of settled events for `retention`.
    ///
    /// A message for an event whose entry was already dropped passes the
    /// gate again, so `retention` must outlast any in-flight publish.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Create a new broadcaster wrapped in an Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Publish a message to all current subscribers.
    ///
    /// Returns the number of subscribers that received it. Returns 0 when
    /// nobody is subscribed or when the message carries a version that was
    /// already superseded for its event.
    pub fn publish(&self, message: FeedMessage) -> usize {
        let sent = {
            let version = message.payload.version;
            // The entry guard is held across the send so two writers of the same
            // event cannot interleave their gate check and their send.
            let mut last = self
                .published
                .entry(message.payload.id.clone())
                .or_default();
            if version <= last.version {
                debug!(
                    event_id = %message.payload.id,
                    version,
                    last_published = last.version,
                    "Dropped stale feed message"
                );
                return 0;
            }
            last.version = version;
            last.settled_at = message.payload.status.is_terminal().then(Instant::now);
            self.sender.send(message).unwrap_or_default()
        };

        if self.publishes.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune_settled();
        }
        sent
    }

    /// Drop gate entries of events settled for longer than the retention
    /// period. Returns how many entries were removed.
    pub fn prune_settled(&self) -> usize {
        let before = self.published.len();
        self.published.retain(|_, entry| {
            entry
                .settled_at
                .is_none_or(|at| at.elapsed() < self.retention)
        });
        let removed = before.saturating_sub(self.published.len());
        if removed > 0 {
            debug!(removed, "Pruned settled feed gate entries");
        }
        removed
    }

    /// Subscribe to the feed.
    ///
    /// The receiver only sees messages published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedMessage> {
        self.sender.subscribe()
    }

    /// Get the number of connected observers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any connected observers.
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }

    /// Last version published for an event, if any.
    pub fn last_published_version(&self, event_id: &str) -> Option<u64> {
        self.published.get(event_id).map(|entry| entry.version)
    }

    /// Number of events the version gate currently tracks.
    pub fn tracked_events(&self) -> usize {
        self.published.len()
    }
}

impl Default for FeedBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FeedBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedBroadcaster")
            .field("subscriber_count", &self.subscriber_count())
            .field("tracked_events", &self.tracked_events())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AccidentEvent, AccidentReport, EventStatus, GeoLocation};
    use crate::feed::FeedMessageType;
    use time::OffsetDateTime;
    use tokio_test::block_on;

    fn event(id: &str, version: u64) -> AccidentEvent {
        let report = AccidentReport::new(
            "u1",
            GeoLocation { lat: 10.0, lng: 20.0 },
            0.4,
            OffsetDateTime::now_utc(),
        )
        .unwrap();
        let mut event = AccidentEvent::from_report(id, report, OffsetDateTime::now_utc());
        event.version = version;
        event
    }

    #[test]
    fn test_broadcaster_creation() {
        let broadcaster = FeedBroadcaster::new();
        assert_eq!(broadcaster.subscriber_count(), 0);
        assert!(!broadcaster.has_subscribers());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let broadcaster = FeedBroadcaster::new();
        let count = broadcaster.publish(FeedMessage::new_event(event("e1", 1)));
        assert_eq!(count, 0);
        assert_eq!(broadcaster.last_published_version("e1"), Some(1));
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive() {
        let broadcaster = FeedBroadcaster::new();
        let mut rx1 = broadcaster.subscribe();
        let mut rx2 = broadcaster.subscribe();

        let count = broadcaster.publish(FeedMessage::new_event(event("e1", 1)));
        assert_eq!(count, 2);

        let m1 = rx1.recv().await.unwrap();
        let m2 = rx2.recv().await.unwrap();
        assert_eq!(m1.message_type, FeedMessageType::NewEvent);
        assert_eq!(m2.event_id(), "e1");
    }

    #[tokio::test]
    async fn test_stale_version_is_dropped() {
        let broadcaster = FeedBroadcaster::new();
        let mut rx = broadcaster.subscribe();

        broadcaster.publish(FeedMessage::new_event(event("e1", 1)));
        let mut newer = event("e1", 3);
        newer.status = EventStatus::Assigned;
        broadcaster.publish(FeedMessage::update_event(newer));
        assert_eq!(broadcaster.publish(FeedMessage::update_event(event("e1", 2))), 0);

        assert_eq!(rx.recv().await.unwrap().payload.version, 1);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.payload.version, 3);
        assert_eq!(second.payload.status, EventStatus::Assigned);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_late_subscriber_sees_no_replay() {
        let broadcaster = FeedBroadcaster::new();
        broadcaster.publish(FeedMessage::new_event(event("e1", 1)));

        let mut rx = broadcaster.subscribe();
        broadcaster.publish(FeedMessage::update_event(event("e1", 2)));
        block_on(async {
            assert_eq!(rx.recv().await.unwrap().payload.version, 2);
        });
    }

    fn settled(id: &str, version: u64) -> FeedMessage {
        let mut event = event(id, version);
        event.status = EventStatus::Escalated;
        FeedMessage::update_event(event)
    }

    #[test]
    fn test_settled_entries_are_pruned() {
        let broadcaster = FeedBroadcaster::new().with_retention(Duration::ZERO);
        broadcaster.publish(FeedMessage::new_event(event("e1", 1)));
        broadcaster.publish(settled("e1", 2));
        broadcaster.publish(FeedMessage::new_event(event("e2", 1)));
        assert_eq!(broadcaster.tracked_events(), 2);

        assert_eq!(broadcaster.prune_settled(), 1);
        assert_eq!(broadcaster.tracked_events(), 1);
        assert_eq!(broadcaster.last_published_version("e1"), None);
        assert_eq!(broadcaster.last_published_version("e2"), Some(1));
    }

    #[test]
    fn test_recently_settled_entries_still_gate() {
        let broadcaster = FeedBroadcaster::new();
        let mut rx = broadcaster.subscribe();
        broadcaster.publish(settled("e1", 3));

        assert_eq!(broadcaster.prune_settled(), 0);
        assert_eq!(broadcaster.publish(FeedMessage::update_event(event("e1", 2))), 0);
        assert_eq!(rx.try_recv().unwrap().payload.version, 3);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_gate_stays_bounded_under_churn() {
        let broadcaster = FeedBroadcaster::new().with_retention(Duration::ZERO);
        for i in 0..PRUNE_EVERY * 4 {
            let id = format!("e{i}");
            broadcaster.publish(FeedMessage::new_event(event(&id, 1)));
            broadcaster.publish(settled(&id, 2));
        }
        assert!(broadcaster.tracked_events() < PRUNE_EVERY as usize);
    }

    #[test]
    fn test_broadcaster_shared() {
        let broadcaster = FeedBroadcaster::new_shared();
        let other = broadcaster.clone();
        let _rx = broadcaster.subscribe();
        assert_eq!(other.subscriber_count(), 1);
    }
}
