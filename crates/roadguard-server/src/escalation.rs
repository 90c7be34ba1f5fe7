//! Escalation scheduler.
//!
//! On every tick the scheduler looks for events that were notified at least
//! `deadline` ago and are still unacknowledged, and moves each of them to
//! `escalated` with a conditional update that re-checks the whole condition.
//! Overlapping or repeated scans therefore escalate an event at most once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use roadguard_core::{AccidentEvent, EventStatus, now_utc};
use roadguard_storage::{DynEventStore, EventMutation, EventPredicate, StorageError};
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Source of scan instants.
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick. `None` ends the scheduler loop.
    async fn tick(&mut self) -> Option<OffsetDateTime>;
}

/// Wall-clock ticker on a fixed period.
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> Option<OffsetDateTime> {
        self.interval.tick().await;
        Some(now_utc())
    }
}

/// Ticker driven by hand, for tests and tooling.
pub struct ManualTicker {
    rx: mpsc::UnboundedReceiver<OffsetDateTime>,
}

/// Sending side of a [`ManualTicker`]. Dropping every handle ends the loop.
#[derive(Clone)]
pub struct ManualTickHandle {
    tx: mpsc::UnboundedSender<OffsetDateTime>,
}

impl ManualTicker {
    pub fn new() -> (Self, ManualTickHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, ManualTickHandle { tx })
    }
}

impl ManualTickHandle {
    /// Fire a tick that scans as of `now`. Returns false once the loop stopped.
    pub fn tick_at(&self, now: OffsetDateTime) -> bool {
        self.tx.send(now).is_ok()
    }

    pub fn tick(&self) -> bool {
        self.tick_at(now_utc())
    }
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) -> Option<OffsetDateTime> {
        self.rx.recv().await
    }
}

/// Counts for one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Events returned by the candidate query
    pub candidates: usize,
    pub escalated: usize,
    /// Candidates whose state changed before the update ran
    pub skipped: usize,
    /// Candidates whose update errored
    pub failed: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("escalation cutoff {deadline} before {now} is out of range")]
    DeadlineOutOfRange {
        now: OffsetDateTime,
        deadline: time::Duration,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

enum EscalationResult {
    Escalated,
    Skipped,
    Failed,
}

pub struct EscalationScheduler {
    store: DynEventStore,
    deadline: time::Duration,
    batch_limit: usize,
}

impl EscalationScheduler {
    pub fn new(store: DynEventStore, deadline: time::Duration, batch_limit: usize) -> Self {
        Self {
            store,
            deadline,
            batch_limit,
        }
    }

    pub fn deadline(&self) -> time::Duration {
        self.deadline
    }

    /// Escalate everything overdue as of `now`.
    ///
    /// # Errors
    ///
    /// Fails when `now - deadline` is not a representable instant or the
    /// candidate query fails. Per-event failures are logged and counted in
    /// the report.
    pub async fn scan_at(&self, now: OffsetDateTime) -> Result<ScanReport, ScanError> {
        let cutoff = now
            .checked_sub(self.deadline)
            .ok_or(ScanError::DeadlineOutOfRange {
                now,
                deadline: self.deadline,
            })?;
        let candidates = self
            .store
            .find_escalation_candidates(cutoff, self.batch_limit)
            .await?;

        let mut report = ScanReport {
            candidates: candidates.len(),
            ..Default::default()
        };
        if candidates.is_empty() {
            return Ok(report);
        }

        let results = join_all(
            candidates
                .iter()
                .map(|event| self.escalate_one(event, cutoff, now)),
        )
        .await;
        for result in results {
            match result {
                EscalationResult::Escalated => report.escalated += 1,
                EscalationResult::Skipped => report.skipped += 1,
                EscalationResult::Failed => report.failed += 1,
            }
        }
        Ok(report)
    }

    async fn escalate_one(
        &self,
        event: &AccidentEvent,
        cutoff: OffsetDateTime,
        now: OffsetDateTime,
    ) -> EscalationResult {
        let outcome = self
            .store
            .update_if(
                &event.id,
                &EventPredicate::escalation_due(cutoff),
                &EventMutation::new()
                    .status(EventStatus::Escalated)
                    .escalated_at(now),
            )
            .await;

        match outcome {
            Ok(outcome) if outcome.is_applied() => {
                warn!(
                    event_id = %event.id,
                    user_id = %event.user_id,
                    notified_at = ?event.contacts_notified_at,
                    "Event escalated: no acknowledgment before deadline"
                );
                EscalationResult::Escalated
            }
            Ok(outcome) => {
                debug!(
                    event_id = %event.id,
                    status = %outcome.event().status,
                    "Escalation skipped, event changed since the scan"
                );
                EscalationResult::Skipped
            }
            Err(e) => {
                error!(event_id = %event.id, error = %e, "Escalation update failed");
                EscalationResult::Failed
            }
        }
    }

    async fn scan_and_log(&self, now: OffsetDateTime) {
        match self.scan_at(now).await {
            Ok(report) if report.candidates > 0 => info!(
                candidates = report.candidates,
                escalated = report.escalated,
                skipped = report.skipped,
                failed = report.failed,
                "Escalation scan completed"
            ),
            Ok(_) => debug!("Escalation scan found no candidates"),
            Err(e) => error!(error = %e, "Escalation scan failed"),
        }
    }

    /// Scan on every tick until `shutdown` flips to true, its sender is
    /// dropped, or the ticker ends.
    ///
    /// Each scan runs on its own task so a slow store never delays the
    /// next tick.
    pub async fn run<T: Ticker>(
        self: Arc<Self>,
        mut ticker: T,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            deadline_secs = self.deadline.whole_seconds(),
            batch_limit = self.batch_limit,
            "Escalation scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                tick = ticker.tick() => {
                    match tick {
                        Some(now) => {
                            let scheduler = Arc::clone(&self);
                            tokio::spawn(async move { scheduler.scan_and_log(now).await });
                        }
                        None => break,
                    }
                }
            }
        }

        info!("Escalation scheduler stopped");
    }

    pub fn spawn<T: Ticker + 'static>(
        self: Arc<Self>,
        ticker: T,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(ticker, shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roadguard_core::{AccidentReport, GeoLocation};
    use roadguard_db_memory::InMemoryEventStore;
    use roadguard_storage::EventStore;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2026-03-01 12:00 UTC);

    async fn store_with(events: Vec<AccidentEvent>) -> DynEventStore {
        let store = Arc::new(InMemoryEventStore::new());
        for event in events {
            store.create(event).await.unwrap();
        }
        store
    }

    fn notified(id: &str, minutes_ago: i64) -> AccidentEvent {
        let report =
            AccidentReport::new("u1", GeoLocation { lat: 0.0, lng: 0.0 }, 0.9, NOW).unwrap();
        let mut event = AccidentEvent::from_report(id, report, NOW);
        event.status = EventStatus::Notified;
        event.contacts_notified_at = Some(NOW - time::Duration::minutes(minutes_ago));
        event
    }

    fn scheduler(store: DynEventStore) -> Arc<EscalationScheduler> {
        Arc::new(EscalationScheduler::new(store, time::Duration::minutes(2), 100))
    }

    #[tokio::test]
    async fn test_scan_escalates_only_overdue() {
        let store = store_with(vec![notified("old", 3), notified("fresh", 1)]).await;
        let report = scheduler(store.clone()).scan_at(NOW).await.unwrap();

        assert_eq!(
            report,
            ScanReport {
                candidates: 1,
                escalated: 1,
                skipped: 0,
                failed: 0
            }
        );
        let old = store.get("old").await.unwrap().unwrap();
        assert_eq!(old.status, EventStatus::Escalated);
        assert_eq!(old.escalated_at, Some(NOW));
        assert_eq!(
            store.get("fresh").await.unwrap().unwrap().status,
            EventStatus::Notified
        );
    }

    #[tokio::test]
    async fn test_empty_scan_is_normal() {
        let report = scheduler(store_with(Vec::new()).await)
            .scan_at(NOW)
            .await
            .unwrap();
        assert_eq!(report, ScanReport::default());
    }

    #[tokio::test]
    async fn test_unrepresentable_cutoff_fails_scan() {
        let store = store_with(vec![notified("e1", 3)]).await;
        let far = EscalationScheduler::new(store.clone(), time::Duration::MAX, 100);

        let err = far.scan_at(NOW).await.unwrap_err();
        assert!(matches!(err, ScanError::DeadlineOutOfRange { .. }));
        assert_eq!(
            store.get("e1").await.unwrap().unwrap().status,
            EventStatus::Notified
        );
    }

    #[tokio::test]
    async fn test_repeated_scan_is_noop() {
        let store = store_with(vec![notified("e1", 5)]).await;
        let scheduler = scheduler(store.clone());
        scheduler.scan_at(NOW).await.unwrap();
        let second = scheduler
            .scan_at(NOW + time::Duration::seconds(30))
            .await
            .unwrap();

        assert_eq!(second.candidates, 0);
        let event = store.get("e1").await.unwrap().unwrap();
        assert_eq!(event.escalated_at, Some(NOW));
        assert_eq!(event.version, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_scans_escalate_once() {
        let store = store_with(vec![notified("e1", 3)]).await;
        let a = scheduler(store.clone());
        let b = scheduler(store.clone());

        let (ra, rb) = tokio::join!(a.scan_at(NOW), b.scan_at(NOW));
        let (ra, rb) = (ra.unwrap(), rb.unwrap());

        assert_eq!(ra.escalated + rb.escalated, 1);
        assert_eq!(ra.failed + rb.failed, 0);
        assert_eq!(store.get("e1").await.unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_manual_ticker_drives_loop_until_shutdown() {
        let store = store_with(vec![notified("e1", 10)]).await;
        let (ticker, ticks) = ManualTicker::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = scheduler(store.clone()).spawn(ticker, shutdown_rx);

        assert!(ticks.tick_at(NOW));
        let mut escalated = false;
        for _ in 0..100 {
            if store.get("e1").await.unwrap().unwrap().status == EventStatus::Escalated {
                escalated = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(escalated);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert!(!ticks.tick_at(NOW));
    }

    #[tokio::test]
    async fn test_loop_ends_with_ticker() {
        let (ticker, ticks) = ManualTicker::new();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = scheduler(store_with(Vec::new()).await).spawn(ticker, shutdown_rx);
        drop(ticks);
        handle.await.unwrap();
    }
}
