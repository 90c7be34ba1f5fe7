//! Initial contact notification for a freshly reported event.
//!
//! Runs on a detached task after `report` returns. The outcome of the
//! channel sends never blocks the lifecycle: once every send was attempted
//! the event is marked notified, successful or not.

use std::sync::Arc;

use roadguard_core::{AccidentEvent, EventStatus, now_utc};
use roadguard_notifications::{
    AlertComposer, ContactDirectory, DispatchReport, NotificationDispatcher,
    NotificationMetadata,
};
use roadguard_storage::{DynEventStore, EventMutation, EventPredicate, StorageError};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Event {0} disappeared before notification")]
    EventMissing(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// How the notification time was recorded on the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMark {
    /// `reported` -> `notified`, with `contactsNotifiedAt`
    Notified,
    /// An operator already moved the event on; only `contactsNotifiedAt` was set
    TimestampOnly,
    /// `contactsNotifiedAt` was already set
    AlreadyRecorded,
}

#[derive(Debug, Clone)]
pub struct NotifyOutcome {
    pub report: DispatchReport,
    pub mark: NotifyMark,
    pub event: AccidentEvent,
}

pub struct InitialNotifier {
    store: DynEventStore,
    directory: Arc<dyn ContactDirectory>,
    dispatcher: NotificationDispatcher,
    composer: AlertComposer,
}

impl InitialNotifier {
    pub fn new(
        store: DynEventStore,
        directory: Arc<dyn ContactDirectory>,
        dispatcher: NotificationDispatcher,
        composer: AlertComposer,
    ) -> Self {
        Self {
            store,
            directory,
            dispatcher,
            composer,
        }
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    /// Run [`InitialNotifier::notify`] on a detached task. Failures are logged.
    pub fn spawn(self: &Arc<Self>, event_id: String) -> JoinHandle<()> {
        let notifier = Arc::clone(self);
        tokio::spawn(async move {
            match notifier.notify(&event_id).await {
                Ok(outcome) => info!(
                    event_id = %event_id,
                    status = %outcome.event.status,
                    mark = ?outcome.mark,
                    attempted = outcome.report.attempted(),
                    failed = outcome.report.failed(),
                    "Initial notification completed"
                ),
                Err(e) => error!(event_id = %event_id, error = %e, "Initial notification failed"),
            }
        })
    }

    /// Alert the reporter's contacts, then record the notification time.
    pub async fn notify(&self, event_id: &str) -> Result<NotifyOutcome, NotifyError> {
        let event = self
            .store
            .get(event_id)
            .await?
            .ok_or_else(|| NotifyError::EventMissing(event_id.to_string()))?;

        let contacts = match self.directory.contacts_for(&event.user_id).await {
            Ok(contacts) => contacts,
            Err(e) => {
                warn!(
                    event_id,
                    user_id = %event.user_id,
                    error = %e,
                    "Contact lookup failed, notifying nobody"
                );
                Vec::new()
            }
        };
        if contacts.is_empty() {
            warn!(event_id, user_id = %event.user_id, "No emergency contacts on file");
        }

        let message = self.composer.compose(&event);
        let report = self
            .dispatcher
            .notify_contacts(&contacts, &message, &NotificationMetadata::for_event(event_id))
            .await;

        let (mark, event) = self.mark_notified(event_id).await?;
        Ok(NotifyOutcome {
            report,
            mark,
            event,
        })
    }

    async fn mark_notified(&self, event_id: &str) -> Result<(NotifyMark, AccidentEvent), NotifyError> {
        let now = now_utc();

        let outcome = self
            .store
            .update_if(
                event_id,
                &EventPredicate::any()
                    .status_in(&[EventStatus::Reported])
                    .not_yet_notified(),
                &EventMutation::new()
                    .status(EventStatus::Notified)
                    .contacts_notified_at(now),
            )
            .await?;
        if outcome.is_applied() {
            return Ok((NotifyMark::Notified, outcome.into_event()));
        }

        // Status already moved past `reported`; keep it and record the time only.
        let outcome = self
            .store
            .update_if(
                event_id,
                &EventPredicate::any().not_yet_notified(),
                &EventMutation::new().contacts_notified_at(now),
            )
            .await?;
        let mark = if outcome.is_applied() {
            NotifyMark::TimestampOnly
        } else {
            NotifyMark::AlreadyRecorded
        };
        Ok((mark, outcome.into_event()))
    }
}
