//! Event lifecycle controller.
//!
//! Every state change is one conditional update against the store, so
//! concurrent operators and the escalation scheduler never overwrite each
//! other's decisions. Feed messages are published by the store wrapper.

use std::sync::Arc;

use roadguard_api::ApiError;
use roadguard_core::{
    AccidentEvent, AccidentReport, CoreError, Transition, generate_id, now_utc, validate_id,
};
use roadguard_storage::{DynEventStore, EventMutation, EventPredicate, StorageError, UpdateOutcome};
use thiserror::Error;
use tracing::{debug, info};

use crate::notify::InitialNotifier;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Core(e) => e.into(),
            LifecycleError::Storage(e) => e.into(),
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

pub struct LifecycleController {
    store: DynEventStore,
    notifier: Arc<InitialNotifier>,
}

impl LifecycleController {
    pub fn new(store: DynEventStore, notifier: Arc<InitialNotifier>) -> Self {
        Self { store, notifier }
    }

    pub fn store(&self) -> &DynEventStore {
        &self.store
    }

    /// Persist a validated report and start contact notification.
    ///
    /// Returns as soon as the event is stored; notification runs detached.
    pub async fn report(&self, report: AccidentReport) -> LifecycleResult<AccidentEvent> {
        let event = AccidentEvent::from_report(generate_id(), report, now_utc());
        let event = self.store.create(event).await?;
        info!(
            event_id = %event.id,
            user_id = %event.user_id,
            severity = event.severity,
            "Accident reported"
        );
        self.notifier.spawn(event.id.clone());
        Ok(event)
    }

    pub async fn acknowledge(&self, id: &str) -> LifecycleResult<AccidentEvent> {
        self.apply(id, Transition::Acknowledge).await
    }

    pub async fn assign(&self, id: &str) -> LifecycleResult<AccidentEvent> {
        self.apply(id, Transition::Assign).await
    }

    pub async fn dispatch(&self, id: &str) -> LifecycleResult<AccidentEvent> {
        self.apply(id, Transition::Dispatch).await
    }

    pub async fn get(&self, id: &str) -> LifecycleResult<AccidentEvent> {
        validate_id(id)?;
        self.store
            .get(id)
            .await?
            .ok_or_else(|| CoreError::not_found(id).into())
    }

    /// Most recently reported events first.
    pub async fn recent(&self, limit: usize) -> LifecycleResult<Vec<AccidentEvent>> {
        Ok(self.store.list_recent(limit).await?)
    }

    /// A user's events, most recent first.
    pub async fn by_user(&self, user_id: &str) -> LifecycleResult<Vec<AccidentEvent>> {
        Ok(self.store.list_by_user(user_id).await?)
    }

    async fn apply(&self, id: &str, transition: Transition) -> LifecycleResult<AccidentEvent> {
        validate_id(id)?;

        let mut mutation = EventMutation::new().status(transition.target());
        if transition == Transition::Acknowledge {
            mutation = mutation.acknowledged(true);
        }
        let predicate = EventPredicate::any().status_in(transition.allowed_from());

        match self.store.update_if(id, &predicate, &mutation).await {
            Ok(UpdateOutcome::Applied(event)) => {
                info!(
                    event_id = %id,
                    transition = %transition,
                    status = %event.status,
                    version = event.version,
                    "Event transitioned"
                );
                Ok(event)
            }
            Ok(UpdateOutcome::Rejected(current)) => {
                debug!(
                    event_id = %id,
                    transition = %transition,
                    status = %current.status,
                    "Transition rejected"
                );
                Err(CoreError::invalid_transition(id, transition.as_str(), current.status).into())
            }
            Err(e) if e.is_not_found() => Err(CoreError::not_found(id).into()),
            Err(e) => Err(e.into()),
        }
    }
}
