//! Conditional update types.
//!
//! Every status change is expressed as an [`EventPredicate`] plus an
//! [`EventMutation`]. A backend applies the mutation only if the predicate
//! holds against the currently stored event, as one atomic step. The types
//! are plain data so a relational backend can turn them into
//! `UPDATE ... WHERE ...` and a document store into a filtered update.

use roadguard_core::{AccidentEvent, EventStatus};
use time::OffsetDateTime;

/// Precondition an event must satisfy for a mutation to apply.
///
/// Fields left at their default do not constrain the match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPredicate {
    /// Current status must be one of these.
    pub status_in: Option<Vec<EventStatus>>,
    /// Current `acknowledged` flag must equal this.
    pub acknowledged: Option<bool>,
    /// `contactsNotifiedAt` must still be unset.
    pub not_yet_notified: bool,
    /// `contactsNotifiedAt` must be set and at or before this instant.
    pub notified_at_or_before: Option<OffsetDateTime>,
    /// `escalatedAt` must still be unset.
    pub not_yet_escalated: bool,
    /// Stored version must equal this (optimistic concurrency token).
    pub expected_version: Option<u64>,
}

impl EventPredicate {
    /// Predicate matching every event.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn status_in(mut self, statuses: &[EventStatus]) -> Self {
        self.status_in = Some(statuses.to_vec());
        self
    }

    pub fn acknowledged(mut self, acknowledged: bool) -> Self {
        self.acknowledged = Some(acknowledged);
        self
    }

    pub fn not_yet_notified(mut self) -> Self {
        self.not_yet_notified = true;
        self
    }

    pub fn notified_at_or_before(mut self, cutoff: OffsetDateTime) -> Self {
        self.notified_at_or_before = Some(cutoff);
        self
    }

    pub fn not_yet_escalated(mut self) -> Self {
        self.not_yet_escalated = true;
        self
    }

    pub fn expected_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// The escalation condition: notified, unacknowledged, notified at or
    /// before `cutoff`, and not escalated yet.
    pub fn escalation_due(cutoff: OffsetDateTime) -> Self {
        Self::any()
            .status_in(&[EventStatus::Notified])
            .acknowledged(false)
            .notified_at_or_before(cutoff)
            .not_yet_escalated()
    }

    /// Evaluate the predicate against a stored event.
    pub fn matches(&self, event: &AccidentEvent) -> bool {
        if let Some(statuses) = &self.status_in
            && !statuses.contains(&event.status)
        {
            return false;
        }
        if let Some(acknowledged) = self.acknowledged
            && event.acknowledged != acknowledged
        {
            return false;
        }
        if self.not_yet_notified && event.contacts_notified_at.is_some() {
            return false;
        }
        if let Some(cutoff) = self.notified_at_or_before {
            match event.contacts_notified_at {
                Some(at) if at <= cutoff => {}
                _ => return false,
            }
        }
        if self.not_yet_escalated && event.escalated_at.is_some() {
            return false;
        }
        if let Some(version) = self.expected_version
            && event.version != version
        {
            return false;
        }
        true
    }
}

/// Field assignments applied when a predicate holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventMutation {
    pub status: Option<EventStatus>,
    pub acknowledged: Option<bool>,
    pub contacts_notified_at: Option<OffsetDateTime>,
    pub escalated_at: Option<OffsetDateTime>,
}

impl EventMutation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: EventStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn acknowledged(mut self, acknowledged: bool) -> Self {
        self.acknowledged = Some(acknowledged);
        self
    }

    pub fn contacts_notified_at(mut self, at: OffsetDateTime) -> Self {
        self.contacts_notified_at = Some(at);
        self
    }

    pub fn escalated_at(mut self, at: OffsetDateTime) -> Self {
        self.escalated_at = Some(at);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.acknowledged.is_none()
            && self.contacts_notified_at.is_none()
            && self.escalated_at.is_none()
    }

    /// Apply the assignments and bump the event version.
    pub fn apply(&self, event: &mut AccidentEvent) {
        if let Some(status) = self.status {
            event.status = status;
        }
        if let Some(acknowledged) = self.acknowledged {
            event.acknowledged = acknowledged;
        }
        if let Some(at) = self.contacts_notified_at {
            event.contacts_notified_at = Some(at);
        }
        if let Some(at) = self.escalated_at {
            event.escalated_at = Some(at);
        }
        event.version += 1;
    }
}

/// Result of a conditional update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Predicate held; carries the event after the mutation.
    Applied(AccidentEvent),
    /// Predicate did not hold; carries the event as currently stored.
    Rejected(AccidentEvent),
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Applied(_))
    }

    pub fn event(&self) -> &AccidentEvent {
        match self {
            UpdateOutcome::Applied(event) | UpdateOutcome::Rejected(event) => event,
        }
    }

    pub fn into_event(self) -> AccidentEvent {
        match self {
            UpdateOutcome::Applied(event) | UpdateOutcome::Rejected(event) => event,
        }
    }
}
