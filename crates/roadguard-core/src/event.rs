//! Accident event model and lifecycle rules.
//!
//! An [`AccidentEvent`] is created in [`EventStatus::Reported`] and only moves
//! through the transitions listed in [`Transition`]. The policy is permissive:
//! operator actions may be repeated and `dispatch` does not require a prior
//! `assign`, but nothing leaves `escalated`, `dispatched` or `resolved`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

use crate::error::{CoreError, Result};

/// Lifecycle status of an accident event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// Report accepted, contacts not yet notified
    Reported,
    /// Initial notification finished (successfully or not)
    Notified,
    /// A hospital operator acknowledged the event
    Acknowledged,
    /// Responders were assigned
    Assigned,
    /// Responders were dispatched
    Dispatched,
    /// Nobody acknowledged the event before the deadline
    Escalated,
    /// Reserved for closing events; no current flow produces it
    Resolved,
}

impl EventStatus {
    pub const ALL: [EventStatus; 7] = [
        EventStatus::Reported,
        EventStatus::Notified,
        EventStatus::Acknowledged,
        EventStatus::Assigned,
        EventStatus::Dispatched,
        EventStatus::Escalated,
        EventStatus::Resolved,
    ];

    /// Returns the wire representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Reported => "reported",
            EventStatus::Notified => "notified",
            EventStatus::Acknowledged => "acknowledged",
            EventStatus::Assigned => "assigned",
            EventStatus::Dispatched => "dispatched",
            EventStatus::Escalated => "escalated",
            EventStatus::Resolved => "resolved",
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventStatus::Dispatched | EventStatus::Escalated | EventStatus::Resolved
        )
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        EventStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::validation(format!("Unknown event status '{s}'")))
    }
}

/// A state change applied to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Automatic, after the initial notification attempt completes
    MarkNotified,
    Acknowledge,
    Assign,
    Dispatch,
    /// Escalation scheduler only
    Escalate,
}

impl Transition {
    /// Statuses this transition may be applied from.
    pub fn allowed_from(&self) -> &'static [EventStatus] {
        use EventStatus::*;
        match self {
            Transition::MarkNotified => &[Reported],
            Transition::Acknowledge | Transition::Assign => {
                &[Reported, Notified, Acknowledged, Assigned]
            }
            Transition::Dispatch => &[Reported, Notified, Acknowledged, Assigned, Dispatched],
            Transition::Escalate => &[Notified],
        }
    }

    /// Status the event ends up in.
    pub fn target(&self) -> EventStatus {
        match self {
            Transition::MarkNotified => EventStatus::Notified,
            Transition::Acknowledge => EventStatus::Acknowledged,
            Transition::Assign => EventStatus::Assigned,
            Transition::Dispatch => EventStatus::Dispatched,
            Transition::Escalate => EventStatus::Escalated,
        }
    }

    pub fn is_allowed_from(&self, status: EventStatus) -> bool {
        self.allowed_from().contains(&status)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::MarkNotified => "mark notified",
            Transition::Acknowledge => "acknowledge",
            Transition::Assign => "assign",
            Transition::Dispatch => "dispatch",
            Transition::Escalate => "escalate",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Geographic position of an accident.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub lat: f64,
    pub lng: f64,
}

impl GeoLocation {
    /// Create a validated location.
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(CoreError::validation(format!(
                "location.lat must be within [-90, 90], got {lat}"
            )));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(CoreError::validation(format!(
                "location.lng must be within [-180, 180], got {lng}"
            )));
        }
        Ok(Self { lat, lng })
    }

    /// Link that opens the position on a map.
    pub fn map_link(&self) -> String {
        format!("https://maps.google.com/?q={},{}", self.lat, self.lng)
    }
}

impl fmt::Display for GeoLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5}, {:.5}", self.lat, self.lng)
    }
}

/// Validate a severity score.
pub fn validate_severity(severity: f64) -> Result<f64> {
    if severity.is_finite() && (0.0..=1.0).contains(&severity) {
        Ok(severity)
    } else {
        Err(CoreError::validation(format!(
            "severityScore must be within [0, 1], got {severity}"
        )))
    }
}

/// A validated accident report, ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AccidentReport {
    pub user_id: String,
    pub location: GeoLocation,
    pub severity: f64,
    pub timestamp: OffsetDateTime,
}

impl AccidentReport {
    pub fn new(
        user_id: impl Into<String>,
        location: GeoLocation,
        severity: f64,
        timestamp: OffsetDateTime,
    ) -> Result<Self> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(CoreError::validation("userId is required"));
        }
        let severity = validate_severity(severity)?;
        let location = GeoLocation::new(location.lat, location.lng)?;
        Ok(Self {
            user_id,
            location,
            severity,
            timestamp,
        })
    }
}

/// One reported accident and its lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccidentEvent {
    pub id: String,
    pub user_id: String,
    pub severity: f64,
    pub location: GeoLocation,
    /// Occurrence time as reported by the client
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Server receipt time
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub status: EventStatus,
    pub acknowledged: bool,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub contacts_notified_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub escalated_at: Option<OffsetDateTime>,
    /// Write counter, bumped on every committed update
    pub version: u64,
}

impl AccidentEvent {
    /// Build a fresh event in `reported` state from a validated report.
    pub fn from_report(id: impl Into<String>, report: AccidentReport, now: OffsetDateTime) -> Self {
        Self {
            id: id.into(),
            user_id: report.user_id,
            severity: report.severity,
            location: report.location,
            timestamp: report.timestamp,
            created_at: now,
            status: EventStatus::Reported,
            acknowledged: false,
            contacts_notified_at: None,
            escalated_at: None,
            version: 1,
        }
    }

    /// Whether the escalation scheduler should consider this event at `cutoff`.
    pub fn is_escalation_due(&self, cutoff: OffsetDateTime) -> bool {
        self.status == EventStatus::Notified
            && !self.acknowledged
            && self.escalated_at.is_none()
            && self.contacts_notified_at.is_some_and(|at| at <= cutoff)
    }

    /// Severity as a whole percentage, for messages.
    pub fn severity_percent(&self) -> u8 {
        (self.severity * 100.0).round().clamp(0.0, 100.0) as u8
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn report() -> AccidentReport {
        AccidentReport::new(
            "u1",
            GeoLocation { lat: 12.97, lng: 77.59 },
            0.8,
            datetime!(2026-01-01 10:00 UTC),
        )
        .unwrap()
    }

    #[test]
    fn test_severity_bounds() {
        assert!(validate_severity(0.0).is_ok());
        assert!(validate_severity(1.0).is_ok());
        assert!(validate_severity(-0.01).is_err());
        assert!(validate_severity(1.01).is_err());
        assert!(validate_severity(f64::NAN).is_err());
    }

    #[test]
    fn test_location_bounds() {
        assert!(GeoLocation::new(12.97, 77.59).is_ok());
        assert!(GeoLocation::new(91.0, 0.0).is_err());
        assert!(GeoLocation::new(0.0, -181.0).is_err());
        assert!(GeoLocation::new(f64::INFINITY, 0.0).is_err());
    }

    #[test]
    fn test_report_requires_user() {
        let err = AccidentReport::new(
            "  ",
            GeoLocation { lat: 0.0, lng: 0.0 },
            0.5,
            OffsetDateTime::now_utc(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("userId"));
    }

    #[test]
    fn test_new_event_starts_reported() {
        let event = AccidentEvent::from_report("e1", report(), datetime!(2026-01-01 10:00:05 UTC));
        assert_eq!(event.status, EventStatus::Reported);
        assert!(!event.acknowledged);
        assert!(event.contacts_notified_at.is_none());
        assert!(event.escalated_at.is_none());
        assert_eq!(event.version, 1);
        assert_eq!(event.severity_percent(), 80);
    }

    #[test]
    fn test_transition_table() {
        assert!(Transition::Assign.is_allowed_from(EventStatus::Assigned));
        assert!(Transition::Dispatch.is_allowed_from(EventStatus::Notified));
        assert!(Transition::Dispatch.is_allowed_from(EventStatus::Dispatched));
        assert!(!Transition::Acknowledge.is_allowed_from(EventStatus::Escalated));
        assert!(!Transition::Assign.is_allowed_from(EventStatus::Dispatched));
        assert!(!Transition::Escalate.is_allowed_from(EventStatus::Acknowledged));
        assert!(!Transition::MarkNotified.is_allowed_from(EventStatus::Notified));

        for status in EventStatus::ALL.into_iter().filter(EventStatus::is_terminal) {
            for transition in [Transition::Acknowledge, Transition::Assign, Transition::Escalate] {
                assert!(!transition.is_allowed_from(status), "{transition} from {status}");
            }
        }
    }

    #[test]
    fn test_escalation_due() {
        let now = datetime!(2026-01-01 10:10 UTC);
        let mut event = AccidentEvent::from_report("e1", report(), now);
        let cutoff = now - time::Duration::minutes(2);
        assert!(!event.is_escalation_due(cutoff));

        event.status = EventStatus::Notified;
        event.contacts_notified_at = Some(now - time::Duration::minutes(3));
        assert!(event.is_escalation_due(cutoff));

        event.acknowledged = true;
        assert!(!event.is_escalation_due(cutoff));
    }

    #[test]
    fn test_wire_format() {
        let event = AccidentEvent::from_report("e1", report(), datetime!(2026-01-01 10:00:05 UTC));
        let json = event.to_json().unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["status"], "reported");
        assert_eq!(json["location"]["lat"], 12.97);
        assert_eq!(json["timestamp"], "2026-01-01T10:00:00Z");
        assert!(json["contactsNotifiedAt"].is_null());
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("Notified".parse::<EventStatus>().unwrap(), EventStatus::Notified);
        assert!("closed".parse::<EventStatus>().is_err());
    }
}
