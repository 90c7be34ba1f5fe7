use std::collections::HashMap;

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use roadguard_api::{ApiError, ApiResult, ok, ok_json};
use roadguard_core::{AccidentReport, ClientTimestamp, Contact, GeoLocation, now_utc};
use roadguard_notifications::{AlertMessage, NotificationMetadata};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::server::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub async fn root() -> impl IntoResponse {
    let body = json!({
        "service": "RoadGuard",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(body))
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// Ready once the event store answers a trivial query.
pub async fn readyz(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    state
        .controller
        .store()
        .list_recent(1)
        .await
        .map_err(|e| ApiError::unavailable(format!("event store not ready: {e}")))?;
    Ok((StatusCode::OK, Json(HealthResponse { status: "ready" })))
}

// ---- Reports and lifecycle ----

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationBody {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// Body of `POST /report-accident`.
///
/// Every field is optional at the parsing stage so a missing field is
/// reported as a validation error rather than a parser message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportAccidentRequest {
    pub user_id: Option<String>,
    pub location: Option<LocationBody>,
    pub severity_score: Option<f64>,
    /// Epoch milliseconds or RFC 3339; receipt time when absent
    pub timestamp: Option<ClientTimestamp>,
}

impl ReportAccidentRequest {
    pub fn into_report(self) -> Result<AccidentReport, ApiError> {
        let user_id = self
            .user_id
            .ok_or_else(|| ApiError::bad_request("userId is required"))?;
        let location = self
            .location
            .ok_or_else(|| ApiError::bad_request("location is required"))?;
        let (lat, lng) = match (location.lat, location.lng) {
            (Some(lat), Some(lng)) => (lat, lng),
            _ => return Err(ApiError::bad_request("location.lat and location.lng are required")),
        };
        let severity = self
            .severity_score
            .ok_or_else(|| ApiError::bad_request("severityScore is required"))?;
        let timestamp = match self.timestamp {
            Some(ts) => ts.resolve()?,
            None => now_utc(),
        };

        Ok(AccidentReport::new(
            user_id,
            GeoLocation::new(lat, lng)?,
            severity,
            timestamp,
        )?)
    }
}

pub async fn report_accident(
    State(state): State<AppState>,
    body: Result<Json<ReportAccidentRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = body?;
    let report = request.into_report()?;
    let event = state.controller.report(report).await?;
    Ok(ok_json(json!({ "eventId": event.id })))
}

pub async fn acknowledge_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.controller.acknowledge(&id).await?;
    Ok(ok())
}

pub async fn assign_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.controller.assign(&id).await?;
    Ok(ok())
}

pub async fn dispatch_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.controller.dispatch(&id).await?;
    Ok(ok())
}

// ---- Queries ----

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

pub async fn list_events(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(params) = params?;
    let feed = &state.config.feed;
    let limit = params.limit.unwrap_or(feed.default_limit);
    if limit == 0 || limit > feed.max_limit {
        return Err(ApiError::bad_request(format!(
            "limit must be between 1 and {}",
            feed.max_limit
        )));
    }

    let events = state.controller.recent(limit).await?;
    Ok(ok_json(json!({ "events": events })))
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let event = state.controller.get(&id).await?;
    Ok(ok_json(json!({ "event": event })))
}

pub async fn events_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let events = state.controller.by_user(&user_id).await?;
    Ok(ok_json(json!({ "events": events })))
}

// ---- Ad hoc notification ----

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyContactsRequest {
    pub contacts: Option<Vec<Contact>>,
    pub message: Option<String>,
    pub subject: Option<String>,
    pub event_id: Option<String>,
    #[serde(default)]
    pub data: HashMap<String, Value>,
}

/// Send a caller-supplied message to caller-supplied contacts.
///
/// Channel failures do not fail the request; they are listed in `report`.
pub async fn notify_contacts(
    State(state): State<AppState>,
    body: Result<Json<NotifyContactsRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = body?;
    let contacts = request
        .contacts
        .ok_or_else(|| ApiError::bad_request("contacts is required"))?;
    if contacts.is_empty() {
        return Err(ApiError::bad_request("contacts must not be empty"));
    }
    let body = request
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("message is required"))?;

    let mut message = AlertMessage::new(body);
    if let Some(subject) = request.subject {
        message = message.with_subject(subject);
    }
    let metadata = NotificationMetadata {
        event_id: request.event_id,
        data: request.data,
    };

    let report = state
        .dispatcher
        .notify_contacts(&contacts, &message, &metadata)
        .await;
    Ok(ok_json(json!({ "report": report })))
}
