//! Incident endpoints
//!
//! Reporting and confirming require an authenticated principal; listing is
//! open to everyone but carries per-caller poll status when a known user is
//! signed in. Triage endpoints (status, notes, delete) are admin only.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use civic_common::time::parse_rfc3339;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::identity::{AdminPrincipal, OptionalPrincipal, Principal};
use crate::incidents::{present, present_at, CreateIncidentInput, IncidentView};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub incident: IncidentView,
    pub incident_id: String,
}

#[derive(Debug, Serialize)]
pub struct IncidentResponse {
    pub incident: IncidentView,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub since: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub server_time: DateTime<Utc>,
    pub polling_recommended_ms: u64,
    /// True when the caller asked only for changes after `since`
    pub changes_only: bool,
    pub incidents: Vec<IncidentView>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusUpdate {
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotesUpdate {
    #[serde(default)]
    pub internal_notes: String,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub success: bool,
    pub incident_id: String,
}

/// POST /api/incidents
///
/// **Response:** 201 `{"incident": {...}, "incident_id": "inc_..."}`
///
/// **Errors:** 400 when no location can be resolved
pub async fn create_incident(
    State(state): State<AppState>,
    principal: Principal,
    payload: std::result::Result<Json<CreateIncidentInput>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedResponse>)> {
    let Json(input) = payload?;
    let incident = state.incidents.create(input).await?;
    debug!(incident_id = %incident.id, user_id = %principal.user_id, "Report accepted");

    let incident_id = incident.id.clone();
    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            incident: present(&incident),
            incident_id,
        }),
    ))
}

/// GET /api/incidents?since=<RFC 3339>
///
/// Board order (priority, then newest). An unparsable `since` is ignored and
/// the full board is returned.
pub async fn list_incidents(
    State(state): State<AppState>,
    OptionalPrincipal(principal): OptionalPrincipal,
    query: std::result::Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<ListResponse>> {
    let Query(query) = query?;
    let since_raw = query.since.filter(|s| !s.trim().is_empty());
    let since = since_raw.as_deref().and_then(|raw| {
        let parsed = parse_rfc3339(raw);
        if parsed.is_none() {
            debug!(since = raw, "Ignoring unparsable since parameter");
        }
        parsed
    });

    let now = Utc::now();
    let incidents = state.incidents.list_all_at(since, now).await;

    let mut views = Vec::with_capacity(incidents.len());
    for incident in &incidents {
        let mut view = present_at(incident, now);
        match &principal {
            Some(p) => {
                let status = state.polls.status_for(&incident.id, &p.user_id, p.is_admin()).await;
                view = view.with_poll_status(status);
                if !p.is_admin() {
                    view = view.redact_internal();
                }
            }
            None => view = view.redact_internal(),
        }
        views.push(view);
    }

    Ok(Json(ListResponse {
        server_time: now,
        polling_recommended_ms: state.polling_recommended_ms,
        changes_only: since_raw.is_some(),
        incidents: views,
    }))
}

/// POST /api/incidents/:id/confirm
///
/// Legacy confirmation counter; three confirmations escalate an unverified
/// incident to `crowd_confirmed`.
pub async fn confirm_incident(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<IncidentResponse>> {
    let incident = state.incidents.confirm(&id).await?;
    let mut view = present(&incident);
    if !principal.is_admin() {
        view = view.redact_internal();
    }
    Ok(Json(IncidentResponse { incident: view }))
}

/// PATCH /api/incidents/:id/status (admin)
pub async fn update_status(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    Path(id): Path<String>,
    payload: std::result::Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<IncidentResponse>> {
    let Json(update) = payload?;
    let incident = state.incidents.update_status(&id, &update.status).await?;
    debug!(incident_id = %id, user_id = %admin.user_id, "Status changed by responder");
    Ok(Json(IncidentResponse {
        incident: present(&incident),
    }))
}

/// PATCH /api/incidents/:id/notes (admin)
pub async fn update_notes(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    Path(id): Path<String>,
    payload: std::result::Result<Json<NotesUpdate>, JsonRejection>,
) -> Result<Json<IncidentResponse>> {
    let Json(update) = payload?;
    let incident = state.incidents.update_notes(&id, &update.internal_notes).await?;
    debug!(incident_id = %id, user_id = %admin.user_id, "Notes changed by responder");
    Ok(Json(IncidentResponse {
        incident: present(&incident),
    }))
}

/// DELETE /api/incidents/:id (admin)
pub async fn delete_incident(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>> {
    let removed = state.incidents.delete(&id).await?;
    debug!(incident_id = %removed.id, user_id = %admin.user_id, "Incident removed by responder");
    Ok(Json(DeletedResponse {
        success: true,
        incident_id: removed.id,
    }))
}

pub fn incident_routes() -> Router<AppState> {
    Router::new()
        .route("/api/incidents", get(list_incidents).post(create_incident))
        .route("/api/incidents/:id", delete(delete_incident))
        .route("/api/incidents/:id/confirm", post(confirm_incident))
        .route("/api/incidents/:id/status", patch(update_status))
        .route("/api/incidents/:id/notes", patch(update_notes))
}
