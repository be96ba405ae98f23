//! Poll/verification endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identity::{AdminPrincipal, Principal};
use crate::polls::{PollResponse, PollResults};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoteRequest {
    #[serde(default)]
    pub choice: String,
}

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub poll_response: PollResponse,
    /// Only populated for admins
    pub results: Option<PollResults>,
}

/// POST /api/incidents/:id/poll
///
/// **Request:** `{"choice": "confirm" | "deny" | "unsure"}`
///
/// **Errors:**
/// - 404 unknown incident
/// - 409 caller already responded
/// - 400 invalid choice
///
/// After a vote is recorded the incident is escalated to `crowd_confirmed`
/// when the confirm count reaches the crowd threshold.
pub async fn submit_vote(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    payload: std::result::Result<Json<VoteRequest>, JsonRejection>,
) -> Result<Json<VoteResponse>> {
    let Json(request) = payload?;

    let hold = state.incidents.hold(&id).await?;
    let poll_response = state
        .polls
        .submit_vote(&id, &principal.user_id, &request.choice)
        .await?;
    drop(hold);

    let results = state.polls.get_results(&id).await;
    state.incidents.apply_poll_results(&id, &results).await;

    Ok(Json(VoteResponse {
        poll_response,
        results: principal.is_admin().then_some(results),
    }))
}

/// GET /api/incidents/:id/poll-results (admin)
pub async fn poll_results(
    State(state): State<AppState>,
    AdminPrincipal(_admin): AdminPrincipal,
    Path(id): Path<String>,
) -> Result<Json<PollResults>> {
    if !state.incidents.contains(&id).await {
        return Err(Error::incident_not_found(&id));
    }
    Ok(Json(state.polls.get_results(&id).await))
}

pub fn poll_routes() -> Router<AppState> {
    Router::new()
        .route("/api/incidents/:id/poll", post(submit_vote))
        .route("/api/incidents/:id/poll-results", get(poll_results))
}
