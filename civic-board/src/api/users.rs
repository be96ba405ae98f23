//! User profile endpoints

use axum::{extract::rejection::JsonRejection, extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::error::Result;
use crate::identity::Principal;
use crate::users::{ProfileInput, User};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: User,
}

/// GET /api/user/profile
///
/// The profile is provisioned on first use by the [`Principal`] extractor.
pub async fn get_profile(State(state): State<AppState>, principal: Principal) -> Result<Json<ProfileResponse>> {
    let user = state.users.get_or_provision(&principal.identity).await;
    Ok(Json(ProfileResponse { user }))
}

/// POST /api/user/profile
///
/// **Request:** `{"name": "...", "email": "..."}`
///
/// **Errors:** 400 when the name is shorter than two characters or the
/// email has no `@`.
pub async fn update_profile(
    State(state): State<AppState>,
    principal: Principal,
    payload: std::result::Result<Json<ProfileInput>, JsonRejection>,
) -> Result<Json<ProfileResponse>> {
    let Json(input) = payload?;
    let user = state.users.upsert_profile(&principal.identity, input).await?;
    Ok(Json(ProfileResponse { user }))
}

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/api/user/profile", get(get_profile).post(update_profile))
}
