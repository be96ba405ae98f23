//! civic-board library
//!
//! Crowd-sourced civic incident board: citizens report incidents, the crowd
//! corroborates them, responders triage them. Exposed as a library so the
//! HTTP surface can be driven from integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod geocode;
pub mod identity;
pub mod incidents;
pub mod persistence;
pub mod polls;
pub mod users;

pub use crate::error::{Error, Result};

use axum::Router;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::identity::IdentityProvider;
use crate::incidents::IncidentStore;
use crate::polls::PollLedger;
use crate::users::UserStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub incidents: Arc<IncidentStore>,
    pub polls: Arc<PollLedger>,
    pub users: Arc<UserStore>,
    /// Opaque token verification
    pub identity: Arc<dyn IdentityProvider>,
    /// Poll interval suggested to clients in list responses
    pub polling_recommended_ms: u64,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        incidents: Arc<IncidentStore>,
        polls: Arc<PollLedger>,
        users: Arc<UserStore>,
        identity: Arc<dyn IdentityProvider>,
        polling_recommended_ms: u64,
    ) -> Self {
        Self {
            incidents,
            polls,
            users,
            identity,
            polling_recommended_ms,
            startup_time: Utc::now(),
        }
    }
}

/// Build the API router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::user_routes())
        .merge(api::incident_routes())
        .merge(api::poll_routes())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// API router plus the single-page client served from `static_dir`.
///
/// Unknown non-API paths fall back to `index.html` so client-side routes work.
pub fn build_router_with_static(state: AppState, static_dir: &Path) -> Router {
    let spa = ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")));
    build_router(state).fallback_service(spa)
}
