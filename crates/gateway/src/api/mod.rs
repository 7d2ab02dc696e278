//! The HTTP surface (spec §6). Every route here is a thin adapter over
//! the kernel's typed API — framing only, no business logic.

pub mod approvals;
pub mod error;
pub mod health;
pub mod runs;
pub mod sessions;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/health", get(health::health))
        .route("/v1/runs", post(runs::create_run))
        .route("/v1/runs/:run_id/events", get(runs::run_events))
        .route("/v1/approvals/:approval_id", post(approvals::resolve))
        .route("/v1/sessions/list", get(sessions::list))
        .route("/v1/sessions/:session_id/state", get(sessions::get_state))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
