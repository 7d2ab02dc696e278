//! `GET /v1/health` (spec §6) — ambient operability the teacher always
//! ships alongside a server binary (SPEC_FULL "Ambient HTTP surface").

use axum::response::{IntoResponse, Json};

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "ts": chrono::Utc::now().timestamp_millis(),
    }))
}
