//! `POST /v1/runs` and `GET /v1/runs/:runId/events` (spec §6).

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use sa_domain::run::RunConfig;

use crate::api::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRunBody {
    pub session_id: String,
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub max_steps: Option<u32>,
}

pub async fn create_run(
    State(state): State<AppState>,
    Json(body): Json<CreateRunBody>,
) -> Result<impl IntoResponse, ApiError> {
    let config = RunConfig {
        session_id: body.session_id,
        prompt: body.prompt,
        model: body.model,
        workspace: body.workspace,
        skills: body.skills,
        max_steps: body.max_steps,
    };

    let record = crate::runtime::launch(&state, config)?;

    Ok(Json(serde_json::json!({
        "runId": record.run_id,
        "sessionId": record.session_id,
        "state": record.state,
        "startedAt": record.created_at,
    })))
}

pub async fn run_events(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    headers: HeaderMap,
) -> Result<Sse<impl futures_util::Stream<Item = Result<SseEvent, std::convert::Infallible>>>, ApiError>
{
    let last_event_id = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let cancel = CancellationToken::new();
    let mut rx = sa_kernel::fanout::subscribe(
        state.ledger.clone(),
        state.run_manager.event_bus(),
        sa_kernel::fanout::FanoutRequest {
            run_id,
            after_seq: None,
            last_event_id,
            cancel: cancel.clone(),
        },
    )?;

    let stream = async_stream::stream! {
        let _cancel_guard = cancel.drop_guard();
        while let Some(event) = rx.recv().await {
            let data = serde_json::to_string(&event.payload).unwrap_or_default();
            yield Ok(SseEvent::default()
                .id(event.event_id.clone())
                .event(event.type_str())
                .data(data));
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
