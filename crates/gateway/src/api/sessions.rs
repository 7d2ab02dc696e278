//! `GET /v1/sessions/list` and `GET /v1/sessions/:sessionId/state` (spec §6).

use std::collections::HashSet;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};

use sa_domain::event::{EventPayload, SnapshotKind};
use sa_ledger::{EventQuery, Order, SnapshotQuery};

use crate::api::error::ApiError;
use crate::state::AppState;

/// Session ids ordered most-recent first (spec §4.1 `listSessionIds`).
pub async fn list(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let ids = state.ledger.list_session_ids()?;
    Ok(Json(ids))
}

pub async fn get_state(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.ledger.get_latest_snapshot(&SnapshotQuery {
        session_id: session_id.clone(),
        run_id: None,
        kind: Some(SnapshotKind::Session),
    })?;

    let after_seq = snapshot.as_ref().map(|s| s.seq).unwrap_or(0);
    let pending_events = state.ledger.query(&EventQuery {
        session_id: Some(session_id.clone()),
        after_seq: Some(after_seq),
        order: Order::Asc,
        ..Default::default()
    })?;

    // `PendingApproval` carries no session/run reference (spec §3) — join
    // through the `tool.call` events on this session's runs to find which
    // of the gate's pending calls belong here.
    let call_ids_on_session: HashSet<String> = state
        .ledger
        .query(&EventQuery {
            session_id: Some(session_id.clone()),
            types: Some(vec!["tool.call".to_string()]),
            order: Order::Asc,
            ..Default::default()
        })?
        .into_iter()
        .filter_map(|e| match e.payload {
            EventPayload::ToolCall { call_id, .. } => Some(call_id),
            _ => None,
        })
        .collect();

    let pending_approvals: Vec<_> = state
        .approvals
        .get_pending()
        .into_iter()
        .filter(|p| call_ids_on_session.contains(&p.call_id))
        .collect();

    Ok(Json(serde_json::json!({
        "sessionId": session_id,
        "snapshot": snapshot,
        "pendingEvents": pending_events,
        "pendingApprovals": pending_approvals,
        "ts": chrono::Utc::now().timestamp_millis(),
    })))
}
