//! `POST /v1/approvals/:approvalId` (spec §6, §4.3).
//!
//! Resolving here only completes the Approval Gate's future — the
//! Engine Adapter (already awaiting it) is the one that appends
//! `approval.resolved` and resumes the run (spec §4.6 "approval coupling").

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use sa_domain::tool::ApprovalDecision;

use crate::api::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ResolveApprovalBody {
    pub decision: ApprovalDecision,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub resolved_by: Option<String>,
}

pub async fn resolve(
    State(state): State<AppState>,
    Path(approval_id): Path<String>,
    Json(body): Json<ResolveApprovalBody>,
) -> Result<impl IntoResponse, ApiError> {
    state.approvals.resolve_approval(
        &approval_id,
        body.decision,
        body.reason,
        body.resolved_by,
    )?;

    Ok(Json(serde_json::json!({
        "status": "resolved",
        "approvalId": approval_id,
    })))
}
