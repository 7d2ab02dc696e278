//! The canonical event envelope and the closed set of event payloads that
//! make up the append-only ledger (spec §3, §4.1).
//!
//! Every event is immutable once appended. `seq` is the only ordering
//! authority — `ts` is wall-clock and must never be used to order events.

use serde::{Deserialize, Serialize};

/// An immutable, appended-once record in the event ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub run_id: String,
    pub session_id: String,
    /// Monotonically increasing, dense, 1-based, per `run_id`.
    pub seq: i64,
    /// Wall-clock milliseconds at append time. Not an ordering key.
    pub ts: i64,
    pub payload: EventPayload,
}

impl Event {
    /// The closed-enumeration type string for this event (e.g. `"run.started"`).
    pub fn type_str(&self) -> &'static str {
        self.payload.type_str()
    }
}

/// The closed set of event payloads (spec §3 "Event types").
///
/// Tagged with `type`/`payload` so storage can keep `type` as its own
/// indexed column while the payload round-trips through a self-describing
/// encoding (JSON) without loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EventPayload {
    #[serde(rename = "run.started")]
    RunStarted {
        model: String,
        workspace: String,
        #[serde(skip_serializing_if = "Vec::is_empty", default)]
        skills: Vec<String>,
    },
    #[serde(rename = "run.completed")]
    RunCompleted {
        steps: u32,
        input_tokens: u64,
        output_tokens: u64,
    },
    #[serde(rename = "run.failed")]
    RunFailed {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    #[serde(rename = "run.paused")]
    RunPaused {
        reason: String,
        approval_id: String,
    },
    #[serde(rename = "run.resumed")]
    RunResumed {},

    #[serde(rename = "output.delta")]
    OutputDelta { text: String },
    #[serde(rename = "output.message")]
    OutputMessage { role: String, content: String },

    #[serde(rename = "tool.call")]
    ToolCall {
        call_id: String,
        tool_id: String,
        args: serde_json::Value,
    },
    #[serde(rename = "tool.result")]
    ToolResult {
        call_id: String,
        tool_id: String,
        result: serde_json::Value,
        duration_ms: u64,
        approved: bool,
    },

    #[serde(rename = "approval.requested")]
    ApprovalRequested {
        approval_id: String,
        call_id: String,
        tool_id: String,
        args: serde_json::Value,
        preview: Option<String>,
        risk: crate::tool::RiskProfile,
    },
    #[serde(rename = "approval.resolved")]
    ApprovalResolved {
        approval_id: String,
        decision: crate::tool::ApprovalDecision,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        resolved_by: Option<String>,
    },

    #[serde(rename = "artifact.emitted")]
    ArtifactEmitted {
        artifact_id: String,
        kind: String,
        data: serde_json::Value,
    },
    #[serde(rename = "checkpoint.created")]
    CheckpointCreated {
        checkpoint_id: String,
        label: Option<String>,
    },
    #[serde(rename = "state.snapshot")]
    StateSnapshot { data: serde_json::Value },

    #[serde(rename = "engine.request")]
    EngineRequest {
        model: String,
        input_tokens: u64,
        step_number: u32,
    },
    #[serde(rename = "engine.response")]
    EngineResponse {
        output_tokens: u64,
        finish_reason: Option<String>,
        step_number: u32,
    },

    #[serde(rename = "working_memory.snapshot")]
    WorkingMemorySnapshot { data: serde_json::Value },
    #[serde(rename = "memory.observed")]
    MemoryObserved {
        observations: Vec<crate::run::Observation>,
        processed_seq_range: SeqRange,
    },
    #[serde(rename = "memory.reflected")]
    MemoryReflected {
        reflections: Vec<crate::run::Reflection>,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SeqRange {
    pub start: i64,
    pub end: i64,
}

impl EventPayload {
    pub fn type_str(&self) -> &'static str {
        match self {
            EventPayload::RunStarted { .. } => "run.started",
            EventPayload::RunCompleted { .. } => "run.completed",
            EventPayload::RunFailed { .. } => "run.failed",
            EventPayload::RunPaused { .. } => "run.paused",
            EventPayload::RunResumed { .. } => "run.resumed",
            EventPayload::OutputDelta { .. } => "output.delta",
            EventPayload::OutputMessage { .. } => "output.message",
            EventPayload::ToolCall { .. } => "tool.call",
            EventPayload::ToolResult { .. } => "tool.result",
            EventPayload::ApprovalRequested { .. } => "approval.requested",
            EventPayload::ApprovalResolved { .. } => "approval.resolved",
            EventPayload::ArtifactEmitted { .. } => "artifact.emitted",
            EventPayload::CheckpointCreated { .. } => "checkpoint.created",
            EventPayload::StateSnapshot { .. } => "state.snapshot",
            EventPayload::EngineRequest { .. } => "engine.request",
            EventPayload::EngineResponse { .. } => "engine.response",
            EventPayload::WorkingMemorySnapshot { .. } => "working_memory.snapshot",
            EventPayload::MemoryObserved { .. } => "memory.observed",
            EventPayload::MemoryReflected { .. } => "memory.reflected",
        }
    }

    /// `true` for `run.completed` / `run.failed` — the only events that may
    /// terminate a run's event stream (spec §5 ordering guarantees).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventPayload::RunCompleted { .. } | EventPayload::RunFailed { .. }
        )
    }
}

/// A materialized, derived projection of a ledger prefix. Never authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_id: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub seq: i64,
    pub kind: SnapshotKind,
    pub data: serde_json::Value,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    Run,
    Session,
    Checkpoint,
}
