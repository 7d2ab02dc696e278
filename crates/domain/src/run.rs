//! Run lifecycle records and the memory artifacts distilled from them
//! (spec §3 "Run Record", "Observation", "Reflection").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Created,
    Running,
    Paused,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }

    /// Whether `self -> next` is a legal transition per the state table in
    /// spec §4.2. Terminal states accept no further transitions.
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Created, Running)
                | (Created, Failed)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Paused, Running)
                | (Paused, Failed)
        )
    }
}

/// Configuration supplied to `createRun` (spec §4.2, §6 `POST /v1/runs`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
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

/// Token usage counters tracked per run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

/// In-memory run record (spec §3). Rebuildable from the ledger; may be
/// evicted once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub session_id: String,
    pub state: RunState,
    pub created_at: i64,
    pub updated_at: i64,
    pub model: String,
    pub workspace: String,
    pub prompt: String,
    pub skills: Vec<String>,
    pub current_step: u32,
    pub token_usage: TokenUsage,
    #[serde(default)]
    pub max_steps: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationType {
    Fact,
    Action,
    Outcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    pub ts: i64,
    #[serde(rename = "type")]
    pub kind: ObservationType,
    pub content: String,
    pub source_event_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reflection {
    pub id: String,
    pub ts: i64,
    pub topic: String,
    pub content: String,
    /// 1..=10.
    pub frequency: u8,
}

/// The `session`-typed snapshot's `data` payload (spec §4.7, §4.9):
/// everything the Context Assembler and Memory Service read back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshotData {
    #[serde(default)]
    pub observations: Vec<Observation>,
    #[serde(default)]
    pub reflections: Vec<Reflection>,
    #[serde(default)]
    pub last_observed_seq: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions() {
        assert!(RunState::Created.can_transition_to(RunState::Running));
        assert!(RunState::Running.can_transition_to(RunState::Paused));
        assert!(RunState::Paused.can_transition_to(RunState::Running));
        assert!(RunState::Running.can_transition_to(RunState::Completed));
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for next in [
            RunState::Created,
            RunState::Running,
            RunState::Paused,
            RunState::Completed,
            RunState::Failed,
        ] {
            assert!(!RunState::Completed.can_transition_to(next));
            assert!(!RunState::Failed.can_transition_to(next));
        }
    }

    #[test]
    fn created_cannot_go_directly_to_completed() {
        assert!(!RunState::Created.can_transition_to(RunState::Completed));
    }

    #[test]
    fn paused_cannot_go_directly_to_completed() {
        assert!(!RunState::Paused.can_transition_to(RunState::Completed));
    }
}
