//! Drives a single run from `POST /v1/runs` to its terminal event.
//!
//! The HTTP handler only creates and starts the run (spec §4.2 — those
//! two steps are synchronous so the caller can be told `SessionBusy`
//! immediately); everything after that — assembling the request, driving
//! the engine loop, and settling the run — happens on a detached task so
//! the handler can return as soon as `run.started` is durable.

use sa_contextpack::assembler::{AssembleRequest, SelectedSkill};
use sa_domain::engine::EngineMessage;
use sa_domain::error::Error;
use sa_domain::run::{RunConfig, RunRecord, SessionSnapshotData, TokenUsage};
use sa_domain::tool::{Message, ToolDefinition};
use sa_ledger::{EventQuery, Order, SnapshotQuery};

use crate::state::AppState;

/// `createRun` + `startRun` (spec §4.2), then hands the rest of the run
/// off to a background task. Returns the freshly started run record.
pub fn launch(state: &AppState, config: RunConfig) -> Result<RunRecord, Error> {
    let created = state.run_manager.create_run(config)?;
    state.run_manager.start_run(&created.run_id)?;
    let run_id = created.run_id.clone();
    // `start_run` mutates the record in place; re-read so the caller sees
    // `state: "running"`, not the `created.state` we captured above.
    let started = state
        .run_manager
        .get_run(&run_id)
        .expect("run just started must still be present");

    let spawned_state = state.clone();
    tokio::spawn(async move {
        drive(spawned_state, run_id).await;
    });

    Ok(started)
}

/// Assembles the engine request, runs the engine loop, and settles the
/// run into `completed`/`failed`. Never panics the caller — every error
/// path here ends in `fail_run`, per spec §7 "Engine Adapter errors
/// propagate out of run(req) and are caught by the run driver".
async fn drive(state: AppState, run_id: String) {
    let record = match state.run_manager.get_run(&run_id) {
        Some(r) => r,
        None => return,
    };
    let session_id = record.session_id.clone();

    match assemble(&state, &record).await {
        Ok(req) => match state.engine.run(&run_id, req).await {
            Ok(outcome) => {
                let usage = TokenUsage {
                    input: outcome.input_tokens,
                    output: outcome.output_tokens,
                };
                if let Err(e) = state
                    .run_manager
                    .complete_run(&run_id, &state.approvals, outcome.steps, usage)
                {
                    tracing::error!(run_id = %run_id, error = %e, "failed to mark run completed");
                }
            }
            Err(e) => fail(&state, &run_id, &e),
        },
        Err(e) => fail(&state, &run_id, &e),
    }

    let memory = state.memory.clone();
    let run_id_for_memory = run_id.clone();
    let session_id_for_memory = session_id.clone();
    tokio::spawn(async move {
        memory.process_run(&run_id_for_memory, &session_id_for_memory).await;
    });
}

fn fail(state: &AppState, run_id: &str, error: &Error) {
    tracing::warn!(run_id = %run_id, error = %error, "run failed");
    if let Err(e) = state
        .run_manager
        .fail_run(run_id, &state.approvals, error.to_string(), None)
    {
        tracing::error!(run_id = %run_id, error = %e, "failed to mark run failed");
    }
}

/// Builds the `EngineRunRequest` for `record`: prior session conversation
/// projected from the ledger, the new user prompt, the latest session
/// snapshot (for reflections/observations), the run's selected skills,
/// and every registered tool (spec §4.6 step "drive the provider's tool
/// loop", §4.7).
async fn assemble(
    state: &AppState,
    record: &RunRecord,
) -> Result<sa_domain::engine::EngineRunRequest, Error> {
    let prior_events = state.ledger.query(&EventQuery {
        session_id: Some(record.session_id.clone()),
        order: Order::Asc,
        ..Default::default()
    })?;
    let mut messages: Vec<Message> = sa_contextpack::project_messages(&prior_events)
        .into_iter()
        .map(engine_message_to_llm_message)
        .collect();
    messages.push(Message::user(record.prompt.clone()));

    let snapshot = state
        .ledger
        .get_latest_snapshot(&SnapshotQuery {
            session_id: record.session_id.clone(),
            run_id: None,
            kind: Some(sa_domain::event::SnapshotKind::Session),
        })?
        .map(|s| serde_json::from_value::<SessionSnapshotData>(s.data).unwrap_or_default());

    let skills: Vec<SelectedSkill> = state
        .skills
        .filter(Some(&record.skills))
        .into_iter()
        .map(|entry| SelectedSkill {
            name: entry.name,
            content: entry.content,
        })
        .collect();

    let tools: Vec<ToolDefinition> = state
        .tools
        .get_tools()
        .into_iter()
        .map(|handler| ToolDefinition {
            name: handler.id().to_string(),
            description: handler.description().to_string(),
            parameters: handler.input_schema(),
        })
        .collect();

    let workspace_root = if record.workspace.is_empty() {
        state.config.workspace.path.display().to_string()
    } else {
        record.workspace.clone()
    };

    let run_config = RunConfig {
        session_id: record.session_id.clone(),
        prompt: record.prompt.clone(),
        model: Some(record.model.clone()).filter(|m| !m.is_empty()),
        workspace: Some(workspace_root.clone()),
        skills: record.skills.clone(),
        max_steps: record.max_steps,
    };

    Ok(state.assembler.assemble(AssembleRequest {
        run_config,
        workspace_root,
        session_id: record.session_id.clone(),
        session_snapshot: snapshot,
        skills,
        messages,
        tools,
    }))
}

/// The projector yields provider-agnostic [`EngineMessage`]s; the engine
/// adapter consumes [`Message`]s. Tool-call/result messages keep their
/// role but lose the projector's bracketed-text convenience framing only
/// in the sense that they round-trip as plain text content — the engine
/// adapter does not replay tool calls, it only needs the transcript text.
fn engine_message_to_llm_message(m: EngineMessage) -> Message {
    match m.role.as_str() {
        "tool" => Message::tool_result(m.tool_call_id.unwrap_or_default(), m.content),
        "user" => Message::user(m.content),
        _ => Message::assistant(m.content),
    }
}
