use std::path::PathBuf;
use std::sync::Arc;

use futures_util::StreamExt;

use sa_domain::engine::EngineRunRequest;
use sa_domain::error::{Error, Result};
use sa_domain::event::EventPayload;
use sa_domain::stream::StreamEvent;
use sa_domain::tool::{ApprovalDecision, ContentPart, ControlPath, Message, MessageContent, Role};
use sa_kernel::approval_gate::{ApprovalGate, NewApprovalRequest};
use sa_kernel::registry::ToolKernel;
use sa_kernel::run_manager::RunManager;
use sa_providers::registry::ProviderRegistry;
use sa_providers::router::resolve_model;
use sa_providers::traits::ChatRequest;

/// Driven tool-call loop depth when `runConfig.maxSteps` is unset.
const DEFAULT_MAX_STEPS: u32 = 25;

/// Totals the run driver folds into `completeRun`'s token usage.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineRunOutcome {
    pub steps: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Converts an [`EngineRunRequest`] into the canonical event sequence
/// (spec §4.6). Holds no state of its own beyond its collaborators; every
/// call is scoped to a single `run_id`.
pub struct EngineAdapter {
    run_manager: Arc<RunManager>,
    approvals: Arc<ApprovalGate>,
    tools: Arc<ToolKernel>,
    providers: Arc<ProviderRegistry>,
}

impl EngineAdapter {
    pub fn new(
        run_manager: Arc<RunManager>,
        approvals: Arc<ApprovalGate>,
        tools: Arc<ToolKernel>,
        providers: Arc<ProviderRegistry>,
    ) -> Self {
        Self {
            run_manager,
            approvals,
            tools,
            providers,
        }
    }

    /// Drives `req` to completion, emitting every event the run produces.
    ///
    /// Returns the accumulated step count and token usage on success.
    /// Errors propagate to the caller (the run driver), which is
    /// responsible for calling `failRun` (spec §7 "propagation policy").
    pub async fn run(&self, run_id: &str, req: EngineRunRequest) -> Result<EngineRunOutcome> {
        let model = req.run_config.model.clone().unwrap_or_default();
        let (provider_id, model_name) = resolve_model(&model);
        let provider = self.providers.get(provider_id).ok_or_else(|| {
            Error::ProviderError(format!("unknown provider for model '{model}'"))
        })?;

        let max_steps = req.run_config.max_steps.unwrap_or(DEFAULT_MAX_STEPS);
        let session_id = req.run_config.session_id.clone();
        let workspace_root = PathBuf::from(req.run_config.workspace.clone().unwrap_or_default());

        self.run_manager.emit(
            run_id,
            EventPayload::EngineRequest {
                model: model.clone(),
                input_tokens: 0,
                step_number: 0,
            },
        )?;

        let mut messages = req.messages.clone();
        let mut step_number: u32 = 0;
        let mut total_input_tokens: u64 = 0;
        let mut total_output_tokens: u64 = 0;

        loop {
            if step_number >= max_steps {
                break;
            }

            let chat_req = ChatRequest {
                messages: messages.clone(),
                tools: req.tools.clone(),
                model: Some(model_name.to_string()),
                ..Default::default()
            };

            let mut stream = provider
                .chat_stream(&chat_req)
                .await
                .map_err(|e| Error::ProviderError(e.to_string()))?;

            let mut buffer = String::new();
            let mut had_tool_call = false;
            let mut finish_reason: Option<String> = None;
            let mut step_output_tokens: u64 = 0;

            while let Some(chunk) = stream.next().await {
                match chunk.map_err(|e| Error::ProviderError(e.to_string()))? {
                    StreamEvent::Token { text } => {
                        buffer.push_str(&text);
                        self.run_manager
                            .emit(run_id, EventPayload::OutputDelta { text })?;
                    }
                    StreamEvent::ToolCallStarted { .. } | StreamEvent::ToolCallDelta { .. } => {
                        // Only the fully-assembled call carries the canonical
                        // event (spec §4.6 step 3: "tool-call -> tool.call").
                    }
                    StreamEvent::ToolCallFinished {
                        call_id,
                        tool_name,
                        arguments,
                    } => {
                        had_tool_call = true;
                        self.run_manager.emit(
                            run_id,
                            EventPayload::ToolCall {
                                call_id: call_id.clone(),
                                tool_id: tool_name.clone(),
                                args: arguments.clone(),
                            },
                        )?;
                        messages.push(Message {
                            role: Role::Assistant,
                            content: MessageContent::Parts(vec![ContentPart::ToolUse {
                                id: call_id.clone(),
                                name: tool_name.clone(),
                                input: arguments.clone(),
                            }]),
                        });

                        let (result, approved) = self
                            .execute_tool_call(
                                run_id,
                                &session_id,
                                &workspace_root,
                                &call_id,
                                &tool_name,
                                arguments,
                            )
                            .await?;

                        self.run_manager.emit(
                            run_id,
                            EventPayload::ToolResult {
                                call_id: call_id.clone(),
                                tool_id: tool_name,
                                result: result.clone(),
                                duration_ms: 0,
                                approved,
                            },
                        )?;
                        messages.push(Message::tool_result(call_id, stringify(&result)));
                    }
                    StreamEvent::Done {
                        usage,
                        finish_reason: fr,
                    } => {
                        finish_reason = fr;
                        if let Some(u) = usage {
                            step_output_tokens = u.completion_tokens as u64;
                            total_input_tokens += u.prompt_tokens as u64;
                        }
                    }
                    StreamEvent::Error { message } => return Err(Error::ProviderError(message)),
                }
            }

            // spec §9: never emit an empty `output.message` on an empty
            // final step -- only flush when the buffer is non-empty.
            if !buffer.is_empty() {
                self.run_manager.emit(
                    run_id,
                    EventPayload::OutputMessage {
                        role: "assistant".into(),
                        content: buffer.clone(),
                    },
                )?;
                messages.push(Message::assistant(buffer));
            }

            total_output_tokens += step_output_tokens;
            self.run_manager.emit(
                run_id,
                EventPayload::EngineResponse {
                    output_tokens: step_output_tokens,
                    finish_reason,
                    step_number,
                },
            )?;
            step_number += 1;

            if !had_tool_call {
                break;
            }
        }

        Ok(EngineRunOutcome {
            steps: step_number,
            input_tokens: total_input_tokens,
            output_tokens: total_output_tokens,
        })
    }

    /// Resolves the control path and either executes the tool directly or
    /// suspends the run on the Approval Gate (spec §4.6 "approval
    /// coupling"). Returns `(result, approved)`.
    async fn execute_tool_call(
        &self,
        run_id: &str,
        session_id: &str,
        workspace_root: &std::path::Path,
        call_id: &str,
        tool_id: &str,
        args: serde_json::Value,
    ) -> Result<(serde_json::Value, bool)> {
        let control_path = self.tools.get_control_path(tool_id, &args)?;

        match control_path {
            ControlPath::Deny => Ok((
                serde_json::json!({"decision": "deny", "reason": "denied by policy"}),
                false,
            )),
            ControlPath::Auto => {
                let result = self
                    .tools
                    .execute(tool_id, args, run_id, session_id, workspace_root.to_path_buf())
                    .await?;
                Ok((result, true))
            }
            ControlPath::Approval | ControlPath::Preview => {
                let risk = self.tools.assess_risk(tool_id, &args)?;
                let (approval_id, future) = self.approvals.request_approval(NewApprovalRequest {
                    call_id: call_id.to_string(),
                    tool_id: tool_id.to_string(),
                    args: args.clone(),
                    preview: None,
                    risk: risk.clone(),
                });

                self.run_manager.emit(
                    run_id,
                    EventPayload::ApprovalRequested {
                        approval_id: approval_id.clone(),
                        call_id: call_id.to_string(),
                        tool_id: tool_id.to_string(),
                        args: args.clone(),
                        preview: None,
                        risk,
                    },
                )?;
                self.run_manager.pause_run(run_id, &approval_id)?;

                let outcome = future.await.map_err(|_| Error::ApprovalCancelled)??;

                self.run_manager.emit(
                    run_id,
                    EventPayload::ApprovalResolved {
                        approval_id,
                        decision: outcome.decision,
                        reason: outcome.reason.clone(),
                        resolved_by: outcome.resolved_by.clone(),
                    },
                )?;

                // Run (or deny) the tool call while the run is still paused,
                // then resume last (spec §4.6 "approval coupling").
                let outcome_result = match outcome.decision {
                    ApprovalDecision::Approve => {
                        let result = self
                            .tools
                            .execute(tool_id, args, run_id, session_id, workspace_root.to_path_buf())
                            .await?;
                        (result, true)
                    }
                    ApprovalDecision::Deny => (
                        serde_json::json!({"decision": "deny", "reason": outcome.reason}),
                        false,
                    ),
                };

                self.run_manager.resume_run(run_id)?;

                Ok(outcome_result)
            }
        }
    }
}

fn stringify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
