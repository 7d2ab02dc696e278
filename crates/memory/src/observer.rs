//! Observer: distills a batch of raw ledger events into short-lived
//! [`Observation`]s via a single structured-output tool call.

use sa_domain::capability::ModelRole;
use sa_domain::event::Event;
use sa_domain::run::{Observation, ObservationType};
use sa_domain::tool::{Message, MessageContent, Role, ToolDefinition};
use sa_providers::router::LlmRouter;
use sa_providers::traits::ChatRequest;
use uuid::Uuid;

const TOOL_NAME: &str = "record_observations";

const SYSTEM_PROMPT: &str = "\
You distill a batch of agent-run events into short, durable observations. \
Call the record_observations tool exactly once with a concise list. Each \
observation is a single fact, action, or outcome worth remembering beyond \
this run. Do not narrate every event; compress. If nothing is worth \
recording, call the tool with an empty list.";

/// Calls the LLM once to produce observations for `events`. On any failure
/// (provider error, no tool call, malformed arguments) returns an empty list.
pub async fn observe(router: &LlmRouter, events: &[Event]) -> Vec<Observation> {
    if events.is_empty() {
        return Vec::new();
    }

    let req = ChatRequest {
        messages: vec![
            Message {
                role: Role::System,
                content: MessageContent::Text(SYSTEM_PROMPT.to_string()),
            },
            Message {
                role: Role::User,
                content: MessageContent::Text(render_events(events)),
            },
        ],
        tools: vec![tool_definition()],
        ..Default::default()
    };

    let resp = match router.chat_for_role(ModelRole::Observer, req).await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::warn!(error = %e, "memory observer: LLM call failed");
            return Vec::new();
        }
    };

    let Some(call) = resp.tool_calls.first() else {
        tracing::warn!("memory observer: model returned no tool call");
        return Vec::new();
    };

    parse_observations(&call.arguments, events)
}

fn render_events(events: &[Event]) -> String {
    let mut out = String::from("Events (oldest first):\n");
    for e in events {
        let summary = serde_json::to_string(&e.payload).unwrap_or_default();
        out.push_str(&format!(
            "- event_id={} seq={} type={} payload={}\n",
            e.event_id,
            e.seq,
            e.type_str(),
            summary
        ));
    }
    out
}

fn tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: TOOL_NAME.to_string(),
        description: "Record a list of distilled observations from the given events.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "observations": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "type": { "type": "string", "enum": ["fact", "action", "outcome"] },
                            "content": { "type": "string" },
                            "source_event_ids": {
                                "type": "array",
                                "items": { "type": "string" }
                            }
                        },
                        "required": ["type", "content"]
                    }
                }
            },
            "required": ["observations"]
        }),
    }
}

fn parse_observations(args: &serde_json::Value, events: &[Event]) -> Vec<Observation> {
    let known_ids: std::collections::HashSet<&str> =
        events.iter().map(|e| e.event_id.as_str()).collect();

    let Some(items) = args.get("observations").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let kind = match item.get("type")?.as_str()? {
                "fact" => ObservationType::Fact,
                "action" => ObservationType::Action,
                "outcome" => ObservationType::Outcome,
                _ => return None,
            };
            let content = item.get("content")?.as_str()?.to_string();
            let source_event_ids = item
                .get("source_event_ids")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str())
                        .filter(|id| known_ids.contains(id))
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();

            Some(Observation {
                id: Uuid::new_v4().to_string(),
                ts: chrono::Utc::now().timestamp_millis(),
                kind,
                content,
                source_event_ids,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_id: &str) -> Event {
        Event {
            event_id: event_id.to_string(),
            run_id: "r1".into(),
            session_id: "s1".into(),
            seq: 1,
            ts: 0,
            payload: sa_domain::event::EventPayload::OutputDelta {
                text: "hi".into(),
            },
        }
    }

    #[test]
    fn parse_observations_filters_unknown_source_ids() {
        let events = vec![event("e1")];
        let args = serde_json::json!({
            "observations": [
                {"type": "fact", "content": "user likes rust", "source_event_ids": ["e1", "unknown"]}
            ]
        });
        let obs = parse_observations(&args, &events);
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].source_event_ids, vec!["e1".to_string()]);
    }

    #[test]
    fn parse_observations_empty_list() {
        let args = serde_json::json!({"observations": []});
        assert!(parse_observations(&args, &[]).is_empty());
    }

    #[test]
    fn parse_observations_missing_field_returns_empty() {
        let args = serde_json::json!({});
        assert!(parse_observations(&args, &[]).is_empty());
    }

    #[test]
    fn parse_observations_skips_invalid_type() {
        let args = serde_json::json!({
            "observations": [{"type": "bogus", "content": "x"}]
        });
        assert!(parse_observations(&args, &[]).is_empty());
    }
}
