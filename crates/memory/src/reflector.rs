//! Reflector: distills accumulated [`Observation`]s into longer-lived
//! [`Reflection`]s via a single structured-output tool call.

use sa_domain::capability::ModelRole;
use sa_domain::run::{Observation, Reflection};
use sa_domain::tool::{Message, MessageContent, Role, ToolDefinition};
use sa_providers::router::LlmRouter;
use sa_providers::traits::ChatRequest;
use uuid::Uuid;

const TOOL_NAME: &str = "record_reflections";

const SYSTEM_PROMPT: &str = "\
You distill a set of accumulated observations into durable reflections: \
recurring themes, preferences, or patterns worth remembering long-term. \
Call the record_reflections tool exactly once. Each reflection has a short \
topic, a content summary, and a frequency from 1 to 10 rating how often \
this pattern recurs in the observations. If nothing rises to the level of \
a reflection, call the tool with an empty list.";

/// Calls the LLM once to produce reflections for `observations`. On any
/// failure returns an empty list.
pub async fn reflect(router: &LlmRouter, observations: &[Observation]) -> Vec<Reflection> {
    if observations.is_empty() {
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
                content: MessageContent::Text(render_observations(observations)),
            },
        ],
        tools: vec![tool_definition()],
        ..Default::default()
    };

    let resp = match router.chat_for_role(ModelRole::Reflector, req).await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::warn!(error = %e, "memory reflector: LLM call failed");
            return Vec::new();
        }
    };

    let Some(call) = resp.tool_calls.first() else {
        tracing::warn!("memory reflector: model returned no tool call");
        return Vec::new();
    };

    parse_reflections(&call.arguments)
}

fn render_observations(observations: &[Observation]) -> String {
    let mut out = String::from("Observations:\n");
    for o in observations {
        out.push_str(&format!("- [{:?}] {}\n", o.kind, o.content));
    }
    out
}

fn tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: TOOL_NAME.to_string(),
        description: "Record a list of distilled reflections from the given observations."
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "reflections": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "topic": { "type": "string" },
                            "content": { "type": "string" },
                            "frequency": { "type": "integer", "minimum": 1, "maximum": 10 }
                        },
                        "required": ["topic", "content", "frequency"]
                    }
                }
            },
            "required": ["reflections"]
        }),
    }
}

fn parse_reflections(args: &serde_json::Value) -> Vec<Reflection> {
    let Some(items) = args.get("reflections").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let topic = item.get("topic")?.as_str()?.to_string();
            let content = item.get("content")?.as_str()?.to_string();
            let frequency = item
                .get("frequency")
                .and_then(|v| v.as_u64())
                .unwrap_or(1)
                .clamp(1, 10) as u8;

            Some(Reflection {
                id: Uuid::new_v4().to_string(),
                ts: chrono::Utc::now().timestamp_millis(),
                topic,
                content,
                frequency,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reflections_clamps_frequency() {
        let args = serde_json::json!({
            "reflections": [{"topic": "t", "content": "c", "frequency": 99}]
        });
        let refs = parse_reflections(&args);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].frequency, 10);
    }

    #[test]
    fn parse_reflections_empty_list() {
        let args = serde_json::json!({"reflections": []});
        assert!(parse_reflections(&args).is_empty());
    }

    #[test]
    fn parse_reflections_missing_field_returns_empty() {
        assert!(parse_reflections(&serde_json::json!({})).is_empty());
    }
}
