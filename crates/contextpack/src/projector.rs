//! Folds a run's events into an ordered conversation (spec §4.7 "Projector").
//!
//! Pure function: `project_messages(events)` called twice on the same
//! slice yields identical output (spec §8 invariant 6).

use sa_domain::engine::EngineMessage;
use sa_domain::event::{Event, EventPayload};

pub fn project_messages(events: &[Event]) -> Vec<EngineMessage> {
    let mut out = Vec::new();
    let mut buffer = String::new();

    for event in events {
        match &event.payload {
            EventPayload::OutputDelta { text } => {
                buffer.push_str(text);
            }
            EventPayload::OutputMessage { role, content } => {
                flush(&mut buffer, &mut out);
                out.push(EngineMessage {
                    role: role.clone(),
                    content: content.clone(),
                    tool_call_id: None,
                    tool_name: None,
                });
            }
            EventPayload::ToolCall {
                call_id,
                tool_id,
                args,
            } => {
                flush(&mut buffer, &mut out);
                out.push(EngineMessage {
                    role: "assistant".into(),
                    content: format!("[Tool Call: {}({})]", tool_id, args),
                    tool_call_id: Some(call_id.clone()),
                    tool_name: Some(tool_id.clone()),
                });
            }
            EventPayload::ToolResult {
                call_id,
                tool_id,
                result,
                ..
            } => {
                let content = match result.as_str() {
                    Some(s) => s.to_string(),
                    None => result.to_string(),
                };
                out.push(EngineMessage {
                    role: "tool".into(),
                    content,
                    tool_call_id: Some(call_id.clone()),
                    tool_name: Some(tool_id.clone()),
                });
            }
            _ => {}
        }
    }

    flush(&mut buffer, &mut out);
    out
}

fn flush(buffer: &mut String, out: &mut Vec<EngineMessage>) {
    if !buffer.is_empty() {
        out.push(EngineMessage::assistant(std::mem::take(buffer)));
    }
}
