//! The request/message shapes passed between the Context Assembler and the
//! Engine Adapter (spec §4.6, §4.7).

use serde::{Deserialize, Serialize};

use crate::run::RunConfig;
use crate::tool::{Message, ToolDefinition};

/// Assembled input to a single `run()` call of the Engine Adapter.
#[derive(Debug, Clone)]
pub struct EngineRunRequest {
    pub run_config: RunConfig,
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
}

/// One entry of `projectMessages`'s output (spec §4.7 "Projector").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl EngineMessage {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".into(),
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_name: None,
        }
    }
}
