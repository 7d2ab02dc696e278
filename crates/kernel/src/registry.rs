//! Tool registration and policy-gated execution (spec §4.4).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use sa_domain::error::{Error, Result};
use sa_domain::tool::{ControlPath, RiskCategory, RiskProfile};

use crate::jail;
use crate::policy::PolicyEngine;
use crate::risk::assess_risk;

/// Context handed to a [`ToolHandler::execute`] call.
#[derive(Clone)]
pub struct ToolContext {
    pub workspace_root: PathBuf,
    pub run_id: String,
    pub session_id: String,
    pub cancel_token: CancellationToken,
    pub deny_patterns: Vec<String>,
}

impl ToolContext {
    /// Resolves `path` against `workspace_root`, rejecting jail escapes and
    /// deny-pattern matches (spec §4.4 `validatePath`).
    pub fn resolve_path(&self, path: &str) -> Result<PathBuf> {
        jail::validate_path(&self.workspace_root, path, &self.deny_patterns)
    }
}

/// A registered capability. Implementations are the concrete tools in
/// [`crate::tools`]; the kernel only ever talks to this trait.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    fn id(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> serde_json::Value;
    fn category(&self) -> RiskCategory;

    /// Extracts whichever of `args.command`/`args.path` this tool risk-
    /// assesses on (used by [`ToolKernel::assess_risk`]).
    fn risk_subject<'a>(&self, args: &'a serde_json::Value) -> Option<&'a str> {
        args.get("command")
            .or_else(|| args.get("path"))
            .and_then(|v| v.as_str())
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value>;
}

#[derive(Default)]
struct Registry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

/// Registers tools, assesses risk, resolves the policy control path, and
/// executes handlers under a timeout with output limits applied (spec
/// §4.4).
pub struct ToolKernel {
    registry: parking_lot::RwLock<Registry>,
    policy: Arc<PolicyEngine>,
}

impl ToolKernel {
    pub fn new(policy: Arc<PolicyEngine>) -> Self {
        Self {
            registry: parking_lot::RwLock::new(Registry::default()),
            policy,
        }
    }

    pub fn policy(&self) -> &Arc<PolicyEngine> {
        &self.policy
    }

    /// Registers `handler`. Fails if a handler with the same id already
    /// exists.
    pub fn register(&self, handler: Arc<dyn ToolHandler>) -> Result<()> {
        let mut registry = self.registry.write();
        if registry.handlers.contains_key(handler.id()) {
            return Err(Error::SchemaValidation(format!(
                "duplicate tool id: {}",
                handler.id()
            )));
        }
        registry.handlers.insert(handler.id().to_string(), handler);
        Ok(())
    }

    pub fn get_tool(&self, id: &str) -> Option<Arc<dyn ToolHandler>> {
        self.registry.read().handlers.get(id).cloned()
    }

    pub fn get_tools(&self) -> Vec<Arc<dyn ToolHandler>> {
        self.registry.read().handlers.values().cloned().collect()
    }

    pub fn assess_risk(&self, tool_id: &str, args: &serde_json::Value) -> Result<RiskProfile> {
        let handler = self
            .get_tool(tool_id)
            .ok_or_else(|| Error::NotFound(tool_id.to_string()))?;
        let subject = handler.risk_subject(args);
        Ok(assess_risk(
            tool_id,
            handler.category(),
            subject,
            self.policy.high_risk_commands(),
            self.policy.redaction_keys(),
        ))
    }

    pub fn get_control_path(&self, tool_id: &str, args: &serde_json::Value) -> Result<ControlPath> {
        let risk = self.assess_risk(tool_id, args)?;
        Ok(self.policy.resolve(tool_id, &risk))
    }

    pub fn needs_approval(&self, tool_id: &str, args: &serde_json::Value) -> Result<bool> {
        Ok(matches!(
            self.get_control_path(tool_id, args)?,
            ControlPath::Approval | ControlPath::Preview
        ))
    }

    pub fn validate_path(&self, workspace_root: &std::path::Path, target: &str) -> Result<PathBuf> {
        jail::validate_path(workspace_root, target, self.policy.deny_patterns())
    }

    /// Validates `args`, runs the handler under its policy timeout, and
    /// applies output truncation to the result.
    pub async fn execute(
        &self,
        tool_id: &str,
        args: serde_json::Value,
        run_id: &str,
        session_id: &str,
        workspace_root: PathBuf,
    ) -> Result<serde_json::Value> {
        let handler = self
            .get_tool(tool_id)
            .ok_or_else(|| Error::NotFound(tool_id.to_string()))?;

        validate_schema(&handler.input_schema(), &args)?;

        let ctx = ToolContext {
            workspace_root,
            run_id: run_id.to_string(),
            session_id: session_id.to_string(),
            cancel_token: CancellationToken::new(),
            deny_patterns: self.policy.deny_patterns().to_vec(),
        };

        let timeout = Duration::from_secs(self.policy.timeout_secs(tool_id));
        let result = tokio::time::timeout(timeout, handler.execute(&ctx, args)).await;

        match result {
            Ok(inner) => inner.map(|v| truncate_output(v, self.policy.limits().max_stdout)),
            Err(_) => {
                ctx.cancel_token.cancel();
                Err(Error::ExecutionTimeout(timeout.as_secs()))
            }
        }
    }
}

/// Minimal structural schema check: `type: object`, `required: [...]`, and
/// per-property `type` (string/number/boolean/object/array). Sufficient
/// for the fixed set of built-in tool schemas; not a general JSON-Schema
/// validator.
fn validate_schema(schema: &serde_json::Value, input: &serde_json::Value) -> Result<()> {
    if schema.get("type").and_then(|t| t.as_str()) != Some("object") {
        return Ok(());
    }
    let obj = input
        .as_object()
        .ok_or_else(|| Error::SchemaValidation("expected a JSON object".into()))?;

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required {
            let name = field.as_str().unwrap_or_default();
            if !obj.contains_key(name) {
                return Err(Error::SchemaValidation(format!("missing field: {name}")));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
        for (name, value) in obj {
            let Some(prop_schema) = properties.get(name) else {
                continue;
            };
            let Some(expected_type) = prop_schema.get("type").and_then(|t| t.as_str()) else {
                continue;
            };
            if !matches_json_type(expected_type, value) {
                return Err(Error::SchemaValidation(format!(
                    "field \"{name}\" expected type {expected_type}"
                )));
            }
        }
    }
    Ok(())
}

fn matches_json_type(expected: &str, value: &serde_json::Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" | "integer" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

const TRUNCATION_MARKER: &str = "...[truncated]";

/// Truncates any top-level string field (or a bare string result)
/// exceeding `max_len`, appending an explicit marker (spec §4.4).
fn truncate_output(value: serde_json::Value, max_len: usize) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(truncate_string(s, max_len)),
        serde_json::Value::Object(mut map) => {
            for (_, v) in map.iter_mut() {
                if let serde_json::Value::String(s) = v {
                    *s = truncate_string(std::mem::take(s), max_len);
                }
            }
            serde_json::Value::Object(map)
        }
        other => other,
    }
}

fn truncate_string(s: String, max_len: usize) -> String {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut truncated = s[..end].to_string();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait::async_trait]
    impl ToolHandler for EchoTool {
        fn id(&self) -> &str {
            "test.echo"
        }
        fn description(&self) -> &str {
            "echoes input"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "required": ["text"],
                "properties": {"text": {"type": "string"}}
            })
        }
        fn category(&self) -> RiskCategory {
            RiskCategory::Read
        }
        async fn execute(
            &self,
            _ctx: &ToolContext,
            input: serde_json::Value,
        ) -> Result<serde_json::Value> {
            Ok(input)
        }
    }

    fn kernel() -> ToolKernel {
        ToolKernel::new(Arc::new(PolicyEngine::defaults()))
    }

    #[test]
    fn duplicate_registration_fails() {
        let k = kernel();
        k.register(Arc::new(EchoTool)).unwrap();
        assert!(k.register(Arc::new(EchoTool)).is_err());
    }

    #[tokio::test]
    async fn missing_required_field_fails_schema_validation() {
        let k = kernel();
        k.register(Arc::new(EchoTool)).unwrap();
        let err = k
            .execute(
                "test.echo",
                serde_json::json!({}),
                "r1",
                "s1",
                PathBuf::from("/ws"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SchemaValidation(_)));
    }

    #[tokio::test]
    async fn valid_input_executes() {
        let k = kernel();
        k.register(Arc::new(EchoTool)).unwrap();
        let result = k
            .execute(
                "test.echo",
                serde_json::json!({"text": "hi"}),
                "r1",
                "s1",
                PathBuf::from("/ws"),
            )
            .await
            .unwrap();
        assert_eq!(result["text"], "hi");
    }

    #[test]
    fn truncates_long_string_with_marker() {
        let long = "x".repeat(100);
        let out = truncate_output(serde_json::Value::String(long), 10);
        let s = out.as_str().unwrap();
        assert!(s.starts_with("xxxxxxxxxx"));
        assert!(s.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn truncation_snaps_down_to_a_char_boundary() {
        // Each '€' is 3 bytes; a cut at byte 10 would land mid-character.
        let long = "€".repeat(20);
        let out = truncate_output(serde_json::Value::String(long), 10);
        let s = out.as_str().unwrap();
        assert!(s.ends_with(TRUNCATION_MARKER));
        assert!(s.is_char_boundary(s.len() - TRUNCATION_MARKER.len()));
    }
}
