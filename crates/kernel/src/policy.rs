//! Loads and resolves the per-workspace policy document (spec §4.5).
//!
//! The policy is loaded once at construction (hot reload is explicitly out
//! of scope — spec §9 design notes) from `workspaceRoot/policy.yaml`,
//! deep-merged onto the built-in defaults below.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use sa_domain::error::Result;
use sa_domain::tool::{ControlPath, ImpactSize, RiskProfile};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspacePolicy {
    pub deny_patterns: Vec<String>,
}

impl Default for WorkspacePolicy {
    fn default() -> Self {
        Self {
            deny_patterns: vec!["**/.git/**".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionPolicy {
    /// Per-tool timeout in seconds. Unlisted tools default to 60s, except
    /// `process.run` which defaults to 300s (handled in [`PolicyEngine::timeout_for`]).
    pub timeouts: HashMap<String, u64>,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        let mut timeouts = HashMap::new();
        timeouts.insert("process.run".to_string(), 300);
        Self { timeouts }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    Never,
    Always,
    Risk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityPolicy {
    pub approval: ApprovalMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_threshold: Option<ImpactSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskPolicy {
    pub high_risk_commands: Vec<String>,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            high_risk_commands: ["rm", "sudo", "curl", "wget", "chmod", "chown"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionPolicy {
    pub keys: Vec<String>,
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self {
            keys: ["SECRET", "TOKEN", "API_KEY", "PASSWORD", "PRIVATE_KEY"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsPolicy {
    pub max_stdout: usize,
    pub max_diff_size: usize,
}

impl Default for LimitsPolicy {
    fn default() -> Self {
        Self {
            max_stdout: 20_000,
            max_diff_size: 200_000,
        }
    }
}

/// The fully-resolved policy document (spec §4.5 "Recognized options").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyDocument {
    pub workspace: WorkspacePolicy,
    pub execution: ExecutionPolicy,
    pub capabilities: HashMap<String, CapabilityPolicy>,
    pub risk: RiskPolicy,
    pub redaction: RedactionPolicy,
    pub limits: LimitsPolicy,
}

impl Default for PolicyDocument {
    fn default() -> Self {
        let mut capabilities = HashMap::new();
        for never in ["repo.read", "repo.search", "lint.run"] {
            capabilities.insert(
                never.to_string(),
                CapabilityPolicy {
                    approval: ApprovalMode::Never,
                    risk_threshold: None,
                    timeout: None,
                },
            );
        }
        for always in ["repo.patch", "repo.edit"] {
            capabilities.insert(
                always.to_string(),
                CapabilityPolicy {
                    approval: ApprovalMode::Always,
                    risk_threshold: None,
                    timeout: None,
                },
            );
        }
        for risk in ["process.run", "test.run"] {
            capabilities.insert(
                risk.to_string(),
                CapabilityPolicy {
                    approval: ApprovalMode::Risk,
                    risk_threshold: None,
                    timeout: None,
                },
            );
        }
        Self {
            workspace: WorkspacePolicy::default(),
            execution: ExecutionPolicy::default(),
            capabilities,
            risk: RiskPolicy::default(),
            redaction: RedactionPolicy::default(),
            limits: LimitsPolicy::default(),
        }
    }
}

/// Loads, merges, and resolves policy for a single workspace (spec §4.5).
pub struct PolicyEngine {
    doc: PolicyDocument,
}

impl PolicyEngine {
    /// Loads `workspace_root/policy.yaml` if present, deep-merged onto
    /// [`PolicyDocument::default`]; otherwise uses the defaults verbatim.
    pub fn load(workspace_root: &Path) -> Result<Self> {
        let path = workspace_root.join("policy.yaml");
        let doc = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let overrides: serde_yaml::Value = serde_yaml::from_str(&raw)
                .map_err(|e| sa_domain::error::Error::Config(e.to_string()))?;
            let default_value = serde_yaml::to_value(PolicyDocument::default())
                .map_err(|e| sa_domain::error::Error::Config(e.to_string()))?;
            let merged = deep_merge(default_value, overrides);
            serde_yaml::from_value(merged)
                .map_err(|e| sa_domain::error::Error::Config(e.to_string()))?
        } else {
            PolicyDocument::default()
        };
        Ok(Self { doc })
    }

    pub fn defaults() -> Self {
        Self {
            doc: PolicyDocument::default(),
        }
    }

    pub fn document(&self) -> &PolicyDocument {
        &self.doc
    }

    pub fn deny_patterns(&self) -> &[String] {
        &self.doc.workspace.deny_patterns
    }

    pub fn high_risk_commands(&self) -> &[String] {
        &self.doc.risk.high_risk_commands
    }

    pub fn redaction_keys(&self) -> &[String] {
        &self.doc.redaction.keys
    }

    pub fn limits(&self) -> LimitsPolicy {
        self.doc.limits
    }

    /// Per-tool timeout in seconds (spec §4.5 execution.timeouts, with the
    /// `process.run: 300 / else 60` defaults).
    pub fn timeout_secs(&self, tool_id: &str) -> u64 {
        if let Some(cap) = self.doc.capabilities.get(tool_id) {
            if let Some(t) = cap.timeout {
                return t;
            }
        }
        self.doc
            .execution
            .timeouts
            .get(tool_id)
            .copied()
            .unwrap_or(60)
    }

    /// Resolves `(tool, risk)` to a control path (spec §4.5 "Resolution").
    /// Unknown tools default to the `risk` capability mode.
    pub fn resolve(&self, tool_id: &str, risk: &RiskProfile) -> ControlPath {
        let mode = self
            .doc
            .capabilities
            .get(tool_id)
            .map(|c| c.approval)
            .unwrap_or(ApprovalMode::Risk);

        match mode {
            ApprovalMode::Never => ControlPath::Auto,
            ApprovalMode::Always => ControlPath::Approval,
            ApprovalMode::Risk => {
                if risk.estimated_impact == ImpactSize::Large
                    || risk.touches_secrets
                    || risk.touches_config
                {
                    ControlPath::Approval
                } else if risk.estimated_impact == ImpactSize::Medium {
                    ControlPath::Preview
                } else {
                    ControlPath::Auto
                }
            }
        }
    }
}

/// Recursively merges `overrides` onto `base`: maps merge key-by-key,
/// everything else (scalars, sequences) is replaced wholesale.
fn deep_merge(base: serde_yaml::Value, overrides: serde_yaml::Value) -> serde_yaml::Value {
    match (base, overrides) {
        (serde_yaml::Value::Mapping(mut base_map), serde_yaml::Value::Mapping(override_map)) => {
            for (k, v) in override_map {
                let merged = match base_map.remove(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => v,
                };
                base_map.insert(k, merged);
            }
            serde_yaml::Value::Mapping(base_map)
        }
        (_, overrides) => overrides,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::tool::RiskCategory;

    fn risk(impact: ImpactSize, secrets: bool, config: bool) -> RiskProfile {
        RiskProfile {
            tool_id: "x".into(),
            category: RiskCategory::Write,
            estimated_impact: impact,
            touches_secrets: secrets,
            touches_config: config,
            touches_build: false,
        }
    }

    #[test]
    fn never_tools_are_auto() {
        let engine = PolicyEngine::defaults();
        let path = engine.resolve("repo.read", &risk(ImpactSize::Small, false, false));
        assert_eq!(path, ControlPath::Auto);
    }

    #[test]
    fn always_tools_need_approval_regardless_of_risk() {
        let engine = PolicyEngine::defaults();
        let path = engine.resolve("repo.patch", &risk(ImpactSize::Small, false, false));
        assert_eq!(path, ControlPath::Approval);
    }

    #[test]
    fn risk_mode_large_impact_needs_approval() {
        let engine = PolicyEngine::defaults();
        let path = engine.resolve("process.run", &risk(ImpactSize::Large, false, false));
        assert_eq!(path, ControlPath::Approval);
    }

    #[test]
    fn risk_mode_medium_impact_is_preview() {
        let engine = PolicyEngine::defaults();
        let path = engine.resolve("process.run", &risk(ImpactSize::Medium, false, false));
        assert_eq!(path, ControlPath::Preview);
    }

    #[test]
    fn risk_mode_secrets_escalates_to_approval() {
        let engine = PolicyEngine::defaults();
        let path = engine.resolve("process.run", &risk(ImpactSize::Small, true, false));
        assert_eq!(path, ControlPath::Approval);
    }

    #[test]
    fn unknown_tool_defaults_to_risk_mode() {
        let engine = PolicyEngine::defaults();
        let path = engine.resolve("custom.tool", &risk(ImpactSize::Large, false, false));
        assert_eq!(path, ControlPath::Approval);
    }

    #[test]
    fn default_timeouts() {
        let engine = PolicyEngine::defaults();
        assert_eq!(engine.timeout_secs("process.run"), 300);
        assert_eq!(engine.timeout_secs("repo.patch"), 60);
    }

    #[test]
    fn policy_yaml_deep_merges_onto_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("policy.yaml"),
            "risk:\n  high_risk_commands: [rm]\nlimits:\n  max_stdout: 500\n",
        )
        .unwrap();

        let engine = PolicyEngine::load(dir.path()).unwrap();
        assert_eq!(engine.high_risk_commands(), &["rm".to_string()]);
        assert_eq!(engine.limits().max_stdout, 500);
        // Untouched defaults survive the merge.
        assert_eq!(engine.deny_patterns(), &["**/.git/**".to_string()]);
    }
}
