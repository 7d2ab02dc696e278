use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider system
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_20000u")]
    pub default_timeout_ms: u64,
    #[serde(default = "d_2")]
    pub max_retries: u32,
    /// Maximum tool-call loop iterations per run before force-stopping.
    #[serde(default = "d_25")]
    pub max_steps: u32,
    /// Registered LLM providers (data-driven: adding a provider = adding config).
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Per-model pricing for cost estimation (key = model name, e.g. "gpt-4o").
    #[serde(default)]
    pub pricing: HashMap<String, ModelPricing>,
    /// Per-role model selection and fallback chain (key = role name, e.g. "planner").
    #[serde(default)]
    pub roles: HashMap<String, RoleConfig>,
    /// What to do at startup if every configured provider fails to initialize.
    #[serde(default)]
    pub startup_policy: LlmStartupPolicy,
    /// Backward-compatible alias for `startup_policy = require_one`.
    #[serde(default)]
    pub require_provider: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 20_000,
            max_retries: 2,
            max_steps: 25,
            providers: Vec::new(),
            pricing: HashMap::new(),
            roles: HashMap::new(),
            startup_policy: LlmStartupPolicy::default(),
            require_provider: false,
        }
    }
}

/// Startup behavior when LLM provider initialization fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LlmStartupPolicy {
    /// Boot even if no provider initialized; LLM-dependent endpoints fail
    /// until auth is fixed (checkable via provider readiness reporting).
    #[default]
    AllowNone,
    /// Refuse to start unless at least one provider initialized.
    RequireOne,
}

/// Model selection for a single [`crate::capability::ModelRole`], with an
/// ordered fallback chain used by the router when the primary model is
/// unavailable, lacks required capabilities, or fails transiently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    /// `"provider_id/model_name"`.
    pub model: String,
    #[serde(default)]
    pub require_tools: bool,
    #[serde(default)]
    pub require_json: bool,
    #[serde(default)]
    pub require_streaming: bool,
    #[serde(default)]
    pub fallbacks: Vec<FallbackConfig>,
}

/// A single fallback entry in a [`RoleConfig`]'s chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// `"provider_id/model_name"`.
    pub model: String,
    #[serde(default)]
    pub require_tools: bool,
    #[serde(default)]
    pub require_json: bool,
}

/// Pricing per million tokens for a specific model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Dollars per 1 million input (prompt) tokens.
    pub input_per_1m: f64,
    /// Dollars per 1 million output (completion) tokens.
    pub output_per_1m: f64,
}

impl ModelPricing {
    /// Calculate estimated cost in USD for the given token counts.
    pub fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 * self.input_per_1m + output_tokens as f64 * self.output_per_1m)
            / 1_000_000.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenaiCompat,
    /// OpenAI-compatible wire format via an OAuth-issued bearer token
    /// (e.g. a ChatGPT subscription) rather than a plain API key.
    OpenaiCodexOauth,
    /// OpenAI-compatible wire format with Azure's URL layout and `api-key` header.
    AzureOpenai,
    Anthropic,
    Google,
    AwsBedrock,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    /// Header name (e.g. "Authorization", "x-api-key").
    #[serde(default)]
    pub header: Option<String>,
    /// Header value prefix (e.g. "Bearer ").
    #[serde(default)]
    pub prefix: Option<String>,
    /// Env var containing the key.
    #[serde(default)]
    pub env: Option<String>,
    /// Direct key (for config-only setups; prefer env).
    #[serde(default)]
    pub key: Option<String>,
    /// OS keychain service name (mode = keychain).
    #[serde(default)]
    pub service: Option<String>,
    /// OS keychain account name (mode = keychain).
    #[serde(default)]
    pub account: Option<String>,
    /// Env var names to round-robin across (overrides `env`/`key` if non-empty).
    #[serde(default)]
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    ApiKey,
    /// Resolve the key from the OS keychain via `service`+`account`.
    Keychain,
    None,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_20000u() -> u64 {
    20_000
}
fn d_2() -> u32 {
    2
}
fn d_25() -> u32 {
    25
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_pricing_estimate_cost() {
        let pricing = ModelPricing {
            input_per_1m: 2.50,
            output_per_1m: 10.00,
        };
        let cost = pricing.estimate_cost(1000, 500);
        assert!((cost - 0.0075).abs() < 1e-10);
    }

    #[test]
    fn model_pricing_zero_tokens() {
        let pricing = ModelPricing {
            input_per_1m: 5.00,
            output_per_1m: 15.00,
        };
        assert!((pricing.estimate_cost(0, 0) - 0.0).abs() < 1e-10);
    }

    #[test]
    fn llm_config_default_max_steps_is_25() {
        assert_eq!(LlmConfig::default().max_steps, 25);
    }

    #[test]
    fn llm_config_pricing_deserializes() {
        let json = r#"{
            "pricing": {
                "gpt-4o": { "input_per_1m": 2.50, "output_per_1m": 10.00 }
            }
        }"#;
        let config: LlmConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.pricing.len(), 1);
        let gpt4o = config.pricing.get("gpt-4o").unwrap();
        assert!((gpt4o.input_per_1m - 2.50).abs() < 1e-10);
    }
}
