//! Risk assessment heuristics (spec §4.4 `assessRisk`).

use sa_domain::tool::{ImpactSize, RiskCategory, RiskProfile};

/// Path substrings that mark a file as touching project configuration.
/// Fixed, not policy-configurable (spec §4.4).
const CONFIG_MARKERS: &[&str] = &[".env", "config.", "tsconfig.", "package.json", "policy.yaml"];

/// Path substrings that mark a file as touching the build pipeline.
const BUILD_MARKERS: &[&str] = &["webpack", "vite", "turbo", "next.config", "Makefile"];

/// Computes the [`RiskProfile`] for a tool invocation.
///
/// `command_or_path` is whichever of `args.command` / `args.path` the tool
/// accepts (exec tools look at `command`, file tools at `path`).
pub fn assess_risk(
    tool_id: &str,
    category: RiskCategory,
    command_or_path: Option<&str>,
    high_risk_commands: &[String],
    redaction_keys: &[String],
) -> RiskProfile {
    let estimated_impact = match category {
        RiskCategory::Read => ImpactSize::Small,
        RiskCategory::Exec => {
            let first_token = command_or_path
                .and_then(|c| c.split_whitespace().next())
                .unwrap_or("");
            if high_risk_commands.iter().any(|c| c == first_token) {
                ImpactSize::Large
            } else {
                ImpactSize::Medium
            }
        }
        RiskCategory::Write => ImpactSize::Medium,
        RiskCategory::Network => ImpactSize::Medium,
    };

    let upper = command_or_path.unwrap_or("").to_uppercase();
    let touches_secrets = redaction_keys
        .iter()
        .any(|key| upper.contains(&key.to_uppercase()));

    let lower = command_or_path.unwrap_or("").to_lowercase();
    let touches_config = CONFIG_MARKERS
        .iter()
        .any(|m| lower.contains(&m.to_lowercase()));
    let touches_build = BUILD_MARKERS
        .iter()
        .any(|m| lower.contains(&m.to_lowercase()));

    RiskProfile {
        tool_id: tool_id.to_string(),
        category,
        estimated_impact,
        touches_secrets,
        touches_config,
        touches_build,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_is_always_small() {
        let risk = assess_risk("repo.read", RiskCategory::Read, Some("src/x.rs"), &[], &[]);
        assert_eq!(risk.estimated_impact, ImpactSize::Small);
    }

    #[test]
    fn high_risk_command_is_large() {
        let commands = vec!["rm".to_string(), "sudo".to_string()];
        let risk = assess_risk(
            "process.run",
            RiskCategory::Exec,
            Some("rm -rf build"),
            &commands,
            &[],
        );
        assert_eq!(risk.estimated_impact, ImpactSize::Large);
    }

    #[test]
    fn unlisted_exec_command_is_medium() {
        let commands = vec!["rm".to_string()];
        let risk = assess_risk(
            "process.run",
            RiskCategory::Exec,
            Some("ls -la"),
            &commands,
            &[],
        );
        assert_eq!(risk.estimated_impact, ImpactSize::Medium);
    }

    #[test]
    fn secret_key_in_path_is_detected() {
        let keys = vec!["SECRET".to_string(), "TOKEN".to_string()];
        let risk = assess_risk(
            "repo.read",
            RiskCategory::Read,
            Some("config/api_token.txt"),
            &[],
            &keys,
        );
        assert!(risk.touches_secrets);
    }

    #[test]
    fn config_and_build_markers() {
        let risk = assess_risk("repo.patch", RiskCategory::Write, Some(".env"), &[], &[]);
        assert!(risk.touches_config);

        let risk = assess_risk(
            "repo.patch",
            RiskCategory::Write,
            Some("webpack.config.js"),
            &[],
            &[],
        );
        assert!(risk.touches_build);
    }
}
