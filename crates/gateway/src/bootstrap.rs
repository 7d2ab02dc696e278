//! Builds a fully wired [`AppState`] from a validated [`Config`].

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use sa_contextpack::builder::{ContextPackBuilder, SessionMode, WorkspaceFile};
use sa_contextpack::Assembler;
use sa_domain::config::{Config, ConfigSeverity};
use sa_engine::EngineAdapter;
use sa_kernel::{ApprovalGate, PolicyEngine, RunManager, ToolKernel};
use sa_ledger::Ledger;
use sa_memory::{MemoryParams, MemoryService};
use sa_providers::router::LlmRouter;
use sa_providers::ProviderRegistry;
use sa_skills::{skill_search_dirs, SkillsRegistry};

use crate::state::AppState;

const PRODUCT: &str = "serialagent";

/// Ambient workspace context files read from `config.workspace.path` to
/// build the Assembler's base prompt (spec §4.7).
const CONTEXT_FILES: &[&str] = &["AGENTS.md", "SOUL.md", "USER.md", "IDENTITY.md", "TOOLS.md"];

/// Validate `config`, bring up every subsystem and return the resulting
/// [`AppState`]. Bails on any error-severity config issue; warnings are
/// logged and otherwise ignored.
pub fn build_app_state(config: Arc<Config>, config_path: PathBuf) -> anyhow::Result<AppState> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    let ledger = Arc::new(Ledger::open(&config.ledger.db_path).context("opening ledger")?);
    tracing::info!(db_path = %config.ledger.db_path, "ledger ready");

    let run_manager = Arc::new(RunManager::new(ledger.clone()));
    let approvals = Arc::new(ApprovalGate::new());

    let policy = Arc::new(PolicyEngine::load(&config.workspace.path).context("loading tool policy")?);
    let tools = Arc::new(ToolKernel::new(policy.clone()));
    sa_kernel::tools::register_builtins(&tools).context("registering built-in tools")?;
    tracing::info!(tools = tools.get_tools().len(), "tool kernel ready");

    let providers =
        Arc::new(ProviderRegistry::from_config(&config.llm).context("initializing LLM providers")?);
    if providers.is_empty() {
        tracing::warn!("no LLM providers initialized — set provider credentials to enable runs");
    } else {
        tracing::info!(providers = providers.len(), "LLM provider registry ready");
    }
    let router = Arc::new(LlmRouter::from_config(&config.llm).context("initializing LLM router")?);

    let engine = Arc::new(EngineAdapter::new(
        run_manager.clone(),
        approvals.clone(),
        tools.clone(),
        providers.clone(),
    ));

    let base_prompt = read_base_prompt(&config.workspace.path, &config.context);
    let assembler = Arc::new(Assembler::new(base_prompt));

    let home_dir = std::env::var_os("HOME").map(PathBuf::from);
    let search_dirs = skill_search_dirs(
        &config.workspace.path,
        home_dir.as_deref(),
        PRODUCT,
        &config.skills.extra_dirs,
    );
    let skills = match SkillsRegistry::load(&search_dirs) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            tracing::warn!(error = %e, "failed to load skills, starting with an empty registry");
            Arc::new(SkillsRegistry::empty())
        }
    };

    let memory = Arc::new(MemoryService::new(
        ledger.clone(),
        router,
        MemoryParams::from(config.memory.clone()),
    ));

    Ok(AppState {
        config,
        config_path,
        ledger,
        providers,
        run_manager,
        approvals,
        tools,
        policy,
        engine,
        assembler,
        skills,
        memory,
    })
}

/// Reads the ambient workspace context files and runs them through the
/// context-pack builder to produce the Assembler's `base_prompt`.
///
/// A missing workspace or unreadable file is not fatal — the builder
/// injects a "missing" marker for that section (spec §4.7).
fn read_base_prompt(
    workspace_root: &std::path::Path,
    ctx: &sa_domain::config::ContextConfig,
) -> String {
    let files: Vec<WorkspaceFile> = CONTEXT_FILES
        .iter()
        .map(|&name| WorkspaceFile {
            name: name.to_string(),
            content: std::fs::read_to_string(workspace_root.join(name)).ok(),
        })
        .collect();

    let builder = ContextPackBuilder::new(ctx.bootstrap_max_chars, ctx.bootstrap_total_max_chars);
    let (prompt, report) = builder.build(&files, SessionMode::Normal, false, None, None);
    tracing::info!(
        included = report
            .files
            .iter()
            .filter(|s| s.included && !s.missing)
            .count(),
        total_chars = prompt.len(),
        "base prompt assembled"
    );
    prompt
}
