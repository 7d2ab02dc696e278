use std::path::PathBuf;
use std::sync::Arc;

use sa_contextpack::Assembler;
use sa_domain::config::Config;
use sa_engine::EngineAdapter;
use sa_kernel::{ApprovalGate, PolicyEngine, RunManager, ToolKernel};
use sa_ledger::Ledger;
use sa_memory::MemoryService;
use sa_providers::ProviderRegistry;
use sa_skills::registry::SkillsRegistry;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services** — config, ledger, LLM providers
/// - **Kernel** — run lifecycle, approvals, tool kernel, policy
/// - **Context & skills** — system-prompt assembly, skill registry
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub config_path: PathBuf,
    pub ledger: Arc<Ledger>,
    pub providers: Arc<ProviderRegistry>,

    // ── Kernel (spec §4.2–§4.5) ──────────────────────────────────────
    pub run_manager: Arc<RunManager>,
    pub approvals: Arc<ApprovalGate>,
    pub tools: Arc<ToolKernel>,
    pub policy: Arc<PolicyEngine>,

    // ── Engine + context (spec §4.6–§4.7) ───────────────────────────
    pub engine: Arc<EngineAdapter>,
    pub assembler: Arc<Assembler>,

    // ── Skills + memory (spec §4.8–§4.9) ─────────────────────────────
    pub skills: Arc<SkillsRegistry>,
    pub memory: Arc<MemoryService>,
}
