/// Shared error type used across all crates in this workspace.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("IO: {0}")]
    Io(String),

    #[error("JSON: {0}")]
    Json(String),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("auth: {0}")]
    Auth(String),

    #[error("skill not found: {0}")]
    SkillNotFound(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),

    // ── Run lifecycle ────────────────────────────────────────────
    #[error("session {0} already has an active run")]
    SessionBusy(String),

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("not found: {0}")]
    NotFound(String),

    // ── Tool kernel / workspace jail ─────────────────────────────
    #[error("path escapes workspace: {0}")]
    WorkspaceEscape(String),

    #[error("path matches deny pattern: {0}")]
    DenyPatternMatch(String),

    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("execution timed out after {0}s")]
    ExecutionTimeout(u64),

    // ── repo.edit structured failures ────────────────────────────
    #[error("stale base hash")]
    StaleBase,

    #[error("anchor mismatch at line {line}")]
    AnchorMismatch { line: usize, window: Vec<String> },

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    // ── Approval gate ────────────────────────────────────────────
    #[error("approval cancelled")]
    ApprovalCancelled,

    // ── Engine / storage ──────────────────────────────────────────
    #[error("provider error: {0}")]
    ProviderError(String),

    #[error("storage error: {0}")]
    StorageError(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
