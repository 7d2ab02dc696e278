use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event ledger
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Path to the embedded database file, or the literal `":memory:"`.
    #[serde(default = "d_db_path")]
    pub db_path: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: d_db_path(),
        }
    }
}

fn d_db_path() -> String {
    "./data/ledger.db".into()
}
