use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Minimum unobserved events on a run before the Observer is invoked.
    #[serde(default = "d_observation_threshold")]
    pub observation_threshold: usize,
    /// Minimum accumulated observations before the Reflector is invoked.
    #[serde(default = "d_reflection_threshold")]
    pub reflection_threshold: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            observation_threshold: d_observation_threshold(),
            reflection_threshold: d_reflection_threshold(),
        }
    }
}

fn d_observation_threshold() -> usize {
    20
}

fn d_reflection_threshold() -> usize {
    10
}
