/// Limits for one element search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchConfig {
    /// Maximum number of frames on the descent stack, root included.
    pub max_depth: usize,
    /// Candidates tried per frame, in the oracle's order.
    pub max_branches: usize,
    /// How many recently visited selectors are shown to the oracle.
    pub recent_visited: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_branches: 5,
            recent_visited: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentConfig {
    pub search: SearchConfig,
    /// Oracle requests allowed per plan step.
    pub max_attempts: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            max_attempts: 4,
        }
    }
}
