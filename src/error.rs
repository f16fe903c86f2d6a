use thiserror::Error;

/// Everything that can go wrong while searching, dispatching or sequencing steps.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// The search space was exhausted without the oracle naming a match.
    #[error("Element not found: {0}")]
    NotFound(String),

    /// The oracle answered, but not in the shape that was asked for.
    #[error("Malformed oracle response: {0}")]
    OracleMalformed(String),

    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Invalid parameters for {action}: {reason}")]
    InvalidParameters { action: String, reason: String },

    #[error("Execution error: {0}")]
    Execution(String),

    /// The step's attempt budget ran out. Fatal for the step.
    #[error("Step '{step}' not completed after {attempts} attempts: {last_cause}")]
    ExhaustedFailure {
        step: String,
        attempts: u32,
        last_cause: String,
    },

    #[error("Human channel closed")]
    HumanChannelClosed,

    #[error("Cancelled")]
    Cancelled,
}

impl AgentError {
    pub fn invalid_parameters(action: &str, reason: impl Into<String>) -> Self {
        AgentError::InvalidParameters {
            action: action.to_string(),
            reason: reason.into(),
        }
    }
}
