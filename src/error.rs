//! Error types for the agent runtime

use std::time::Duration;

use thiserror::Error;

/// Result type alias for the agent runtime
pub type Result<T> = std::result::Result<T, AgentError>;

/// Main error type for the agent runtime
#[derive(Debug, Error)]
pub enum AgentError {
    /// Error from the OpenAI API
    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    /// Maximum turns exceeded
    #[error("Maximum turns exceeded: {max_turns}")]
    MaxTurnsExceeded { max_turns: usize },

    /// An input guardrail tripped before the run started
    #[error("Input guardrail tripped: {info}")]
    InputGuardrailTriggered { info: serde_json::Value },

    /// An output guardrail tripped on the candidate final output
    #[error("Output guardrail tripped: {info}")]
    OutputGuardrailTriggered { info: serde_json::Value },

    /// Tool execution error with no recovery handler
    #[error("Tool '{tool}' failed: {message}")]
    ToolExecutionError { tool: String, message: String },

    /// Handoff error
    #[error("Handoff error: {message}")]
    HandoffError { message: String },

    /// Malformed or schema-violating model output
    #[error("Model behavior error: {message}")]
    ModelBehaviorError { message: String },

    /// Caller configuration mistake; fatal, never retried
    #[error("User error: {message}")]
    UserError { message: String },

    /// The run was cancelled through its cancellation token
    #[error("Run cancelled")]
    RunCancelled,

    /// A model call or tool invocation exceeded its configured timeout
    #[error("{operation} timed out after {timeout:?}")]
    StepTimeout {
        operation: String,
        timeout: Duration,
    },

    /// Session storage error
    #[error("Session error: {0}")]
    SessionError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// True for the terminal conditions a caller is expected to handle
    /// rather than treat as a bug: guardrail trips, the turn limit, and
    /// cancellation.
    pub fn is_terminal_rejection(&self) -> bool {
        matches!(
            self,
            AgentError::InputGuardrailTriggered { .. }
                | AgentError::OutputGuardrailTriggered { .. }
                | AgentError::MaxTurnsExceeded { .. }
                | AgentError::RunCancelled
        )
    }
}
