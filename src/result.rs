//! Result types for agent execution

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::items::RunItem;
use crate::usage::UsageStats;

/// The outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// The final output: a string for plain-text finals, or the validated
    /// JSON value when the agent declares an output schema.
    pub final_output: Value,

    /// Ordered log of everything that happened: messages, tool calls,
    /// tool outputs, and handoffs.
    pub items: Vec<RunItem>,

    /// Name of the agent that produced the final output.
    pub final_agent: String,

    /// Aggregated token usage for the run.
    pub usage: UsageStats,
}

impl RunResult {
    pub fn new(
        final_output: Value,
        items: Vec<RunItem>,
        final_agent: impl Into<String>,
        usage: UsageStats,
    ) -> Self {
        Self {
            final_output,
            items,
            final_agent: final_agent.into(),
            usage,
        }
    }

    /// The final output as text, when it is a plain string.
    pub fn final_text(&self) -> Option<&str> {
        self.final_output.as_str()
    }

    /// Deserializes a schema-validated final output into `T`.
    pub fn final_output_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.final_output.clone()).map_err(|e| {
            AgentError::ModelBehaviorError {
                message: format!("final output does not match expected type: {e}"),
            }
        })
    }

    /// Number of handoffs recorded during the run.
    pub fn handoff_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item, RunItem::Handoff(_)))
            .count()
    }
}
