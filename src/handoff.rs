//! # Agent handoffs
//!
//! A handoff transfers active-agent status from one agent to another
//! mid-run. Handoffs are advertised to the model as tools; when the model
//! selects one, the runner intercepts the call, validates the payload,
//! filters the forwarded history, fires the callback and hooks, and
//! continues the loop under the target agent.
//!
//! ## Example: a triage front desk
//!
//! ```rust
//! use agent_relay::{Agent, Handoff};
//!
//! let refunds = Agent::simple("Refunds", "You handle refund requests.");
//!
//! let triage = Agent::simple("Triage", "Route the user to a specialist.")
//!     .with_handoff(Handoff::new(refunds, "Handles refund requests"));
//!
//! assert_eq!(triage.handoffs()[0].name, "Refunds");
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::agent::Agent;
use crate::context::RunContext;
use crate::error::Result;
use crate::items::Message;
use crate::tool::{Tool, ToolResult};

type InputFilterFn = Arc<dyn Fn(Vec<Message>) -> Vec<Message> + Send + Sync>;
type EnabledFn = Arc<dyn Fn(&RunContext) -> bool + Send + Sync>;
type OnHandoffFn = Arc<dyn Fn(&RunContext, &Value) + Send + Sync>;

/// A potential transfer target for an agent.
#[derive(Clone)]
pub struct Handoff {
    /// Name the handoff is advertised under; defaults to the target
    /// agent's name.
    pub name: String,

    /// Capability description shown to the delegating model.
    pub description: String,

    /// The agent that takes over.
    pub agent: Arc<Agent>,

    /// Schema for the payload the model supplies when selecting this
    /// handoff. When absent, a free-form `{reason}` payload is accepted.
    pub input_schema: Option<Value>,

    pub(crate) input_filter: Option<InputFilterFn>,
    pub(crate) enabled: Option<EnabledFn>,
    pub(crate) on_handoff: Option<OnHandoffFn>,
}

impl Handoff {
    /// Creates a handoff to `agent`, advertised under the agent's own name.
    pub fn new(agent: Agent, description: impl Into<String>) -> Self {
        let name = agent.name().to_string();
        Self {
            name,
            description: description.into(),
            agent: Arc::new(agent),
            input_schema: None,
            input_filter: None,
            enabled: None,
            on_handoff: None,
        }
    }

    /// Overrides the advertised name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Declares a payload schema the model-supplied arguments must satisfy.
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// Transforms the conversation history handed to the target agent.
    /// Used to strip noise (e.g. prior tool traffic) before the new agent
    /// sees the conversation.
    pub fn with_input_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(Vec<Message>) -> Vec<Message> + Send + Sync + 'static,
    {
        self.input_filter = Some(Arc::new(filter));
        self
    }

    /// Attach an enablement predicate, re-evaluated every turn. A disabled
    /// handoff is not advertised and cannot be selected.
    pub fn enabled_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RunContext) -> bool + Send + Sync + 'static,
    {
        self.enabled = Some(Arc::new(predicate));
        self
    }

    /// Callback invoked at handoff time with the context and the validated
    /// payload, strictly for side effects.
    pub fn on_handoff<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RunContext, &Value) + Send + Sync + 'static,
    {
        self.on_handoff = Some(Arc::new(callback));
        self
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn is_enabled(&self, ctx: &RunContext) -> bool {
        self.enabled.as_ref().map_or(true, |pred| pred(ctx))
    }

    /// Applies this handoff's input filter to the forwarded history.
    pub fn filter_history(&self, history: Vec<Message>) -> Vec<Message> {
        match &self.input_filter {
            Some(filter) => filter(history),
            None => history,
        }
    }

    /// The payload schema advertised to the model.
    pub fn payload_schema(&self) -> Value {
        self.input_schema.clone().unwrap_or_else(|| {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "reason": {
                        "type": "string",
                        "description": "Reason for the handoff"
                    }
                }
            })
        })
    }
}

impl std::fmt::Debug for Handoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handoff")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("has_input_filter", &self.input_filter.is_some())
            .finish()
    }
}

/// Adapter exposing a handoff to the model provider as a tool. The runner
/// intercepts calls to it before execution.
#[derive(Clone, Debug)]
pub struct HandoffTool {
    handoff: Handoff,
}

impl From<Handoff> for HandoffTool {
    fn from(h: Handoff) -> Self {
        Self { handoff: h }
    }
}

#[async_trait]
impl Tool for HandoffTool {
    fn name(&self) -> &str {
        &self.handoff.name
    }

    fn description(&self) -> &str {
        &self.handoff.description
    }

    fn parameters_schema(&self) -> Value {
        self.handoff.payload_schema()
    }

    fn is_enabled(&self, ctx: &RunContext) -> bool {
        self.handoff.is_enabled(ctx)
    }

    async fn execute(&self, _ctx: &RunContext, _arguments: Value) -> Result<ToolResult> {
        // Never executed directly; the runner intercepts handoff calls.
        Ok(ToolResult::success(
            serde_json::json!({ "handoff": self.handoff.name }),
        ))
    }
}

/// Ready-made history filters for [`Handoff::with_input_filter`] and
/// [`RunConfig::handoff_input_filter`](crate::runner::RunConfig).
pub mod filters {
    use crate::items::Message;

    /// Removes all tool traffic (tool results and assistant tool-call
    /// requests) from the forwarded history, leaving only plain messages.
    pub fn remove_all_tools(history: Vec<Message>) -> Vec<Message> {
        history.into_iter().filter(|m| !m.is_tool_traffic()).collect()
    }

    /// Removes system messages, so the target agent starts from its own
    /// instructions only.
    pub fn remove_system_messages(history: Vec<Message>) -> Vec<Message> {
        history
            .into_iter()
            .filter(|m| m.role != crate::items::Role::System)
            .collect()
    }
}
