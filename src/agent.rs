//! # Agent (orientation)
//!
//! An `Agent` is a configured participant in a workflow: a name,
//! instructions (static or computed from the run context), tools,
//! handoffs, guardrails, and optional lifecycle hooks. Agents are
//! immutable once built; "clone with overrides" is expressed by cloning
//! and applying builder methods to the clone, which never affects the
//! original.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use crate::context::RunContext;
use crate::error::{AgentError, Result};
use crate::guardrail::{InputGuardrail, OutputGuardrail};
use crate::handoff::Handoff;
use crate::hooks::AgentHooks;
use crate::items::Message;
use crate::model::ModelSettings;
use crate::tool::{AgentTool, Tool};

/// Instruction source for an agent: fixed text, or a function of the run
/// context and the agent itself, resolved fresh each time the agent is
/// active.
#[derive(Clone)]
pub enum Instructions {
    Static(String),
    Computed(Arc<dyn Fn(&RunContext, &Agent) -> String + Send + Sync>),
}

impl std::fmt::Debug for Instructions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instructions::Static(text) => f.debug_tuple("Static").field(text).finish(),
            Instructions::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<&str> for Instructions {
    fn from(text: &str) -> Self {
        Instructions::Static(text.to_string())
    }
}

impl From<String> for Instructions {
    fn from(text: String) -> Self {
        Instructions::Static(text)
    }
}

/// What the runner does after executing a turn's tool calls.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ToolUsePolicy {
    /// Feed tool outputs back to the model and continue the loop.
    #[default]
    ContinueLoop,
    /// Surface the first tool's output directly as the final output.
    StopAtFirstTool,
    /// Continue the loop unless the named tool ran; then its output is the
    /// final output.
    StopAtNamedTool(String),
}

/// Complete configuration for an [`Agent`].
#[derive(Clone)]
pub struct AgentConfig {
    /// Name used for identification, handoff targeting, and logs.
    pub name: String,

    /// The agent's instruction source.
    pub instructions: Instructions,

    /// Capability description used when this agent is a handoff target.
    pub handoff_description: Option<String>,

    /// Tools the agent may call. Names must be unique within the agent.
    pub tools: Vec<Arc<dyn Tool>>,

    /// Agents this one can hand control to.
    pub handoffs: Vec<Handoff>,

    /// Guardrails run against the user input before the loop starts.
    pub input_guardrails: Vec<Arc<dyn InputGuardrail>>,

    /// Guardrails run against the candidate final output.
    pub output_guardrails: Vec<Arc<dyn OutputGuardrail>>,

    /// Model name requested from the provider.
    pub model: String,

    /// Per-call model parameters.
    pub model_settings: ModelSettings,

    /// Default turn budget when the run config does not set one.
    pub max_turns: Option<usize>,

    /// JSON schema the final output must satisfy. When set, the final text
    /// is parsed and validated, and the run fails with a model-behavior
    /// error on mismatch.
    pub output_schema: Option<Value>,

    /// What happens after tool calls execute.
    pub tool_use_policy: ToolUsePolicy,

    /// Lifecycle subscriber for this agent's events.
    pub hooks: Option<Arc<dyn AgentHooks>>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "Assistant".to_string(),
            instructions: Instructions::Static("You are a helpful assistant.".to_string()),
            handoff_description: None,
            tools: vec![],
            handoffs: vec![],
            input_guardrails: vec![],
            output_guardrails: vec![],
            model: "gpt-4o".to_string(),
            model_settings: ModelSettings::default(),
            max_turns: Some(10),
            output_schema: None,
            tool_use_policy: ToolUsePolicy::default(),
            hooks: None,
        }
    }
}

/// An agent that can respond, call tools, and hand off to other agents.
///
/// ## Example
///
/// ```rust
/// use agent_relay::{Agent, tool::FunctionTool};
/// use std::sync::Arc;
///
/// let weather = Arc::new(FunctionTool::simple(
///     "get_weather",
///     "Gets the current weather for a city.",
///     |city: String| format!("Sunny in {city}"),
/// ));
///
/// let agent = Agent::simple("WeatherBot", "You provide weather updates.")
///     .with_model("gpt-4o-mini")
///     .with_tool(weather);
///
/// assert_eq!(agent.name(), "WeatherBot");
/// assert_eq!(agent.tools().len(), 1);
///
/// // Clone-with-overrides: the copy is independent of the original.
/// let teacher = agent.clone().with_name("Teacher");
/// assert_eq!(agent.name(), "WeatherBot");
/// assert_eq!(teacher.name(), "Teacher");
/// ```
#[derive(Clone)]
pub struct Agent {
    pub config: AgentConfig,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    /// Creates an agent with just a name and static instructions; all
    /// other settings take defaults.
    pub fn simple(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self::new(AgentConfig {
            name: name.into(),
            instructions: Instructions::Static(instructions.into()),
            ..Default::default()
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<Instructions>) -> Self {
        self.config.instructions = instructions.into();
        self
    }

    /// Instructions computed from the run context each time the agent is
    /// active.
    ///
    /// ```rust
    /// use agent_relay::Agent;
    ///
    /// struct Pantry { ingredient: String }
    ///
    /// let agent = Agent::simple("RecipeBot", "")
    ///     .with_dynamic_instructions(|ctx, _agent| {
    ///         let ingredient = ctx
    ///             .get::<Pantry>()
    ///             .map(|p| p.ingredient.as_str())
    ///             .unwrap_or("anything");
    ///         format!("Give a healthy recipe based on: {ingredient}")
    ///     });
    /// # let _ = agent;
    /// ```
    pub fn with_dynamic_instructions<F>(mut self, f: F) -> Self
    where
        F: Fn(&RunContext, &Agent) -> String + Send + Sync + 'static,
    {
        self.config.instructions = Instructions::Computed(Arc::new(f));
        self
    }

    pub fn with_handoff_description(mut self, description: impl Into<String>) -> Self {
        self.config.handoff_description = Some(description.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn with_model_settings(mut self, settings: ModelSettings) -> Self {
        self.config.model_settings = settings;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.model_settings.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.model_settings.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.config.max_turns = Some(max_turns);
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.config.tools.push(tool);
        self
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.config.tools.extend(tools);
        self
    }

    pub fn with_handoff(mut self, handoff: Handoff) -> Self {
        self.config.handoffs.push(handoff);
        self
    }

    pub fn with_handoffs(mut self, handoffs: Vec<Handoff>) -> Self {
        self.config.handoffs.extend(handoffs);
        self
    }

    pub fn with_input_guardrail(mut self, guardrail: Arc<dyn InputGuardrail>) -> Self {
        self.config.input_guardrails.push(guardrail);
        self
    }

    pub fn with_output_guardrail(mut self, guardrail: Arc<dyn OutputGuardrail>) -> Self {
        self.config.output_guardrails.push(guardrail);
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.config.output_schema = Some(schema);
        self
    }

    pub fn with_tool_use_policy(mut self, policy: ToolUsePolicy) -> Self {
        self.config.tool_use_policy = policy;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn AgentHooks>) -> Self {
        self.config.hooks = Some(hooks);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.config.tools
    }

    pub fn handoffs(&self) -> &[Handoff] {
        &self.config.handoffs
    }

    pub fn has_tools(&self) -> bool {
        !self.config.tools.is_empty()
    }

    pub fn has_handoffs(&self) -> bool {
        !self.config.handoffs.is_empty()
    }

    /// The effective instruction text for this turn.
    pub fn resolve_instructions(&self, ctx: &RunContext) -> String {
        match &self.config.instructions {
            Instructions::Static(text) => text.clone(),
            Instructions::Computed(f) => f(ctx, self),
        }
    }

    /// Tools currently enabled for this turn.
    pub fn enabled_tools(&self, ctx: &RunContext) -> Vec<Arc<dyn Tool>> {
        self.config
            .tools
            .iter()
            .filter(|t| t.is_enabled(ctx))
            .cloned()
            .collect()
    }

    /// Handoffs currently enabled for this turn.
    pub fn enabled_handoffs(&self, ctx: &RunContext) -> Vec<&Handoff> {
        self.config
            .handoffs
            .iter()
            .filter(|h| h.is_enabled(ctx))
            .collect()
    }

    /// Checks configuration invariants: tool and handoff names must be
    /// unique within the agent. Violations are caller mistakes and fail
    /// the run immediately.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for tool in &self.config.tools {
            if !seen.insert(tool.name().to_string()) {
                return Err(AgentError::UserError {
                    message: format!(
                        "agent '{}' declares tool '{}' more than once",
                        self.config.name,
                        tool.name()
                    ),
                });
            }
        }
        for handoff in &self.config.handoffs {
            if !seen.insert(handoff.name.clone()) {
                return Err(AgentError::UserError {
                    message: format!(
                        "agent '{}' declares duplicate action name '{}'",
                        self.config.name, handoff.name
                    ),
                });
            }
        }
        Ok(())
    }

    /// Builds the system message for a turn: resolved instructions plus
    /// the currently enabled tools and handoff targets.
    pub fn build_system_message(&self, ctx: &RunContext) -> Message {
        let mut content = self.resolve_instructions(ctx);

        let tools = self.enabled_tools(ctx);
        if !tools.is_empty() {
            content.push_str("\n\nYou have access to the following tools:\n");
            for tool in &tools {
                content.push_str(&format!("- {}: {}\n", tool.name(), tool.description()));
            }
        }

        let handoffs = self.enabled_handoffs(ctx);
        if !handoffs.is_empty() {
            content.push_str("\n\nYou can hand off to the following agents:\n");
            for handoff in &handoffs {
                content.push_str(&format!("- {}: {}\n", handoff.name, handoff.description));
            }
        }

        Message::system(content)
    }

    /// Exposes this agent as a tool that runs it on the supplied input as
    /// a nested run and returns the final output.
    pub fn as_tool(
        &self,
        tool_name: impl Into<String>,
        tool_description: impl Into<String>,
        config: crate::runner::RunConfig,
    ) -> AgentTool {
        AgentTool {
            name: tool_name.into(),
            description: tool_description.into(),
            agent: self.clone(),
            config,
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.config.name)
            .field("model", &self.config.model)
            .field("tools_count", &self.config.tools.len())
            .field("handoffs_count", &self.config.handoffs.len())
            .finish()
    }
}
