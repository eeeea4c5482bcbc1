//! # Runner (orientation)
//!
//! The `Runner` drives one end-to-end task as a sequential state machine:
//! input guardrails, then repeated model turns classified into a tool
//! batch, a handoff, or the final output, then output guardrails. Exactly
//! one model call, tool batch, or handoff transition is in flight at a
//! time; cancellation is checked at every transition boundary.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::agent::{Agent, ToolUsePolicy};
use crate::context::RunContext;
use crate::error::{AgentError, Result};
use crate::guardrail::GuardrailRunner;
use crate::handoff::{Handoff, HandoffTool};
use crate::hooks::RunHooks;
use crate::items::{
    HandoffItem, Message, ModelResponse, Role, RunItem, ToolCall, ToolCallItem, ToolOutputItem,
};
use crate::memory::Session;
use crate::model::{ModelProvider, OpenAIProvider};
use crate::result::RunResult;
use crate::tool::{validate_arguments, Tool};
use crate::usage::UsageStats;

fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() > max {
        let mut out = s.chars().take(max).collect::<String>();
        out.push('…');
        out
    } else {
        s.to_string()
    }
}

fn format_messages_for_log(messages: &[Message]) -> String {
    messages
        .iter()
        .enumerate()
        .map(|(idx, m)| {
            let role = match m.role {
                Role::System => "SYSTEM",
                Role::User => "USER",
                Role::Assistant => "ASSIST",
                Role::Tool => "TOOL",
            };
            format!("{:02} {:6} | {}", idx, role, truncate_for_log(&m.content, 160))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// History transform applied to the conversation forwarded at a handoff.
pub type HandoffInputFilter = Arc<dyn Fn(Vec<Message>) -> Vec<Message> + Send + Sync>;

/// Configuration for an agent run.
///
/// ## Example
///
/// ```rust,no_run
/// use agent_relay::runner::RunConfig;
/// use agent_relay::sqlite_session::SqliteSession;
/// use std::sync::Arc;
///
/// # async fn config() -> Result<(), Box<dyn std::error::Error>> {
/// let session = Arc::new(SqliteSession::new("user_123", "conversations.db").await?);
///
/// let config = RunConfig::default()
///     .with_max_turns(5)
///     .with_session(session);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RunConfig {
    /// Maximum number of model round-trips before the run is aborted with
    /// a turn-limit error. Falls back to the agent's own `max_turns`, then
    /// to 10.
    pub max_turns: Option<usize>,

    /// Session store for persistent conversation history. History is
    /// loaded before the first turn and the run's items are appended after
    /// a successful run.
    pub session: Option<Arc<dyn Session>>,

    /// Model backend. Defaults to an [`OpenAIProvider`] for the agent's
    /// configured model.
    pub model_provider: Option<Arc<dyn ModelProvider>>,

    /// Whether tool calls within a single turn execute concurrently.
    /// Outputs are appended in request order either way.
    pub parallel_tools: bool,

    /// Bound on concurrent tool calls when `parallel_tools` is true.
    pub max_concurrency: Option<usize>,

    /// Per-model-call timeout. Expiry terminates the run.
    pub model_timeout: Option<Duration>,

    /// Per-tool-invocation timeout. Expiry is a recoverable per-step
    /// failure: the timeout is recorded as that tool's error output and
    /// the loop continues.
    pub tool_timeout: Option<Duration>,

    /// Cooperative cancellation signal, checked at every state-machine
    /// transition boundary.
    pub cancellation: Option<CancellationToken>,

    /// Run-scoped lifecycle subscriber.
    pub hooks: Option<Arc<dyn RunHooks>>,

    /// History filter applied at every handoff in this run, before any
    /// per-handoff filter.
    pub handoff_input_filter: Option<HandoffInputFilter>,

    /// Label attached to this run's log events.
    pub workflow_name: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_turns: None,
            session: None,
            model_provider: None,
            parallel_tools: true,
            max_concurrency: None,
            model_timeout: None,
            tool_timeout: None,
            cancellation: None,
            hooks: None,
            handoff_input_filter: None,
            workflow_name: None,
        }
    }
}

impl std::fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunConfig")
            .field("max_turns", &self.max_turns)
            .field("session", &self.session.is_some())
            .field("model_provider", &self.model_provider.is_some())
            .field("parallel_tools", &self.parallel_tools)
            .field("workflow_name", &self.workflow_name)
            .finish()
    }
}

impl RunConfig {
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    pub fn with_session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_model_provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.model_provider = Some(provider);
        self
    }

    pub fn with_parallel_tools(mut self, enabled: bool) -> Self {
        self.parallel_tools = enabled;
        self
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit.max(1));
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = Some(timeout);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn RunHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn with_handoff_input_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(Vec<Message>) -> Vec<Message> + Send + Sync + 'static,
    {
        self.handoff_input_filter = Some(Arc::new(filter));
        self
    }

    pub fn with_workflow_name(mut self, name: impl Into<String>) -> Self {
        self.workflow_name = Some(name.into());
        self
    }

    fn ensure_live(&self) -> Result<()> {
        match &self.cancellation {
            Some(token) if token.is_cancelled() => Err(AgentError::RunCancelled),
            _ => Ok(()),
        }
    }
}

/// The model's next action, decoded from one response. Handoffs are
/// tool-shaped on the wire, so they are checked before plain tool calls.
enum Action {
    FinalText(String),
    ToolCalls(Vec<ToolCall>),
    Handoff { handoff: Handoff, call: ToolCall },
}

fn classify_response(response: &ModelResponse, handoffs: &[Handoff]) -> Result<Action> {
    if response.has_tool_calls() {
        for call in &response.tool_calls {
            if let Some(handoff) = handoffs.iter().find(|h| h.name == call.name) {
                return Ok(Action::Handoff {
                    handoff: handoff.clone(),
                    call: call.clone(),
                });
            }
        }
        return Ok(Action::ToolCalls(response.tool_calls.clone()));
    }

    match response.content.as_deref() {
        Some(content) if !content.is_empty() => Ok(Action::FinalText(content.to_string())),
        _ => Err(AgentError::ModelBehaviorError {
            message: "model returned neither content nor tool calls".to_string(),
        }),
    }
}

/// Outcome of one tool invocation, recoverable either way.
struct ToolOutcome {
    output: serde_json::Value,
    error: Option<String>,
}

impl ToolOutcome {
    fn history_content(&self) -> String {
        match &self.error {
            Some(error) => format!("Error: {}", error),
            None => serde_json::to_string(&self.output).unwrap_or_else(|_| "null".to_string()),
        }
    }

    fn final_value(&self) -> serde_json::Value {
        match &self.error {
            Some(error) => serde_json::Value::String(format!("Error: {}", error)),
            None => self.output.clone(),
        }
    }
}

/// Executes agents.
///
/// `Runner` is stateless; its methods drive one run each and can be used
/// from many tasks concurrently.
///
/// ## Example
///
/// ```rust,no_run
/// use agent_relay::{Agent, Runner, context::RunContext, runner::RunConfig};
///
/// # async fn run_agent() -> Result<(), Box<dyn std::error::Error>> {
/// let agent = Agent::simple("EchoAgent", "You echo the user's input.");
///
/// let result = Runner::run(
///     agent,
///     "Hello, world!",
///     RunContext::empty(),
///     RunConfig::default(),
/// )
/// .await?;
///
/// println!("{:?}", result.final_output);
/// # Ok(())
/// # }
/// ```
pub struct Runner;

impl Runner {
    /// Runs `agent` on `input` to completion.
    ///
    /// The context is threaded through every tool, guardrail, instruction
    /// function, and hook for the duration of the run. Returns the
    /// [`RunResult`] on success or the first fatal error.
    pub async fn run(
        agent: Agent,
        input: impl Into<String>,
        context: RunContext,
        config: RunConfig,
    ) -> Result<RunResult> {
        let input = input.into();
        agent.validate()?;
        config.ensure_live()?;

        info!(
            agent = %agent.name(),
            workflow = config.workflow_name.as_deref().unwrap_or("default"),
            "starting agent run"
        );

        // START: input guardrails gate everything else.
        if !agent.config.input_guardrails.is_empty() {
            GuardrailRunner::check_input(&agent.config.input_guardrails, &context, &input).await?;
        }

        let mut history = match &config.session {
            Some(session) => session.history().await?,
            None => Vec::new(),
        };
        history.push(Message::user(&input));

        let mut items = vec![RunItem::message(Role::User, &input)];

        let result = Self::run_loop(agent, &mut history, &mut items, &context, &config).await?;

        if let Some(session) = &config.session {
            session.append(result.items.clone()).await?;
        }

        Ok(result)
    }

    /// Blocking wrapper around [`run`](Self::run) for callers without an
    /// async runtime; creates a runtime for the duration of the run.
    pub fn run_sync(
        agent: Agent,
        input: impl Into<String>,
        context: RunContext,
        config: RunConfig,
    ) -> Result<RunResult> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(Self::run(agent, input, context, config))
    }

    async fn run_loop(
        mut agent: Agent,
        history: &mut Vec<Message>,
        items: &mut Vec<RunItem>,
        ctx: &RunContext,
        config: &RunConfig,
    ) -> Result<RunResult> {
        let mut usage = UsageStats::new();
        let mut turn_count = 0usize;
        let max_turns = config.max_turns.or(agent.config.max_turns).unwrap_or(10);

        let provider: Arc<dyn ModelProvider> = match &config.model_provider {
            Some(provider) => provider.clone(),
            None => Arc::new(OpenAIProvider::new(&agent.config.model)),
        };

        Self::notify_agent_active(ctx, &agent, config).await?;

        loop {
            config.ensure_live()?;
            turn_count += 1;
            if turn_count > max_turns {
                return Err(AgentError::MaxTurnsExceeded { max_turns });
            }

            debug!(turn = turn_count, agent = %agent.name(), "starting turn");

            // Enablement predicates are re-evaluated every turn.
            let tools = agent.enabled_tools(ctx);
            let handoffs: Vec<Handoff> = agent
                .enabled_handoffs(ctx)
                .into_iter()
                .cloned()
                .collect();

            let mut advertised = tools.clone();
            for handoff in &handoffs {
                advertised.push(Arc::new(HandoffTool::from(handoff.clone())) as Arc<dyn Tool>);
            }

            let system = agent.build_system_message(ctx);
            if let Some(hooks) = &config.hooks {
                hooks
                    .on_llm_start(ctx, &agent, &system.content, history)
                    .await?;
            }

            let mut request = Vec::with_capacity(history.len() + 1);
            request.push(system);
            request.extend(history.iter().cloned());

            debug!(
                target: "runner::messages",
                "\n=== sending to provider (model: {}) ===\n{}\n=== end ===",
                agent.config.model,
                format_messages_for_log(&request)
            );

            let completion = provider.complete(request, advertised, &agent.config.model_settings);
            let (response, call_usage) = match config.model_timeout {
                Some(timeout) => tokio::time::timeout(timeout, completion)
                    .await
                    .map_err(|_| AgentError::StepTimeout {
                        operation: "model call".to_string(),
                        timeout,
                    })??,
                None => completion.await?,
            };

            usage.record(agent.name(), call_usage);
            if let Some(hooks) = &config.hooks {
                hooks.on_llm_end(ctx, &agent, &response).await?;
            }

            match classify_response(&response, &handoffs)? {
                Action::FinalText(text) => {
                    history.push(Message::assistant(&text));
                    items.push(RunItem::message(Role::Assistant, &text));

                    let final_value = Self::coerce_final_output(&agent, text)?;
                    return Self::finish(agent, final_value, items, usage, ctx, config).await;
                }

                Action::Handoff { handoff, call } => {
                    config.ensure_live()?;
                    agent = Self::apply_handoff(agent, handoff, call, history, items, ctx, config)
                        .await?;
                }

                Action::ToolCalls(calls) => {
                    config.ensure_live()?;

                    history.push(Message::assistant_with_tool_calls(
                        response.content.clone().unwrap_or_default(),
                        calls.clone(),
                    ));
                    if response.has_content() {
                        items.push(RunItem::message(
                            Role::Assistant,
                            response.content.clone().unwrap_or_default(),
                        ));
                    }
                    for call in &calls {
                        items.push(RunItem::ToolCall(ToolCallItem {
                            id: call.id.clone(),
                            tool_name: call.name.clone(),
                            arguments: call.arguments.clone(),
                            created_at: chrono::Utc::now(),
                        }));
                    }

                    let outcomes =
                        Self::execute_tool_calls(&agent, &tools, &calls, ctx, config).await?;

                    for (call, outcome) in calls.iter().zip(&outcomes) {
                        history.push(Message::tool(outcome.history_content(), &call.id));
                        items.push(RunItem::ToolOutput(ToolOutputItem {
                            id: uuid::Uuid::new_v4().to_string(),
                            tool_call_id: call.id.clone(),
                            output: outcome.output.clone(),
                            error: outcome.error.clone(),
                            created_at: chrono::Utc::now(),
                        }));
                    }

                    debug!(
                        target: "runner::messages",
                        "\n↳ appended {} tool replies\n{}\n---",
                        outcomes.len(),
                        format_messages_for_log(history)
                    );

                    if let Some(outcome) = Self::stop_outcome(&agent, &calls, &outcomes) {
                        return Self::finish(
                            agent,
                            outcome.final_value(),
                            items,
                            usage,
                            ctx,
                            config,
                        )
                        .await;
                    }
                }
            }
        }
    }

    /// Fires the hooks that mark an agent becoming active.
    async fn notify_agent_active(ctx: &RunContext, agent: &Agent, config: &RunConfig) -> Result<()> {
        if let Some(hooks) = &config.hooks {
            hooks.on_agent_start(ctx, agent).await?;
        }
        if let Some(hooks) = &agent.config.hooks {
            hooks.on_start(ctx, agent).await?;
        }
        Ok(())
    }

    /// FINAL_OUTPUT: output guardrails, completion hooks, result assembly.
    async fn finish(
        agent: Agent,
        final_value: serde_json::Value,
        items: &mut Vec<RunItem>,
        usage: UsageStats,
        ctx: &RunContext,
        config: &RunConfig,
    ) -> Result<RunResult> {
        if !agent.config.output_guardrails.is_empty() {
            let candidate = match &final_value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            GuardrailRunner::check_output(&agent.config.output_guardrails, ctx, &candidate).await?;
        }

        if let Some(hooks) = &agent.config.hooks {
            hooks.on_end(ctx, &agent, &final_value).await?;
        }
        if let Some(hooks) = &config.hooks {
            hooks.on_agent_end(ctx, &agent, &final_value).await?;
        }

        info!(agent = %agent.name(), usage = %usage.summary(), "run complete");

        Ok(RunResult::new(
            final_value,
            std::mem::take(items),
            agent.name().to_string(),
            usage,
        ))
    }

    /// Parses and validates the final text against the agent's output
    /// schema, when one is declared.
    fn coerce_final_output(agent: &Agent, text: String) -> Result<serde_json::Value> {
        let Some(schema) = &agent.config.output_schema else {
            return Ok(serde_json::Value::String(text));
        };

        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| AgentError::ModelBehaviorError {
                message: format!("final output is not valid JSON for the declared schema: {e}"),
            })?;
        validate_arguments(schema, &value).map_err(|e| AgentError::ModelBehaviorError {
            message: format!("final output violates the declared schema: {e}"),
        })?;
        Ok(value)
    }

    /// HANDOFF: validates the payload, filters forwarded history, fires
    /// the callback and hooks, and returns the new active agent.
    async fn apply_handoff(
        current: Agent,
        handoff: Handoff,
        call: ToolCall,
        history: &mut Vec<Message>,
        items: &mut Vec<RunItem>,
        ctx: &RunContext,
        config: &RunConfig,
    ) -> Result<Agent> {
        info!(from = %current.name(), to = %handoff.name, "handoff");

        let payload = call.arguments.clone();
        if let Some(schema) = &handoff.input_schema {
            validate_arguments(schema, &payload).map_err(|e| AgentError::ModelBehaviorError {
                message: format!("handoff '{}' payload invalid: {e}", handoff.name),
            })?;
        }

        items.push(RunItem::ToolCall(ToolCallItem {
            id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: payload.clone(),
            created_at: chrono::Utc::now(),
        }));
        items.push(RunItem::Handoff(HandoffItem {
            id: uuid::Uuid::new_v4().to_string(),
            from_agent: current.name().to_string(),
            to_agent: handoff.agent().name().to_string(),
            payload: payload.clone(),
            created_at: chrono::Utc::now(),
        }));

        // Close out the tool-shaped call in history before the transition.
        history.push(Message::assistant_with_tool_calls("", vec![call.clone()]));
        let ack = serde_json::json!({ "handoff": handoff.name, "ack": true });
        history.push(Message::tool(ack.to_string(), &call.id));
        items.push(RunItem::ToolOutput(ToolOutputItem {
            id: uuid::Uuid::new_v4().to_string(),
            tool_call_id: call.id.clone(),
            output: ack,
            error: None,
            created_at: chrono::Utc::now(),
        }));

        // Run-level filter first, then the handoff's own.
        let mut forwarded = std::mem::take(history);
        if let Some(filter) = &config.handoff_input_filter {
            forwarded = filter(forwarded);
        }
        *history = handoff.filter_history(forwarded);

        if let Some(callback) = &handoff.on_handoff {
            callback(ctx, &payload);
        }

        let next = handoff.agent().clone();
        next.validate()?;

        // Both agents' subscribers hear about the transition before the
        // new agent's first model call.
        if let Some(hooks) = &current.config.hooks {
            hooks.on_handoff(ctx, &next, &current).await?;
        }
        if let Some(hooks) = &next.config.hooks {
            hooks.on_handoff(ctx, &next, &current).await?;
        }
        if let Some(hooks) = &config.hooks {
            hooks.on_handoff(ctx, &current, &next).await?;
        }

        Self::notify_agent_active(ctx, &next, config).await?;

        Ok(next)
    }

    /// TOOL_CALL: runs a turn's tool calls, sequentially or concurrently,
    /// returning outcomes in request order.
    async fn execute_tool_calls(
        agent: &Agent,
        enabled_tools: &[Arc<dyn Tool>],
        calls: &[ToolCall],
        ctx: &RunContext,
        config: &RunConfig,
    ) -> Result<Vec<ToolOutcome>> {
        if config.parallel_tools && calls.len() > 1 {
            let semaphore = config
                .max_concurrency
                .map(|n| tokio::sync::Semaphore::new(n));

            let futures: Vec<_> = calls
                .iter()
                .map(|call| {
                    let semaphore = semaphore.as_ref();
                    async move {
                        let _permit = match semaphore {
                            Some(sem) => Some(sem.acquire().await.map_err(|_| {
                                AgentError::Other("tool concurrency limiter closed".to_string())
                            })?),
                            None => None,
                        };
                        Self::dispatch_tool_call(agent, enabled_tools, call, ctx, config).await
                    }
                })
                .collect();

            // join_all preserves request order regardless of completion order.
            join_all(futures).await.into_iter().collect()
        } else {
            let mut outcomes = Vec::with_capacity(calls.len());
            for call in calls {
                outcomes
                    .push(Self::dispatch_tool_call(agent, enabled_tools, call, ctx, config).await?);
            }
            Ok(outcomes)
        }
    }

    /// Invokes a single tool call: enablement and argument validation,
    /// execution with optional timeout, failure-handler recovery. Only an
    /// unrecovered execution error is fatal.
    async fn dispatch_tool_call(
        agent: &Agent,
        enabled_tools: &[Arc<dyn Tool>],
        call: &ToolCall,
        ctx: &RunContext,
        config: &RunConfig,
    ) -> Result<ToolOutcome> {
        let Some(tool) = enabled_tools.iter().find(|t| t.name() == call.name) else {
            debug!(tool = %call.name, "unknown or disabled tool requested");
            return Ok(ToolOutcome {
                output: serde_json::Value::Null,
                error: Some(format!("Unknown tool '{}'", call.name)),
            });
        };

        if let Err(reason) = validate_arguments(&tool.parameters_schema(), &call.arguments) {
            return Ok(ToolOutcome {
                output: serde_json::Value::Null,
                error: Some(format!("Invalid arguments for '{}': {}", call.name, reason)),
            });
        }

        if let Some(hooks) = &agent.config.hooks {
            hooks.on_tool_start(ctx, agent, tool.as_ref()).await?;
        }
        if let Some(hooks) = &config.hooks {
            hooks.on_tool_start(ctx, agent, tool.as_ref()).await?;
        }

        debug!(tool = %call.name, "executing tool");
        let execution = tool.execute(ctx, call.arguments.clone());
        let executed = match config.tool_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, execution).await {
                Ok(result) => result,
                Err(_) => {
                    return Ok(ToolOutcome {
                        output: serde_json::Value::Null,
                        error: Some(format!(
                            "Tool '{}' timed out after {:?}",
                            call.name, timeout
                        )),
                    })
                }
            },
            None => execution.await,
        };

        let outcome = match executed {
            Ok(result) => ToolOutcome {
                output: result.output,
                error: result.error,
            },
            Err(error) => match tool.failure_message(&error) {
                Some(message) => ToolOutcome {
                    output: serde_json::Value::String(message),
                    error: None,
                },
                None => {
                    return Err(AgentError::ToolExecutionError {
                        tool: call.name.clone(),
                        message: error.to_string(),
                    })
                }
            },
        };

        let result_value = match &outcome.error {
            Some(error) => serde_json::Value::String(format!("Error: {}", error)),
            None => outcome.output.clone(),
        };
        if let Some(hooks) = &agent.config.hooks {
            hooks
                .on_tool_end(ctx, agent, tool.as_ref(), &result_value)
                .await?;
        }
        if let Some(hooks) = &config.hooks {
            hooks
                .on_tool_end(ctx, agent, tool.as_ref(), &result_value)
                .await?;
        }

        Ok(outcome)
    }

    /// Applies the agent's tool-use policy to a completed tool batch.
    /// Returns the outcome whose output becomes the final output, if any.
    fn stop_outcome<'a>(
        agent: &Agent,
        calls: &[ToolCall],
        outcomes: &'a [ToolOutcome],
    ) -> Option<&'a ToolOutcome> {
        match &agent.config.tool_use_policy {
            ToolUsePolicy::ContinueLoop => None,
            ToolUsePolicy::StopAtFirstTool => outcomes.first(),
            ToolUsePolicy::StopAtNamedTool(name) => calls
                .iter()
                .position(|call| &call.name == name)
                .and_then(|idx| outcomes.get(idx)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MockProvider;
    use crate::tool::FunctionTool;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn mock_config(provider: MockProvider) -> RunConfig {
        RunConfig::default().with_model_provider(Arc::new(provider))
    }

    #[tokio::test]
    async fn test_simple_run() {
        let agent = Agent::simple("TestAgent", "You are a test agent");
        let config = mock_config(MockProvider::new("mock").with_message("Hello! How can I help?"));

        let result = Runner::run(agent, "Hi", RunContext::empty(), config)
            .await
            .unwrap();

        assert_eq!(result.final_agent, "TestAgent");
        assert_eq!(result.final_text(), Some("Hello! How can I help?"));
        assert_eq!(result.usage.total.request_count, 1);
    }

    #[test]
    fn test_run_sync() {
        let agent = Agent::simple("SyncAgent", "Sync test agent");
        let config = mock_config(MockProvider::new("mock").with_message("Sync response"));

        let result = Runner::run_sync(agent, "Test", RunContext::empty(), config).unwrap();
        assert_eq!(result.final_output, serde_json::json!("Sync response"));
    }

    #[tokio::test]
    async fn test_tool_call_then_final() {
        let tool = Arc::new(FunctionTool::simple("uppercase", "Uppercases", |s: String| {
            s.to_uppercase()
        }));
        let agent = Agent::simple("ToolAgent", "Use tools").with_tool(tool);

        let config = mock_config(
            MockProvider::new("mock")
                .with_tool_call("uppercase", serde_json::json!({"input": "hello"}))
                .with_message("The result is: HELLO"),
        );

        let result = Runner::run(agent, "shout hello", RunContext::empty(), config)
            .await
            .unwrap();

        assert_eq!(result.final_text(), Some("The result is: HELLO"));
        assert!(result
            .items
            .iter()
            .any(|i| matches!(i, RunItem::ToolCall(_))));
        let outputs = crate::items::ItemHelpers::tool_outputs(&result.items);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].output, serde_json::json!("HELLO"));
    }

    #[tokio::test]
    async fn test_stop_at_first_tool() {
        let tool = Arc::new(FunctionTool::simple("uppercase", "Uppercases", |s: String| {
            s.to_uppercase()
        }));
        let agent = Agent::simple("StopAgent", "Use tools")
            .with_tool(tool)
            .with_tool_use_policy(ToolUsePolicy::StopAtFirstTool);

        // No follow-up message: the run must not go back to the model.
        let config = mock_config(
            MockProvider::new("mock")
                .with_tool_call("uppercase", serde_json::json!({"input": "hello"})),
        );

        let result = Runner::run(agent, "shout", RunContext::empty(), config)
            .await
            .unwrap();

        assert_eq!(result.final_output, serde_json::json!("HELLO"));
        assert_eq!(result.usage.total.request_count, 1);
    }

    #[tokio::test]
    async fn test_stop_at_named_tool() {
        let shout = Arc::new(FunctionTool::simple("shout", "Uppercases", |s: String| {
            s.to_uppercase()
        }));
        let today = Arc::new(FunctionTool::simple("today", "Current day", |_s: String| {
            "Monday".to_string()
        }));
        let agent = Agent::simple("NamedStop", "Use tools")
            .with_tools(vec![shout, today])
            .with_tool_use_policy(ToolUsePolicy::StopAtNamedTool("today".to_string()));

        let config = mock_config(
            MockProvider::new("mock")
                .with_tool_call("shout", serde_json::json!({"input": "hey"}))
                .with_tool_call("today", serde_json::json!({"input": ""}))
                .with_message("never reached"),
        );

        let result = Runner::run(agent, "what day is it?", RunContext::empty(), config)
            .await
            .unwrap();

        // First turn's tool is not the named one, so the loop continued;
        // the second turn's tool stops the run with its output.
        assert_eq!(result.final_output, serde_json::json!("Monday"));
        assert_eq!(result.usage.total.request_count, 2);
    }

    #[tokio::test]
    async fn test_max_turns_exceeded() {
        let tool = Arc::new(FunctionTool::simple("noop", "No-op", |s: String| s));
        let agent = Agent::simple("Loopy", "Loop forever").with_tool(tool);

        let provider = MockProvider::new("mock")
            .with_tool_call("noop", serde_json::json!({"input": "a"}))
            .with_tool_call("noop", serde_json::json!({"input": "b"}))
            .with_tool_call("noop", serde_json::json!({"input": "c"}));
        let config = mock_config(provider).with_max_turns(2);

        let err = Runner::run(agent, "go", RunContext::empty(), config)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::MaxTurnsExceeded { max_turns: 2 }));
    }

    #[tokio::test]
    async fn test_turn_limit_not_hit_early() {
        // Exactly max_turns round-trips must be allowed.
        let tool = Arc::new(FunctionTool::simple("noop", "No-op", |s: String| s));
        let agent = Agent::simple("Exact", "Use tools").with_tool(tool);

        let provider = MockProvider::new("mock")
            .with_tool_call("noop", serde_json::json!({"input": "a"}))
            .with_message("done");
        let config = mock_config(provider).with_max_turns(2);

        let result = Runner::run(agent, "go", RunContext::empty(), config)
            .await
            .unwrap();
        assert_eq!(result.final_text(), Some("done"));
    }

    #[tokio::test]
    async fn test_input_guardrail_blocks_before_any_tool_runs() {
        use crate::guardrail::{FnInputGuardrail, GuardrailResult};

        let side_effects = Arc::new(AtomicUsize::new(0));
        let counter = side_effects.clone();
        let tool = Arc::new(FunctionTool::simple("tracked", "Tracks calls", move |s| {
            counter.fetch_add(1, Ordering::SeqCst);
            s
        }));

        let agent = Agent::simple("Guarded", "Use tools")
            .with_tool(tool)
            .with_input_guardrail(Arc::new(FnInputGuardrail::new(
                "always_block",
                |_ctx, _input| async move {
                    Ok(GuardrailResult::trip(serde_json::json!("blocked")))
                },
            )));

        let config = mock_config(
            MockProvider::new("mock")
                .with_tool_call("tracked", serde_json::json!({"input": "x"})),
        );

        let err = Runner::run(agent, "anything", RunContext::empty(), config)
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::InputGuardrailTriggered { .. }));
        assert_eq!(side_effects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_output_guardrail_rejects() {
        use crate::guardrail::PatternBlockGuardrail;

        let agent = Agent::simple("Support", "Be helpful").with_output_guardrail(Arc::new(
            PatternBlockGuardrail::new("refund_filter", vec!["refund".to_string()]),
        ));

        let config = mock_config(MockProvider::new("mock").with_message("Your refund is approved"));

        let err = Runner::run(agent, "can I get my money back?", RunContext::empty(), config)
            .await
            .unwrap_err();
        match err {
            AgentError::OutputGuardrailTriggered { info } => {
                assert_eq!(info["blocked_pattern"], "refund");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_parallel_tool_calls_preserve_request_order() {
        let slow = Arc::new(FunctionTool::simple("slow", "Slow tool", |s: String| {
            std::thread::sleep(Duration::from_millis(20));
            format!("slow:{s}")
        }));
        let fast = Arc::new(FunctionTool::simple("fast", "Fast tool", |s: String| {
            format!("fast:{s}")
        }));
        let agent = Agent::simple("Ordered", "Use tools").with_tools(vec![slow, fast]);

        let calls = vec![
            ToolCall {
                id: "c1".to_string(),
                name: "slow".to_string(),
                arguments: serde_json::json!({"input": "a"}),
            },
            ToolCall {
                id: "c2".to_string(),
                name: "fast".to_string(),
                arguments: serde_json::json!({"input": "b"}),
            },
        ];
        let provider = MockProvider::new("mock")
            .with_response(ModelResponse::new_tool_calls(calls))
            .with_message("ok");

        let result = Runner::run(agent, "go", RunContext::empty(), mock_config(provider))
            .await
            .unwrap();

        let outputs: Vec<_> = crate::items::ItemHelpers::tool_outputs(&result.items)
            .iter()
            .map(|o| o.output.clone())
            .collect();
        assert_eq!(
            outputs,
            vec![serde_json::json!("slow:a"), serde_json::json!("fast:b")]
        );
    }

    #[tokio::test]
    async fn test_sequential_execution_order() {
        let tool = Arc::new(FunctionTool::simple("echo", "Echoes", |s: String| s));
        let agent = Agent::simple("Seq", "Use tools").with_tool(tool);

        let calls = vec![
            ToolCall {
                id: "c1".to_string(),
                name: "echo".to_string(),
                arguments: serde_json::json!({"input": "first"}),
            },
            ToolCall {
                id: "c2".to_string(),
                name: "echo".to_string(),
                arguments: serde_json::json!({"input": "second"}),
            },
        ];
        let provider = MockProvider::new("mock")
            .with_response(ModelResponse::new_tool_calls(calls))
            .with_message("ok");
        let config = mock_config(provider).with_parallel_tools(false);

        let result = Runner::run(agent, "go", RunContext::empty(), config)
            .await
            .unwrap();

        let outputs: Vec<_> = crate::items::ItemHelpers::tool_outputs(&result.items)
            .iter()
            .map(|o| o.output.clone())
            .collect();
        assert_eq!(
            outputs,
            vec![serde_json::json!("first"), serde_json::json!("second")]
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_recoverable() {
        let tool = Arc::new(FunctionTool::simple("known", "Known tool", |s: String| s));
        let agent = Agent::simple("Mixed", "Use tools").with_tool(tool);

        let calls = vec![
            ToolCall {
                id: "c1".to_string(),
                name: "known".to_string(),
                arguments: serde_json::json!({"input": "a"}),
            },
            ToolCall {
                id: "c2".to_string(),
                name: "nonexistent".to_string(),
                arguments: serde_json::json!({}),
            },
        ];
        let provider = MockProvider::new("mock")
            .with_response(ModelResponse::new_tool_calls(calls))
            .with_message("ok");

        let result = Runner::run(agent, "go", RunContext::empty(), mock_config(provider))
            .await
            .unwrap();

        let outputs = crate::items::ItemHelpers::tool_outputs(&result.items);
        assert_eq!(outputs.len(), 2);
        assert!(outputs[0].error.is_none());
        assert!(outputs[1].error.as_deref().unwrap().contains("nonexistent"));
        assert_eq!(result.final_text(), Some("ok"));
    }

    #[tokio::test]
    async fn test_argument_validation_failure_is_structured() {
        let tool = Arc::new(FunctionTool::new(
            "add",
            "Adds two numbers",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "num1": {"type": "integer"},
                    "num2": {"type": "integer"}
                },
                "required": ["num1", "num2"]
            }),
            |args| {
                let a = args["num1"].as_i64().unwrap_or_default();
                let b = args["num2"].as_i64().unwrap_or_default();
                Ok(serde_json::json!(a + b))
            },
        ));
        let agent = Agent::simple("Calc", "Use tools").with_tool(tool);

        let provider = MockProvider::new("mock")
            .with_tool_call("add", serde_json::json!({"num1": 2}))
            .with_message("I could not add those");

        let result = Runner::run(agent, "add", RunContext::empty(), mock_config(provider))
            .await
            .unwrap();

        let outputs = crate::items::ItemHelpers::tool_outputs(&result.items);
        assert!(outputs[0].error.as_deref().unwrap().contains("num2"));
        assert_eq!(result.final_text(), Some("I could not add those"));
    }

    #[tokio::test]
    async fn test_tool_add_two_plus_two() {
        let tool = Arc::new(FunctionTool::new(
            "add",
            "Adds two numbers",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "num1": {"type": "integer"},
                    "num2": {"type": "integer"}
                },
                "required": ["num1", "num2"]
            }),
            |args| {
                let a = args["num1"].as_i64().unwrap_or_default();
                let b = args["num2"].as_i64().unwrap_or_default();
                Ok(serde_json::json!(a + b))
            },
        ));
        let agent = Agent::simple("Calc", "Use tools").with_tool(tool);

        let provider = MockProvider::new("mock")
            .with_tool_call("add", serde_json::json!({"num1": 2, "num2": 2}))
            .with_message("2 + 2 = 4");

        let result = Runner::run(agent, "what is 2+2?", RunContext::empty(), mock_config(provider))
            .await
            .unwrap();

        let outputs = crate::items::ItemHelpers::tool_outputs(&result.items);
        assert_eq!(outputs[0].output, serde_json::json!(4));
        assert_eq!(result.final_text(), Some("2 + 2 = 4"));
        assert_eq!(result.usage.total.request_count, 2);
    }

    #[tokio::test]
    async fn test_tool_failure_handler_recovers() {
        let tool = Arc::new(
            FunctionTool::new(
                "flaky",
                "Always fails",
                serde_json::json!({"type": "object"}),
                |_args| {
                    Err(AgentError::ToolExecutionError {
                        tool: "flaky".to_string(),
                        message: "backend down".to_string(),
                    })
                },
            )
            .on_failure(|_| "An internal error occurred.".to_string()),
        );
        let agent = Agent::simple("Recover", "Use tools").with_tool(tool);

        let provider = MockProvider::new("mock")
            .with_tool_call("flaky", serde_json::json!({}))
            .with_message("sorry about that");

        let result = Runner::run(agent, "go", RunContext::empty(), mock_config(provider))
            .await
            .unwrap();

        let outputs = crate::items::ItemHelpers::tool_outputs(&result.items);
        assert_eq!(
            outputs[0].output,
            serde_json::json!("An internal error occurred.")
        );
        assert!(outputs[0].error.is_none());
        assert_eq!(result.final_text(), Some("sorry about that"));
    }

    #[tokio::test]
    async fn test_tool_failure_without_handler_is_fatal() {
        let tool = Arc::new(FunctionTool::new(
            "flaky",
            "Always fails",
            serde_json::json!({"type": "object"}),
            |_args| {
                Err(AgentError::ToolExecutionError {
                    tool: "flaky".to_string(),
                    message: "backend down".to_string(),
                })
            },
        ));
        let agent = Agent::simple("Fatal", "Use tools").with_tool(tool);

        let provider = MockProvider::new("mock").with_tool_call("flaky", serde_json::json!({}));

        let err = Runner::run(agent, "go", RunContext::empty(), mock_config(provider))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolExecutionError { .. }));
    }

    #[tokio::test]
    async fn test_cancellation_before_start() {
        let token = CancellationToken::new();
        token.cancel();

        let agent = Agent::simple("Cancelled", "never runs");
        let config = mock_config(MockProvider::new("mock").with_message("unreachable"))
            .with_cancellation(token);

        let err = Runner::run(agent, "go", RunContext::empty(), config)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::RunCancelled));
    }

    #[tokio::test]
    async fn test_output_schema_coercion() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "is_flight_related": {"type": "boolean"},
                "reason": {"type": "string"}
            },
            "required": ["is_flight_related", "reason"]
        });
        let agent = Agent::simple("Classifier", "Classify").with_output_schema(schema.clone());

        let provider = MockProvider::new("mock")
            .with_message(r#"{"is_flight_related": true, "reason": "seat change"}"#);

        let result = Runner::run(agent, "classify", RunContext::empty(), mock_config(provider))
            .await
            .unwrap();
        assert_eq!(result.final_output["is_flight_related"], true);

        // Schema violations are model-behavior errors.
        let agent = Agent::simple("Classifier", "Classify").with_output_schema(schema);
        let provider = MockProvider::new("mock").with_message(r#"{"reason": "missing flag"}"#);
        let err = Runner::run(agent, "classify", RunContext::empty(), mock_config(provider))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ModelBehaviorError { .. }));
    }

    #[tokio::test]
    async fn test_empty_model_response_is_behavior_error() {
        let agent = Agent::simple("Empty", "hm");
        let provider = MockProvider::new("mock").with_response(ModelResponse {
            content: None,
            ..ModelResponse::new_message("")
        });

        let err = Runner::run(agent, "go", RunContext::empty(), mock_config(provider))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ModelBehaviorError { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_tool_names_rejected_up_front() {
        let agent = Agent::simple("Dup", "dup")
            .with_tool(Arc::new(FunctionTool::simple("t", "a", |s: String| s)))
            .with_tool(Arc::new(FunctionTool::simple("t", "b", |s: String| s)));

        let err = Runner::run(
            agent,
            "go",
            RunContext::empty(),
            mock_config(MockProvider::new("mock")),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AgentError::UserError { .. }));
    }

    #[test]
    fn test_classify_prefers_handoff_over_tools() {
        let target = Agent::simple("Specialist", "special");
        let handoffs = vec![Handoff::new(target, "specialist work")];

        let response = ModelResponse::new_tool_calls(vec![
            ToolCall {
                id: "c1".to_string(),
                name: "some_tool".to_string(),
                arguments: serde_json::json!({}),
            },
            ToolCall {
                id: "c2".to_string(),
                name: "Specialist".to_string(),
                arguments: serde_json::json!({"reason": "expertise"}),
            },
        ]);

        match classify_response(&response, &handoffs).unwrap() {
            Action::Handoff { handoff, call } => {
                assert_eq!(handoff.name, "Specialist");
                assert_eq!(call.id, "c2");
            }
            _ => panic!("expected handoff action"),
        }
    }
}
