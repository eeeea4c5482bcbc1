//! Lifecycle hooks
//!
//! Two subscriber interfaces with no-op defaults: [`AgentHooks`] is attached
//! to a single agent and fires for that agent's events; [`RunHooks`] is
//! attached to a [`RunConfig`](crate::runner::RunConfig) and fires for every
//! agent in the run. The runner invokes each callback at the corresponding
//! state-machine transition. Hook errors are not swallowed: a failing hook
//! terminates the run.

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::Agent;
use crate::context::RunContext;
use crate::error::Result;
use crate::items::{Message, ModelResponse};
use crate::tool::Tool;

/// Per-agent lifecycle subscriber.
///
/// ## Example
///
/// ```rust
/// use agent_relay::hooks::AgentHooks;
/// use agent_relay::{Agent, context::RunContext, error::Result};
/// use async_trait::async_trait;
///
/// struct Announcer;
///
/// #[async_trait]
/// impl AgentHooks for Announcer {
///     async fn on_start(&self, _ctx: &RunContext, agent: &Agent) -> Result<()> {
///         println!("{} is now in charge", agent.name());
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait AgentHooks: Send + Sync {
    /// The agent became active: at run start, or after a handoff to it.
    async fn on_start(&self, _ctx: &RunContext, _agent: &Agent) -> Result<()> {
        Ok(())
    }

    /// The agent produced the run's final output.
    async fn on_end(&self, _ctx: &RunContext, _agent: &Agent, _output: &Value) -> Result<()> {
        Ok(())
    }

    /// A tool owned by this agent is about to execute.
    async fn on_tool_start(
        &self,
        _ctx: &RunContext,
        _agent: &Agent,
        _tool: &dyn Tool,
    ) -> Result<()> {
        Ok(())
    }

    /// A tool owned by this agent finished executing.
    async fn on_tool_end(
        &self,
        _ctx: &RunContext,
        _agent: &Agent,
        _tool: &dyn Tool,
        _result: &Value,
    ) -> Result<()> {
        Ok(())
    }

    /// Control is being handed to `agent` from `source`. Fires on the
    /// subscribers of both agents, before the new agent's first model call.
    async fn on_handoff(&self, _ctx: &RunContext, _agent: &Agent, _source: &Agent) -> Result<()> {
        Ok(())
    }
}

/// Run-scoped lifecycle subscriber; sees events from every agent.
#[async_trait]
pub trait RunHooks: Send + Sync {
    async fn on_agent_start(&self, _ctx: &RunContext, _agent: &Agent) -> Result<()> {
        Ok(())
    }

    async fn on_agent_end(&self, _ctx: &RunContext, _agent: &Agent, _output: &Value) -> Result<()> {
        Ok(())
    }

    /// Just before the model is invoked for a turn.
    async fn on_llm_start(
        &self,
        _ctx: &RunContext,
        _agent: &Agent,
        _system_prompt: &str,
        _messages: &[Message],
    ) -> Result<()> {
        Ok(())
    }

    /// Just after the model responded.
    async fn on_llm_end(
        &self,
        _ctx: &RunContext,
        _agent: &Agent,
        _response: &ModelResponse,
    ) -> Result<()> {
        Ok(())
    }

    async fn on_tool_start(
        &self,
        _ctx: &RunContext,
        _agent: &Agent,
        _tool: &dyn Tool,
    ) -> Result<()> {
        Ok(())
    }

    async fn on_tool_end(
        &self,
        _ctx: &RunContext,
        _agent: &Agent,
        _tool: &dyn Tool,
        _result: &Value,
    ) -> Result<()> {
        Ok(())
    }

    async fn on_handoff(&self, _ctx: &RunContext, _from: &Agent, _to: &Agent) -> Result<()> {
        Ok(())
    }
}
