//! # agent-relay
//!
//! A minimal multi-agent delegation runtime: define agents with tools,
//! guardrails, and handoff targets, then let [`Runner`] drive the
//! model-in-the-loop control flow — tool dispatch, agent-to-agent
//! handoffs, input/output guardrails, lifecycle hooks, and persistent
//! sessions.
//!
//! ## Core concepts
//!
//! - **[`Agent`]**: a named bundle of instructions, tools, handoffs, and
//!   guardrails. Immutable once built; clone and override to derive
//!   variants.
//! - **[`Runner`]**: drives one run as a sequential state machine until a
//!   final output, a guardrail rejection, or the turn limit.
//! - **[`Handoff`]**: transfers active-agent status mid-run, optionally
//!   filtering the forwarded conversation.
//! - **Guardrails**: pass/fail checks on input and output with a tripwire
//!   that aborts the run.
//! - **Sessions**: persistent conversation history keyed by session id.
//!
//! ## Getting started
//!
//! Set the `OPENAI_API_KEY` environment variable, or supply your own
//! [`ModelProvider`].
//!
//! ```rust,no_run
//! use agent_relay::{Agent, Handoff, Runner, context::RunContext, runner::RunConfig};
//! use agent_relay::tool::FunctionTool;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let weather = Arc::new(FunctionTool::simple(
//!     "get_weather",
//!     "Gets the current weather for a city.",
//!     |city: String| format!("Sunny in {city}"),
//! ));
//!
//! let recipe_bot = Agent::simple("RecipeBot", "You suggest healthy recipes.");
//!
//! let assistant = Agent::simple(
//!     "AssistantBot",
//!     "Help the user; delegate recipe questions to RecipeBot.",
//! )
//! .with_tool(weather)
//! .with_handoff(Handoff::new(recipe_bot, "Handles recipe questions"));
//!
//! let result = Runner::run(
//!     assistant,
//!     "What's the weather in Karachi?",
//!     RunContext::empty(),
//!     RunConfig::default(),
//! )
//! .await?;
//!
//! println!("{}", result.final_text().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod context;
pub mod error;
pub mod guardrail;
pub mod handoff;
pub mod hooks;
pub mod items;
pub mod memory;
pub mod model;
pub mod result;
pub mod runner;
pub mod sqlite_session;
pub mod tool;
pub mod usage;

pub use agent::{Agent, AgentConfig, Instructions, ToolUsePolicy};
pub use context::RunContext;
pub use error::{AgentError, Result};
pub use guardrail::{GuardrailResult, InputGuardrail, OutputGuardrail};
pub use handoff::Handoff;
pub use hooks::{AgentHooks, RunHooks};
pub use memory::{MemorySession, Session};
pub use model::{MockProvider, ModelProvider, ModelSettings, OpenAIProvider};
pub use result::RunResult;
pub use runner::{RunConfig, Runner};
pub use sqlite_session::SqliteSession;
pub use tool::{FunctionTool, Tool, ToolResult};
pub use usage::{Usage, UsageStats};

// Re-export the client types callers need to point a provider at a
// compatible backend.
pub use async_openai::{config::OpenAIConfig, Client};
