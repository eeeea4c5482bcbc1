//! # Guardrails (orientation)
//!
//! Guardrails gate a run's input and output. Input guardrails run once
//! before the loop starts; output guardrails run once on the candidate
//! final output. A tripped guardrail aborts the run with its info payload.
//! Checks are async and receive the [`RunContext`], so a guardrail may run
//! a nested agent to classify content.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::context::RunContext;
use crate::error::{AgentError, Result};

/// Outcome of a guardrail check: an opaque info payload plus the tripwire
/// flag. A set tripwire aborts the run before any further model or tool
/// invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailResult {
    pub tripwire: bool,
    pub info: Value,
}

impl GuardrailResult {
    /// A passing result with no extra information.
    pub fn pass() -> Self {
        Self {
            tripwire: false,
            info: Value::Null,
        }
    }

    /// A passing result carrying classifier output for the caller.
    pub fn pass_with_info(info: Value) -> Self {
        Self {
            tripwire: false,
            info,
        }
    }

    /// A tripped result; `info` explains the rejection.
    pub fn trip(info: Value) -> Self {
        Self {
            tripwire: true,
            info,
        }
    }
}

/// Validates user input before the run loop starts.
#[async_trait]
pub trait InputGuardrail: Send + Sync {
    fn name(&self) -> &str;
    /// Higher priority runs first.
    fn priority(&self) -> i32 {
        0
    }
    async fn check(&self, ctx: &RunContext, input: &str) -> Result<GuardrailResult>;
}

/// Validates the candidate final output before it is returned.
#[async_trait]
pub trait OutputGuardrail: Send + Sync {
    fn name(&self) -> &str;
    /// Higher priority runs first.
    fn priority(&self) -> i32 {
        0
    }
    async fn check(&self, ctx: &RunContext, output: &str) -> Result<GuardrailResult>;
}

/// Executes guardrails in descending priority order, stopping at the first
/// tripwire.
pub struct GuardrailRunner;

impl GuardrailRunner {
    pub async fn check_input(
        guards: &[Arc<dyn InputGuardrail>],
        ctx: &RunContext,
        input: &str,
    ) -> Result<()> {
        let mut guards = guards.to_vec();
        guards.sort_by_key(|g| -g.priority());
        for g in guards {
            let res = g.check(ctx, input).await?;
            if res.tripwire {
                tracing::info!(guardrail = g.name(), "input guardrail tripped");
                return Err(AgentError::InputGuardrailTriggered {
                    info: Self::info_or_name(res.info, g.name()),
                });
            }
        }
        Ok(())
    }

    pub async fn check_output(
        guards: &[Arc<dyn OutputGuardrail>],
        ctx: &RunContext,
        output: &str,
    ) -> Result<()> {
        let mut guards = guards.to_vec();
        guards.sort_by_key(|g| -g.priority());
        for g in guards {
            let res = g.check(ctx, output).await?;
            if res.tripwire {
                tracing::info!(guardrail = g.name(), "output guardrail tripped");
                return Err(AgentError::OutputGuardrailTriggered {
                    info: Self::info_or_name(res.info, g.name()),
                });
            }
        }
        Ok(())
    }

    fn info_or_name(info: Value, name: &str) -> Value {
        if info.is_null() {
            Value::String(name.to_string())
        } else {
            info
        }
    }
}

type GuardrailFn =
    Arc<dyn Fn(RunContext, String) -> BoxFuture<'static, Result<GuardrailResult>> + Send + Sync>;

/// An [`InputGuardrail`] built from an async closure.
///
/// ## Example
///
/// ```rust
/// use agent_relay::guardrail::{FnInputGuardrail, GuardrailResult};
///
/// let flights_only = FnInputGuardrail::new("flights_only", |_ctx, input| async move {
///     if input.contains("flight") {
///         Ok(GuardrailResult::pass())
///     } else {
///         Ok(GuardrailResult::trip(serde_json::json!({
///             "reason": "not flight related"
///         })))
///     }
/// });
/// ```
#[derive(Clone)]
pub struct FnInputGuardrail {
    name: String,
    f: GuardrailFn,
}

impl FnInputGuardrail {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(RunContext, String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<GuardrailResult>> + Send + 'static,
    {
        let f: GuardrailFn = Arc::new(move |ctx, input| Box::pin(f(ctx, input)));
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl InputGuardrail for FnInputGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, ctx: &RunContext, input: &str) -> Result<GuardrailResult> {
        (self.f)(ctx.clone(), input.to_string()).await
    }
}

/// An [`OutputGuardrail`] built from an async closure.
#[derive(Clone)]
pub struct FnOutputGuardrail {
    name: String,
    f: GuardrailFn,
}

impl FnOutputGuardrail {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(RunContext, String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<GuardrailResult>> + Send + 'static,
    {
        let f: GuardrailFn = Arc::new(move |ctx, output| Box::pin(f(ctx, output)));
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl OutputGuardrail for FnOutputGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, ctx: &RunContext, output: &str) -> Result<GuardrailResult> {
        (self.f)(ctx.clone(), output.to_string()).await
    }
}

/// Blocks content containing any of the configured patterns,
/// case-insensitively. Implements both guardrail directions.
#[derive(Debug, Clone)]
pub struct PatternBlockGuardrail {
    name: String,
    patterns: Vec<String>,
}

impl PatternBlockGuardrail {
    pub fn new(name: impl Into<String>, patterns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            patterns,
        }
    }

    fn matching_pattern(&self, text: &str) -> Option<&str> {
        let lower = text.to_lowercase();
        self.patterns
            .iter()
            .find(|p| lower.contains(&p.to_lowercase()))
            .map(|p| p.as_str())
    }
}

#[async_trait]
impl InputGuardrail for PatternBlockGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, _ctx: &RunContext, input: &str) -> Result<GuardrailResult> {
        match self.matching_pattern(input) {
            Some(pattern) => Ok(GuardrailResult::trip(serde_json::json!({
                "blocked_pattern": pattern,
            }))),
            None => Ok(GuardrailResult::pass()),
        }
    }
}

#[async_trait]
impl OutputGuardrail for PatternBlockGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, _ctx: &RunContext, output: &str) -> Result<GuardrailResult> {
        match self.matching_pattern(output) {
            Some(pattern) => Ok(GuardrailResult::trip(serde_json::json!({
                "blocked_pattern": pattern,
            }))),
            None => Ok(GuardrailResult::pass()),
        }
    }
}

/// Trips when the input exceeds a maximum length in bytes.
#[derive(Debug, Clone)]
pub struct MaxLengthGuardrail {
    name: String,
    max_length: usize,
}

impl MaxLengthGuardrail {
    pub fn new(max_length: usize) -> Self {
        Self {
            name: format!("MaxLength_{}", max_length),
            max_length,
        }
    }
}

#[async_trait]
impl InputGuardrail for MaxLengthGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, _ctx: &RunContext, input: &str) -> Result<GuardrailResult> {
        if input.len() > self.max_length {
            Ok(GuardrailResult::trip(serde_json::json!({
                "max_length": self.max_length,
                "actual_length": input.len(),
            })))
        } else {
            Ok(GuardrailResult::pass())
        }
    }
}
