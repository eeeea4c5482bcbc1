//! Tool system for agents
//!
//! Tools are the way agents act on the world. The runner validates the
//! model-supplied arguments against each tool's declared schema before
//! invoking it, and a tool can opt out of a turn through its enablement
//! predicate or recover from its own failures through a failure handler.

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

use crate::context::RunContext;
use crate::error::{AgentError, Result};

/// Result from a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The output from the tool
    pub output: Value,
    /// Recoverable failure message; the loop continues with it in history
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: Value) -> Self {
        Self {
            output,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            output: Value::Null,
            error: Some(message.into()),
        }
    }
}

/// Trait for all tools that agents can call.
#[async_trait]
pub trait Tool: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema for the tool's arguments, advertised to the model.
    fn parameters_schema(&self) -> Value;

    /// Re-evaluated every turn; a disabled tool is not advertised to the
    /// model and cannot be invoked for that turn.
    fn is_enabled(&self, _ctx: &RunContext) -> bool {
        true
    }

    /// Execute with schema-validated arguments.
    async fn execute(&self, ctx: &RunContext, arguments: Value) -> Result<ToolResult>;

    /// Maps an execution error to a user-facing message. Returning `Some`
    /// substitutes the message as the tool's output and lets the run
    /// continue; `None` propagates the error and terminates the run.
    fn failure_message(&self, _error: &AgentError) -> Option<String> {
        None
    }
}

/// Validates `arguments` against a JSON-schema-shaped declaration.
///
/// This covers the shapes tools in practice declare: a top-level object
/// with `required` keys and primitively-typed `properties`. Nested object
/// properties are accepted without recursion; typed tools get full
/// validation through deserialization instead.
pub fn validate_arguments(schema: &Value, arguments: &Value) -> std::result::Result<(), String> {
    if schema.get("type").and_then(Value::as_str) != Some("object") {
        return Ok(());
    }

    let Some(args) = arguments.as_object() else {
        return Err(format!("expected an object, got {}", type_name(arguments)));
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !args.contains_key(key) {
                return Err(format!("missing required argument '{}'", key));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (key, prop) in properties {
            let Some(value) = args.get(key) else { continue };
            let Some(expected) = prop.get("type").and_then(Value::as_str) else {
                continue;
            };
            if !type_matches(expected, value) {
                return Err(format!(
                    "argument '{}' should be {}, got {}",
                    key,
                    expected,
                    type_name(value)
                ));
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

type ToolFn = Arc<dyn Fn(&RunContext, Value) -> Result<Value> + Send + Sync>;
type EnabledFn = Arc<dyn Fn(&RunContext) -> bool + Send + Sync>;
type FailureFn = Arc<dyn Fn(&AgentError) -> String + Send + Sync>;

/// A function-based tool.
///
/// ## Example
///
/// ```rust
/// use agent_relay::tool::FunctionTool;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct AddArgs {
///     num1: i64,
///     num2: i64,
/// }
///
/// let add = FunctionTool::typed("add", "Add two numbers", |args: AddArgs| {
///     Ok(serde_json::json!(args.num1 + args.num2))
/// });
/// assert_eq!(add.name(), "add");
/// # use agent_relay::tool::Tool;
/// ```
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    description: String,
    parameters_schema: Value,
    function: ToolFn,
    enabled: Option<EnabledFn>,
    failure_handler: Option<FailureFn>,
}

impl Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

impl FunctionTool {
    /// Create a tool from an explicit schema and a function of raw JSON
    /// arguments.
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: Value,
        function: F,
    ) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema,
            function: Arc::new(move |_ctx, args| function(args)),
            enabled: None,
            failure_handler: None,
        }
    }

    /// Like [`new`](Self::new), but the function also receives the
    /// [`RunContext`].
    pub fn with_context<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: Value,
        function: F,
    ) -> Self
    where
        F: Fn(&RunContext, Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema,
            function: Arc::new(function),
            enabled: None,
            failure_handler: None,
        }
    }

    /// Create a tool whose argument schema is derived from `A` and whose
    /// arguments are deserialized into `A` before the function runs.
    /// Deserialization failures surface as recoverable tool errors.
    pub fn typed<A, F>(name: impl Into<String>, description: impl Into<String>, function: F) -> Self
    where
        A: DeserializeOwned + JsonSchema,
        F: Fn(A) -> Result<Value> + Send + Sync + 'static,
    {
        let schema = serde_json::to_value(schema_for!(A)).unwrap_or_else(|_| {
            serde_json::json!({ "type": "object" })
        });
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema: schema,
            function: Arc::new(move |_ctx, args| {
                let typed: A = serde_json::from_value(args)?;
                function(typed)
            }),
            enabled: None,
            failure_handler: None,
        }
    }

    /// Create a tool with a `{"input": string}` schema from a plain
    /// string-to-string function.
    pub fn simple<F>(name: &str, description: &str, function: F) -> Self
    where
        F: Fn(String) -> String + Send + Sync + 'static,
    {
        Self::new(
            name,
            description,
            serde_json::json!({
                "type": "object",
                "properties": {
                    "input": {
                        "type": "string",
                        "description": "Input to the function"
                    }
                },
                "required": ["input"]
            }),
            move |args| {
                let input = args
                    .get("input")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(Value::String(function(input)))
            },
        )
    }

    /// Attach an enablement predicate, re-evaluated every turn.
    pub fn enabled_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RunContext) -> bool + Send + Sync + 'static,
    {
        self.enabled = Some(Arc::new(predicate));
        self
    }

    /// Attach a failure handler producing a user-facing message for
    /// execution errors.
    pub fn on_failure<F>(mut self, handler: F) -> Self
    where
        F: Fn(&AgentError) -> String + Send + Sync + 'static,
    {
        self.failure_handler = Some(Arc::new(handler));
        self
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters_schema.clone()
    }

    fn is_enabled(&self, ctx: &RunContext) -> bool {
        self.enabled.as_ref().map_or(true, |pred| pred(ctx))
    }

    async fn execute(&self, ctx: &RunContext, arguments: Value) -> Result<ToolResult> {
        match (self.function)(ctx, arguments) {
            Ok(output) => Ok(ToolResult::success(output)),
            Err(AgentError::SerializationError(e)) => {
                Ok(ToolResult::error(format!("invalid arguments: {}", e)))
            }
            Err(e) => Err(e),
        }
    }

    fn failure_message(&self, error: &AgentError) -> Option<String> {
        self.failure_handler.as_ref().map(|h| h(error))
    }
}

/// Macro to create a simple function tool.
#[macro_export]
macro_rules! function_tool {
    ($name:expr, $description:expr, $func:expr) => {
        $crate::tool::FunctionTool::simple($name, $description, $func)
    };
}

/// A whole agent exposed as a callable tool. The tool runs the agent on
/// the supplied input with its own nested run and returns the sub-agent's
/// final output. Created with [`Agent::as_tool`](crate::agent::Agent::as_tool).
#[derive(Clone)]
pub struct AgentTool {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) agent: crate::agent::Agent,
    pub(crate) config: crate::runner::RunConfig,
}

impl Debug for AgentTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTool")
            .field("name", &self.name)
            .field("agent", &self.agent.name())
            .finish()
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "input": {
                    "type": "string",
                    "description": "Task for the agent"
                }
            },
            "required": ["input"]
        })
    }

    async fn execute(&self, ctx: &RunContext, arguments: Value) -> Result<ToolResult> {
        let input = arguments
            .get("input")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let result = crate::runner::Runner::run(
            self.agent.clone(),
            input,
            ctx.clone(),
            self.config.clone(),
        )
        .await?;

        Ok(ToolResult::success(result.final_output))
    }
}
