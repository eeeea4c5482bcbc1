//! Model abstraction for LLM interactions
//!
//! Wraps the async-openai crate behind a [`ModelProvider`] trait so the run
//! loop stays agnostic to the concrete backend. [`MockProvider`] scripts
//! responses for tests and offline runs.

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionToolArgs,
        ChatCompletionToolType, CreateChatCompletionRequestArgs, FunctionObjectArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::items::{Message, ModelResponse, Role, ToolCall};
use crate::tool::Tool;
use crate::usage::Usage;

/// Per-call model parameters carried by each agent.
///
/// All fields default to `None`, deferring to the provider's defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelSettings {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Whether the model may request multiple tool calls in one turn.
    pub parallel_tool_calls: Option<bool>,
}

impl ModelSettings {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_parallel_tool_calls(mut self, enabled: bool) -> Self {
        self.parallel_tool_calls = Some(enabled);
        self
    }
}

/// Abstract capability: submit a conversation and the advertised actions,
/// get back one completion plus its token usage.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<Message>,
        tools: Vec<Arc<dyn Tool>>,
        settings: &ModelSettings,
    ) -> Result<(ModelResponse, Usage)>;

    fn model_name(&self) -> &str;
}

/// OpenAI-compatible provider backed by async-openai.
pub struct OpenAIProvider {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAIProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            model: model.into(),
        }
    }

    /// Use a preconfigured client, e.g. for a compatible non-OpenAI base URL.
    pub fn with_client(client: Client<OpenAIConfig>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    fn convert_message(&self, msg: &Message) -> ChatCompletionRequestMessage {
        match msg.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(msg.content.clone())
                .build()
                .unwrap()
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(msg.content.clone())
                .build()
                .unwrap()
                .into(),
            Role::Assistant => {
                let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                builder.content(msg.content.clone());
                if let Some(tool_calls) = &msg.tool_calls {
                    let calls: Vec<_> = tool_calls
                        .iter()
                        .map(|tc| async_openai::types::ChatCompletionMessageToolCall {
                            id: tc.id.clone(),
                            r#type: ChatCompletionToolType::Function,
                            function: async_openai::types::FunctionCall {
                                name: tc.name.clone(),
                                arguments: tc.arguments.to_string(),
                            },
                        })
                        .collect();
                    builder.tool_calls(calls);
                }
                builder.build().unwrap().into()
            }
            Role::Tool => ChatCompletionRequestToolMessageArgs::default()
                .content(msg.content.clone())
                .tool_call_id(msg.tool_call_id.clone().unwrap_or_default())
                .build()
                .unwrap()
                .into(),
        }
    }

    fn convert_tools(&self, tools: &[Arc<dyn Tool>]) -> Vec<ChatCompletionTool> {
        tools
            .iter()
            .map(|tool| {
                ChatCompletionToolArgs::default()
                    .r#type(ChatCompletionToolType::Function)
                    .function(
                        FunctionObjectArgs::default()
                            .name(tool.name())
                            .description(tool.description())
                            .parameters(tool.parameters_schema())
                            .build()
                            .unwrap(),
                    )
                    .build()
                    .unwrap()
            })
            .collect()
    }
}

#[async_trait]
impl ModelProvider for OpenAIProvider {
    async fn complete(
        &self,
        messages: Vec<Message>,
        tools: Vec<Arc<dyn Tool>>,
        settings: &ModelSettings,
    ) -> Result<(ModelResponse, Usage)> {
        let converted: Vec<ChatCompletionRequestMessage> =
            messages.iter().map(|m| self.convert_message(m)).collect();

        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(&self.model).messages(converted);

        if !tools.is_empty() {
            request.tools(self.convert_tools(&tools));
            if let Some(parallel) = settings.parallel_tool_calls {
                request.parallel_tool_calls(parallel);
            }
        }
        if let Some(temperature) = settings.temperature {
            request.temperature(temperature);
        }
        if let Some(top_p) = settings.top_p {
            request.top_p(top_p);
        }
        if let Some(penalty) = settings.frequency_penalty {
            request.frequency_penalty(penalty);
        }
        if let Some(penalty) = settings.presence_penalty {
            request.presence_penalty(penalty);
        }
        if let Some(max_tokens) = settings.max_tokens {
            request.max_tokens(max_tokens);
        }

        let response = self.client.chat().create(request.build()?).await?;

        let choice = response
            .choices
            .first()
            .ok_or_else(|| AgentError::ModelBehaviorError {
                message: "no choices in response".to_string(),
            })?;

        let tool_calls = choice
            .message
            .tool_calls
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|tc| ToolCall {
                id: tc.id.clone(),
                name: tc.function.name.clone(),
                arguments: serde_json::from_str(&tc.function.arguments).unwrap_or(Value::Null),
            })
            .collect();

        let model_response = ModelResponse {
            id: response.id.clone(),
            content: choice.message.content.clone(),
            tool_calls,
            finish_reason: choice.finish_reason.as_ref().map(|r| format!("{:?}", r)),
            created_at: chrono::Utc::now(),
        };

        let usage = match response.usage {
            Some(usage) => Usage::new(
                usage.prompt_tokens as usize,
                usage.completion_tokens as usize,
            ),
            None => Usage::empty(),
        };

        Ok((model_response, usage))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Scripted model provider for tests and offline runs. Responses are
/// returned in the order they were queued; once drained, a fixed default
/// message is returned.
pub struct MockProvider {
    model: String,
    responses: std::sync::Mutex<Vec<ModelResponse>>,
}

impl MockProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            responses: std::sync::Mutex::new(vec![]),
        }
    }

    pub fn with_response(self, response: ModelResponse) -> Self {
        self.responses.lock().unwrap().push(response);
        self
    }

    pub fn with_message(self, content: impl Into<String>) -> Self {
        self.with_response(ModelResponse::new_message(content))
    }

    pub fn with_tool_call(self, tool_name: impl Into<String>, args: Value) -> Self {
        let tool_call = ToolCall {
            id: uuid::Uuid::new_v4().to_string(),
            name: tool_name.into(),
            arguments: args,
        };
        self.with_response(ModelResponse::new_tool_calls(vec![tool_call]))
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn complete(
        &self,
        _messages: Vec<Message>,
        _tools: Vec<Arc<dyn Tool>>,
        _settings: &ModelSettings,
    ) -> Result<(ModelResponse, Usage)> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Ok((
                ModelResponse::new_message("Default response"),
                Usage::new(10, 5),
            ));
        }
        Ok((responses.remove(0), Usage::new(10, 5)))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::FunctionTool;

    #[test]
    fn test_settings_builder() {
        let settings = ModelSettings::default()
            .with_temperature(0.4)
            .with_top_p(0.3)
            .with_parallel_tool_calls(false);
        assert_eq!(settings.temperature, Some(0.4));
        assert_eq!(settings.top_p, Some(0.3));
        assert_eq!(settings.parallel_tool_calls, Some(false));
        assert!(settings.max_tokens.is_none());
    }

    #[test]
    fn test_message_conversion_does_not_panic() {
        let provider = OpenAIProvider::new("gpt-4o");
        let _ = provider.convert_message(&Message::system("be helpful"));
        let _ = provider.convert_message(&Message::user("hello"));
        let _ = provider.convert_message(&Message::assistant("hi"));
        let _ = provider.convert_message(&Message::assistant_with_tool_calls(
            "",
            vec![ToolCall {
                id: "c1".to_string(),
                name: "weather".to_string(),
                arguments: serde_json::json!({"city": "Karachi"}),
            }],
        ));
        let _ = provider.convert_message(&Message::tool("Sunny", "c1"));
    }

    #[test]
    fn test_tool_conversion() {
        let provider = OpenAIProvider::new("gpt-4o");
        let tool: Arc<dyn Tool> = Arc::new(FunctionTool::simple(
            "weather",
            "Weather lookup",
            |city: String| format!("Sunny in {city}"),
        ));

        let converted = provider.convert_tools(&[tool]);
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].function.name, "weather");
        assert_eq!(
            converted[0].function.description.as_deref(),
            Some("Weather lookup")
        );
    }

    #[tokio::test]
    async fn test_mock_provider_scripts_in_order() {
        let provider = MockProvider::new("mock")
            .with_message("first")
            .with_tool_call("add", serde_json::json!({"num1": 2, "num2": 2}));

        let settings = ModelSettings::default();
        let (r1, usage) = provider
            .complete(vec![], vec![], &settings)
            .await
            .unwrap();
        assert_eq!(r1.content.as_deref(), Some("first"));
        assert_eq!(usage.total_tokens, 15);

        let (r2, _) = provider.complete(vec![], vec![], &settings).await.unwrap();
        assert_eq!(r2.tool_calls[0].name, "add");

        let (r3, _) = provider.complete(vec![], vec![], &settings).await.unwrap();
        assert_eq!(r3.content.as_deref(), Some("Default response"));
    }
}
