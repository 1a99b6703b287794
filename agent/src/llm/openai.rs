use crate::llm::{self, CompletionRequest, CompletionResponse, Message};
use crate::tools::{ToolCall, ToolDefinition};
use crate::{Error, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestAssistantMessageContent, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestSystemMessageContent,
        ChatCompletionRequestToolMessage, ChatCompletionRequestToolMessageContent,
        ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent,
        ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolType,
        CreateChatCompletionRequestArgs, FunctionCall, FunctionObjectArgs, Role,
    },
};
use async_trait::async_trait;
use tracing::debug;

/// Chat completions backend. The api key is read from `OPENAI_API_KEY`.
pub struct OpenAI {
    model: String,
    temperature: Option<f32>,
    client: Client<OpenAIConfig>,
}

impl OpenAI {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            client: Client::new(),
        }
    }

    /// Points the client at an OpenAI compatible server.
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.client = Client::with_config(OpenAIConfig::new().with_api_base(api_base));
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

fn request_message(msg: &Message) -> Result<ChatCompletionRequestMessage> {
    let msg = match msg {
        Message::System(text) => {
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: ChatCompletionRequestSystemMessageContent::Text(text.clone()),
                name: None,
            })
        }
        Message::User(text) => {
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(text.clone()),
                name: None,
            })
        }
        Message::Tool { id, result, .. } => {
            ChatCompletionRequestMessage::Tool(ChatCompletionRequestToolMessage {
                content: ChatCompletionRequestToolMessageContent::Text(result.clone()),
                tool_call_id: id.clone(),
            })
        }
        Message::Assistant(text, calls) => {
            let mut assistant = ChatCompletionRequestAssistantMessageArgs::default();
            assistant.content(ChatCompletionRequestAssistantMessageContent::Text(
                text.clone(),
            ));

            // the api rejects an empty tool_calls array
            if !calls.is_empty() {
                assistant.tool_calls(
                    calls
                        .iter()
                        .map(|call| ChatCompletionMessageToolCall {
                            id: call.id.clone(),
                            r#type: ChatCompletionToolType::Function,
                            function: FunctionCall {
                                name: call.name.clone(),
                                arguments: call.args.clone(),
                            },
                        })
                        .collect::<Vec<_>>(),
                );
            }

            ChatCompletionRequestMessage::Assistant(assistant.build()?)
        }
    };

    Ok(msg)
}

fn tool_spec(tool: &ToolDefinition) -> Result<ChatCompletionTool> {
    let function = FunctionObjectArgs::default()
        .name(tool.name.clone())
        .description(tool.desc.clone())
        .parameters(tool.params.clone())
        .build()?;

    Ok(ChatCompletionToolArgs::default().function(function).build()?)
}

#[async_trait]
impl llm::LLM for OpenAI {
    async fn completion<'a>(&self, request: CompletionRequest<'a>) -> Result<CompletionResponse> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages(
            request
                .messages
                .iter()
                .map(request_message)
                .collect::<Result<Vec<_>>>()?,
        );

        if !request.tools.is_empty() {
            args.tools(
                request
                    .tools
                    .iter()
                    .map(tool_spec)
                    .collect::<Result<Vec<_>>>()?,
            );
        }

        if let Some(temperature) = self.temperature {
            args.temperature(temperature);
        }

        debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "chat completion"
        );

        let res = self.client.chat().create(args.build()?).await?;

        let choice = res
            .choices
            .into_iter()
            .next()
            .ok_or(Error::LLMResponseError("choices is empty".to_string()))?;

        if choice.message.role != Role::Assistant {
            return Err(Error::LLMResponseError(format!(
                "expected role to be assistant, got {:?}",
                choice.message.role
            )));
        }

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                args: call.function.arguments,
            })
            .collect::<Vec<_>>();

        // content is routinely absent when the model only calls tools
        let content = match choice.message.content {
            Some(content) => content,
            None if !tool_calls.is_empty() => String::new(),
            None => return Err(Error::LLMResponseError("content is empty".to_string())),
        };

        Ok(CompletionResponse {
            content,
            tool_calls,
        })
    }
}
