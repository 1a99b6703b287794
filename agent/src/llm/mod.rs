use crate::Result;
use crate::tools::{ToolCall, ToolDefinition};
use async_trait::async_trait;

mod openai;
pub use openai::OpenAI;

#[derive(Clone, Debug)]
pub enum Message {
    User(String),
    Assistant(String, Vec<ToolCall>),
    System(String),
    Tool {
        id: String,
        name: String,
        result: String,
    },
}

/// One chat completion call.
///
/// The agent loop sends every registered tool so the model can keep calling
/// them. A request with no tools omits the tool list from the wire request
/// entirely, which forces a plain text answer; the report step relies on this.
pub struct CompletionRequest<'a> {
    pub messages: &'a [Message],
    pub tools: &'a [ToolDefinition],
}

impl<'a> CompletionRequest<'a> {
    /// A request the model must answer in plain text, without calling tools.
    pub fn plain(messages: &'a [Message]) -> Self {
        Self {
            messages,
            tools: &[],
        }
    }
}

pub struct CompletionResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

#[async_trait]
pub trait LLM {
    async fn completion<'a>(&self, request: CompletionRequest<'a>) -> Result<CompletionResponse>;
}
