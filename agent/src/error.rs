use async_openai::error::OpenAIError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Openai error: {0}")]
    OpenaiError(#[from] OpenAIError),

    #[error("No response from llm: {0}")]
    LLMResponseError(String),

    #[error("Tool {0} does not exist")]
    ToolDoesNotExist(String),

    #[error("Missing arg: {0}")]
    MissingArg(String),

    #[error("Task join error: {0}")]
    TaskJoinError(#[from] tokio::task::JoinError),

    #[error("Agent workflow error: {0}")]
    AgentWorkflowError(String),

    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Config error: {0}")]
    ConfigError(String),

    /// A search result payload could not be decoded (base64, UTF-8 or JSON).
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// A decoded search result payload is missing a required field.
    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("No sources returned for query '{0}'")]
    NoSourcesError(String),

    #[error("Malformed input on line {line}: {reason}")]
    InputFormatError { line: usize, reason: String },

    #[error("Permit pool closed: {0}")]
    PermitError(#[from] tokio::sync::AcquireError),
}
