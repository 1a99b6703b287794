use crate::Result;
use crate::llm::Message;
use crate::retriever::{CustomRetriever, RetrieverConfig, SearchResult};
use crate::tools::{FunctionalTool, ToolCall, ToolDefinition};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Every distinct result the tool has handed to the model, in discovery order.
pub type SourceLog = Arc<Mutex<Vec<SearchResult>>>;

const MAX_BODY_CHARS: usize = 3000;

pub struct WebSearch {
    config: RetrieverConfig,
    client: reqwest::Client,
    max_results: usize,
    sources: SourceLog,
}

impl WebSearch {
    pub fn new(config: RetrieverConfig, max_results: usize, sources: SourceLog) -> Box<Self> {
        Box::new(Self {
            config,
            client: reqwest::Client::new(),
            max_results,
            sources,
        })
    }

    async fn record(&self, results: &[SearchResult]) {
        let mut sources = self.sources.lock().await;
        for result in results {
            if !sources.iter().any(|s| s.href == result.href) {
                sources.push(result.clone());
            }
        }
    }
}

fn format_results(query: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return format!("no results found for query: {}", query);
    }

    let mut s = format!("results for query: {}\n", query);
    for (i, result) in results.iter().enumerate() {
        let body = result.body.chars().take(MAX_BODY_CHARS).collect::<String>();
        s.push_str(&format!(
            "\n[{}] {}\nsource: {}\n{}\n",
            i + 1,
            result.title,
            result.href,
            body
        ));
    }
    s
}

#[derive(Deserialize, JsonSchema)]
struct WebSearchArgs {
    /// the search query
    query: String,
}

#[async_trait]
impl FunctionalTool for WebSearch {
    fn definition(&self) -> Result<ToolDefinition> {
        ToolDefinition::new::<WebSearchArgs>(
            "web_search",
            "search the web and return the text of the most relevant pages",
        )
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let args: WebSearchArgs = call.args()?;

        let results = CustomRetriever::new(args.query.clone(), None, self.config.clone())
            .with_client(self.client.clone())
            .search(self.max_results)
            .await?;

        info!(query = %args.query, results = results.len(), "web search");

        self.record(&results).await;

        Ok(call.respond(format_results(&args.query, &results)))
    }
}
