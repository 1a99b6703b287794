use crate::config::ResearchConfig;
use agent::llm::{self, CompletionRequest, Message};
use agent::retriever::{RetrieverConfig, SearchResult};
use agent::tools::{self, SourceLog};
use agent::{AgentBuilder, Error, Result, StopCondition};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

const RESEARCHER_PROMPT: &str = include_str!("prompts/researcher.md");
const REPORT_SYSTEM_PROMPT: &str = include_str!("prompts/report_system.md");
const RESEARCH_REPORT_PROMPT: &str = include_str!("prompts/research_report.md");
const RESOURCE_REPORT_PROMPT: &str = include_str!("prompts/resource_report.md");
const OUTLINE_REPORT_PROMPT: &str = include_str!("prompts/outline_report.md");

const CONTEXT_BODY_CHARS: usize = 2000;

/// One research run for one query: gather sources, then write a report from them.
#[async_trait]
pub trait ResearchPipeline {
    async fn conduct_research(&mut self) -> Result<()>;

    fn research_sources(&self) -> &[SearchResult];

    async fn write_report(&mut self) -> Result<String>;
}

pub trait PipelineFactory: Send + Sync {
    fn create(&self, query: &str) -> Result<Box<dyn ResearchPipeline + Send>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum ReportType {
    ResearchReport,
    ResourceReport,
    OutlineReport,
}

impl ReportType {
    fn prompt(&self, query: &str, context: &str, config: &ResearchConfig) -> String {
        let template = match self {
            ReportType::ResearchReport => RESEARCH_REPORT_PROMPT,
            ReportType::ResourceReport => RESOURCE_REPORT_PROMPT,
            ReportType::OutlineReport => OUTLINE_REPORT_PROMPT,
        };

        // context goes last so text inside it is never substituted
        template
            .replace("{total_words}", &config.total_words.to_string())
            .replace("{language}", &config.language)
            .replace("{query}", query)
            .replace("{context}", context)
    }
}

struct ResearchDone;

impl StopCondition for ResearchDone {
    fn done(&self, history: &[Message]) -> bool {
        match history.last() {
            Some(Message::Tool { name, .. }) => name == "complete_research",
            Some(Message::Assistant(_, tool_calls)) => tool_calls.is_empty(),
            _ => false,
        }
    }
}

#[derive(Deserialize, JsonSchema)]
struct CompleteResearchArgs {
    /// summary of the findings, referencing source urls
    findings: String,
}

struct CompleteResearch;

#[async_trait]
impl tools::FunctionalTool for CompleteResearch {
    fn definition(&self) -> Result<tools::ToolDefinition> {
        tools::ToolDefinition::new::<CompleteResearchArgs>(
            "complete_research",
            "finish gathering information and hand over the findings for the report",
        )
    }

    async fn invoke_fn(&mut self, call: &tools::ToolCall) -> Result<Message> {
        let args: CompleteResearchArgs = call.args()?;

        Ok(call.respond(args.findings))
    }
}

fn findings(history: &[Message]) -> String {
    history
        .iter()
        .rev()
        .find_map(|m| match m {
            Message::Tool { name, result, .. } if name == "complete_research" => {
                Some(result.clone())
            }
            Message::Assistant(content, _) if !content.is_empty() => Some(content.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

fn report_context(findings: &str, sources: &[SearchResult]) -> String {
    let mut s = format!("Findings:\n{}\n\nSources:\n", findings);
    for (i, source) in sources.iter().enumerate() {
        let body = source.body.chars().take(CONTEXT_BODY_CHARS).collect::<String>();
        s.push_str(&format!(
            "\n[{}] {}\nsource: {}\n{}\n",
            i + 1,
            source.title,
            source.href,
            body
        ));
    }
    s
}

/// Researches a query with a tool calling agent backed by the custom retriever.
pub struct Researcher {
    query: String,
    report_type: ReportType,
    config: Arc<ResearchConfig>,
    llm: Arc<dyn llm::LLM + Send + Sync>,
    retriever: RetrieverConfig,
    sources: Vec<SearchResult>,
    findings: Option<String>,
}

impl Researcher {
    pub fn new(
        query: String,
        report_type: ReportType,
        config: Arc<ResearchConfig>,
        llm: Arc<dyn llm::LLM + Send + Sync>,
        retriever: RetrieverConfig,
    ) -> Self {
        Self {
            query,
            report_type,
            config,
            llm,
            retriever,
            sources: Vec::new(),
            findings: None,
        }
    }
}

#[async_trait]
impl ResearchPipeline for Researcher {
    async fn conduct_research(&mut self) -> Result<()> {
        let sources = SourceLog::default();

        let mut agent = AgentBuilder::new()
            .llm(self.llm.clone())
            .tool(tools::WebSearch::new(
                self.retriever.clone(),
                self.config.max_search_results_per_query,
                sources.clone(),
            ))
            .tool(Box::new(CompleteResearch))
            .stop_condition(Box::new(ResearchDone))
            .max_steps(self.config.max_iterations)
            .build()?;

        let history = agent
            .run(vec![
                Message::System(RESEARCHER_PROMPT.to_string()),
                Message::User(self.query.clone()),
            ])
            .await?;

        self.findings = Some(findings(&history));
        self.sources = sources.lock().await.clone();

        info!(query = %self.query, sources = self.sources.len(), "research complete");

        Ok(())
    }

    fn research_sources(&self) -> &[SearchResult] {
        &self.sources
    }

    async fn write_report(&mut self) -> Result<String> {
        let findings = self.findings.as_deref().ok_or(Error::AgentWorkflowError(
            "write_report called before conduct_research".to_string(),
        ))?;

        let context = report_context(findings, &self.sources);
        let messages = vec![
            Message::System(REPORT_SYSTEM_PROMPT.to_string()),
            Message::User(self.report_type.prompt(&self.query, &context, &self.config)),
        ];

        let report = self
            .llm
            .completion(CompletionRequest::plain(&messages))
            .await?;

        Ok(report.content)
    }
}

pub struct ResearcherFactory {
    report_type: ReportType,
    config: Arc<ResearchConfig>,
    llm: Arc<dyn llm::LLM + Send + Sync>,
    retriever: RetrieverConfig,
}

impl ResearcherFactory {
    pub fn new(
        report_type: ReportType,
        config: ResearchConfig,
        llm: Arc<dyn llm::LLM + Send + Sync>,
        retriever: RetrieverConfig,
    ) -> Self {
        Self {
            report_type,
            config: Arc::new(config),
            llm,
            retriever,
        }
    }
}

impl PipelineFactory for ResearcherFactory {
    fn create(&self, query: &str) -> Result<Box<dyn ResearchPipeline + Send>> {
        Ok(Box::new(Researcher::new(
            query.to_string(),
            self.report_type,
            self.config.clone(),
            self.llm.clone(),
            self.retriever.clone(),
        )))
    }
}
