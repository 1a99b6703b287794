use agent::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

/// Settings of the research pipeline, read from a JSON file with upper case keys.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct ResearchConfig {
    pub retriever: String,
    /// `model` or `openai:model`
    pub smart_llm: String,
    pub openai_base_url: Option<String>,
    pub temperature: f32,
    pub max_search_results_per_query: usize,
    /// completions allowed per research run
    pub max_iterations: usize,
    pub total_words: usize,
    pub language: String,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            retriever: "custom".to_string(),
            smart_llm: "gpt-4o".to_string(),
            openai_base_url: None,
            temperature: 0.4,
            max_search_results_per_query: 5,
            max_iterations: 10,
            total_words: 1200,
            language: "english".to_string(),
        }
    }
}

impl ResearchConfig {
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| Error::ConfigError(format!("{}: {}", path.display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.retriever != "custom" {
            return Err(Error::ConfigError(format!(
                "unsupported retriever {}, only custom is available",
                self.retriever
            )));
        }
        if self.max_iterations == 0 {
            return Err(Error::ConfigError(
                "MAX_ITERATIONS must be at least 1".to_string(),
            ));
        }
        self.model().map(|_| ())
    }

    pub fn model(&self) -> Result<&str> {
        match self.smart_llm.split_once(':') {
            None => Ok(self.smart_llm.as_str()),
            Some(("openai", model)) => Ok(model),
            Some((provider, _)) => Err(Error::ConfigError(format!(
                "unsupported llm provider {}",
                provider
            ))),
        }
    }
}
