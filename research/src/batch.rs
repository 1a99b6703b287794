use crate::research::{PipelineFactory, ResearchPipeline};
use agent::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct InputRecord {
    pub id: String,
    pub query: String,
}

/// Parses one JSON record per line. Any bad line rejects the whole input.
pub fn parse_records(content: &str) -> Result<Vec<InputRecord>> {
    let mut ids = HashSet::new();

    content
        .lines()
        .enumerate()
        .map(|(i, line)| {
            let line_no = i + 1;
            let invalid = |reason: String| Error::InputFormatError {
                line: line_no,
                reason,
            };

            let record: InputRecord =
                serde_json::from_str(line).map_err(|e| invalid(e.to_string()))?;

            if record.query.is_empty() {
                return Err(invalid("query is empty".to_string()));
            }
            // ids become file names
            if record.id.is_empty()
                || record.id == "."
                || record.id == ".."
                || record.id.contains(['/', '\\'])
            {
                return Err(invalid(format!("id {:?} is not a valid file name", record.id)));
            }
            if !ids.insert(record.id.clone()) {
                return Err(invalid(format!("duplicate id {}", record.id)));
            }

            Ok(record)
        })
        .collect()
}

pub fn read_records(path: &Path) -> Result<Vec<InputRecord>> {
    parse_records(&std::fs::read_to_string(path)?)
}

/// Runs one research pipeline per record with at most `concurrency` researching at once.
///
/// Writes `<id>.q` for every record and `<id>.a` for every finished report. The
/// first failing record aborts the batch.
pub struct BatchRunner {
    factory: Arc<dyn PipelineFactory>,
    output_dir: PathBuf,
    concurrency: NonZeroUsize,
}

impl BatchRunner {
    pub fn new(
        factory: Arc<dyn PipelineFactory>,
        output_dir: PathBuf,
        concurrency: NonZeroUsize,
    ) -> Self {
        Self {
            factory,
            output_dir,
            concurrency,
        }
    }

    /// Returns the number of records that produced a report.
    pub async fn run(&self, records: Vec<InputRecord>) -> Result<usize> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        info!(
            records = records.len(),
            concurrency = self.concurrency.get(),
            output_dir = %self.output_dir.display(),
            "starting batch"
        );

        let permits = Arc::new(Semaphore::new(self.concurrency.get()));
        let mut tasks = JoinSet::new();

        for record in records {
            tasks.spawn(process_record(
                record,
                self.factory.clone(),
                permits.clone(),
                self.output_dir.clone(),
            ));
        }

        // returning early drops the set, which aborts every remaining record
        let mut completed = 0;
        while let Some(joined) = tasks.join_next().await {
            joined??;
            completed += 1;
        }

        Ok(completed)
    }
}

async fn process_record(
    record: InputRecord,
    factory: Arc<dyn PipelineFactory>,
    permits: Arc<Semaphore>,
    output_dir: PathBuf,
) -> Result<()> {
    tokio::fs::write(output_dir.join(format!("{}.q", record.id)), &record.query).await?;

    let _permit = permits.acquire_owned().await?;

    research_record(&record, factory.as_ref(), &output_dir)
        .await
        .inspect_err(|e| error!(id = %record.id, "{}", e))
}

async fn research_record(
    record: &InputRecord,
    factory: &dyn PipelineFactory,
    output_dir: &Path,
) -> Result<()> {
    info!(id = %record.id, query = %record.query, "researching");

    let mut researcher = factory.create(&record.query)?;
    researcher.conduct_research().await?;

    if researcher.research_sources().is_empty() {
        return Err(Error::NoSourcesError(record.query.clone()));
    }

    let report = researcher.write_report().await?;
    tokio::fs::write(output_dir.join(format!("{}.a", record.id)), report).await?;

    info!(id = %record.id, "report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{BatchRunner, InputRecord, parse_records};
    use crate::research::{PipelineFactory, ResearchPipeline};
    use agent::retriever::SearchResult;
    use agent::{Error, Result};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::num::NonZeroUsize;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Clone)]
    enum Outcome {
        Report(&'static str),
        NoSources,
        Fail,
    }

    #[derive(Default)]
    struct Gauge {
        researching: AtomicUsize,
        peak: AtomicUsize,
    }

    struct MockPipeline {
        outcome: Outcome,
        gauge: Arc<Gauge>,
        sources: Vec<SearchResult>,
    }

    #[async_trait]
    impl ResearchPipeline for MockPipeline {
        async fn conduct_research(&mut self) -> Result<()> {
            let now = self.gauge.researching.fetch_add(1, Ordering::SeqCst) + 1;
            self.gauge.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.gauge.researching.fetch_sub(1, Ordering::SeqCst);

            match self.outcome {
                Outcome::Fail => Err(Error::AgentWorkflowError("llm unavailable".to_string())),
                Outcome::NoSources => Ok(()),
                Outcome::Report(_) => {
                    self.sources = vec![SearchResult::new(
                        "https://en.wikipedia.org/wiki/Paris".to_string(),
                        "Paris\nCapital of France.".to_string(),
                    )];
                    Ok(())
                }
            }
        }

        fn research_sources(&self) -> &[SearchResult] {
            &self.sources
        }

        async fn write_report(&mut self) -> Result<String> {
            match self.outcome {
                Outcome::Report(report) => Ok(report.to_string()),
                _ => panic!("report requested for a failed record"),
            }
        }
    }

    #[derive(Default)]
    struct MockFactory {
        outcomes: HashMap<String, Outcome>,
        gauge: Arc<Gauge>,
    }

    impl MockFactory {
        fn with(mut self, query: &str, outcome: Outcome) -> Self {
            self.outcomes.insert(query.to_string(), outcome);
            self
        }
    }

    impl PipelineFactory for MockFactory {
        fn create(&self, query: &str) -> Result<Box<dyn ResearchPipeline + Send>> {
            Ok(Box::new(MockPipeline {
                outcome: self
                    .outcomes
                    .get(query)
                    .cloned()
                    .unwrap_or(Outcome::Report("report")),
                gauge: self.gauge.clone(),
                sources: Vec::new(),
            }))
        }
    }

    fn record(id: &str, query: &str) -> InputRecord {
        InputRecord {
            id: id.to_string(),
            query: query.to_string(),
        }
    }

    fn runner(factory: MockFactory, dir: &tempfile::TempDir, concurrency: usize) -> BatchRunner {
        BatchRunner::new(
            Arc::new(factory),
            dir.path().to_path_buf(),
            NonZeroUsize::new(concurrency).unwrap(),
        )
    }

    #[test]
    fn test_parse_records() -> Result<()> {
        let records = parse_records(
            "{\"id\":\"q1\",\"query\":\"capital of France\"}\r\n{\"id\":\"q2\",\"query\":\"tallest mountain\",\"lang\":\"en\"}\n",
        )?;

        assert_eq!(
            records,
            vec![
                record("q1", "capital of France"),
                record("q2", "tallest mountain")
            ]
        );
        assert!(parse_records("")?.is_empty());

        Ok(())
    }

    #[test]
    fn test_parse_records_rejects_bad_lines() {
        let cases = [
            ("{\"id\":\"q1\",\"query\":\"a\"}\nnot json\n", 2),
            ("{\"id\":\"q1\",\"query\":\"a\"}\n\n{\"id\":\"q2\",\"query\":\"b\"}", 2),
            ("{\"id\":\"q1\"}", 1),
            ("{\"id\":\"q1\",\"query\":\"\"}", 1),
            ("{\"id\":\"../q1\",\"query\":\"a\"}", 1),
            ("{\"id\":\"q1\",\"query\":\"a\"}\n{\"id\":\"q1\",\"query\":\"b\"}", 2),
        ];

        for (input, expected_line) in cases {
            match parse_records(input) {
                Err(Error::InputFormatError { line, .. }) => assert_eq!(line, expected_line, "{}", input),
                _ => panic!("{} should be rejected", input),
            }
        }
    }

    #[tokio::test]
    async fn test_successful_batch() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let factory = MockFactory::default()
            .with("capital of France", Outcome::Report("Paris is..."))
            .with("tallest mountain", Outcome::Report("Everest is..."));

        let completed = runner(factory, &dir, 8)
            .run(vec![
                record("q1", "capital of France"),
                record("q2", "tallest mountain"),
            ])
            .await?;

        assert_eq!(completed, 2);
        assert_eq!(std::fs::read_to_string(dir.path().join("q1.q"))?, "capital of France");
        assert_eq!(std::fs::read_to_string(dir.path().join("q1.a"))?, "Paris is...");
        assert_eq!(std::fs::read_to_string(dir.path().join("q2.q"))?, "tallest mountain");
        assert_eq!(std::fs::read_to_string(dir.path().join("q2.a"))?, "Everest is...");
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 4);

        Ok(())
    }

    #[tokio::test]
    async fn test_no_sources_aborts_batch() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let factory = MockFactory::default()
            .with("capital of France", Outcome::Report("Paris is..."))
            .with("unanswerable", Outcome::NoSources);

        let result = runner(factory, &dir, 8)
            .run(vec![
                record("q1", "capital of France"),
                record("q2", "unanswerable"),
            ])
            .await;

        assert!(matches!(result, Err(Error::NoSourcesError(query)) if query == "unanswerable"));
        assert!(dir.path().join("q1.q").exists());
        assert!(dir.path().join("q2.q").exists());
        assert!(!dir.path().join("q2.a").exists());

        Ok(())
    }

    #[tokio::test]
    async fn test_pipeline_error_aborts_batch() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let factory = MockFactory::default().with("capital of France", Outcome::Fail);

        let result = runner(factory, &dir, 1)
            .run(vec![record("q1", "capital of France")])
            .await;

        assert!(matches!(result, Err(Error::AgentWorkflowError(_))));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("q1.q"))?,
            "capital of France"
        );
        assert!(!dir.path().join("q1.a").exists());

        Ok(())
    }

    #[tokio::test]
    async fn test_concurrency_bound() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let factory = MockFactory::default();
        let gauge = factory.gauge.clone();

        let records = (0..10)
            .map(|i| record(&format!("q{}", i), &format!("query {}", i)))
            .collect::<Vec<_>>();

        let completed = runner(factory, &dir, 3).run(records).await?;

        assert_eq!(completed, 10);
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 3);
        assert_eq!(gauge.researching.load(Ordering::SeqCst), 0);

        Ok(())
    }
}
