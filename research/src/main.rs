mod batch;
mod config;
mod research;

use agent::Result;
use agent::retriever::RetrieverConfig;
use clap::Parser;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Runs a research report for every query in a JSONL file.
#[derive(Debug, Parser)]
#[command(name = "research", version)]
struct Args {
    /// Path to JSONL file with one {"id", "query"} object per line
    #[arg(short, long)]
    input: PathBuf,

    /// Parallel research tasks
    #[arg(short, long, default_value = "8")]
    concurrency: NonZeroUsize,

    /// Directory receiving <id>.q and <id>.a files
    #[arg(short, long, default_value = "GPTResearcher_custom")]
    output_dir: PathBuf,

    /// Research pipeline settings
    #[arg(long, default_value = "gptr_config.json")]
    config: PathBuf,

    #[arg(long, value_enum, default_value_t = research::ReportType::ResearchReport)]
    report_type: research::ReportType,
}

async fn run(args: Args) -> Result<usize> {
    let config = config::ResearchConfig::load(&args.config)?;
    let retriever = RetrieverConfig::from_env()?;

    let mut llm = agent::llm::OpenAI::new(config.model()?).with_temperature(config.temperature);
    if let Some(api_base) = &config.openai_base_url {
        llm = llm.with_api_base(api_base);
    }

    let factory = research::ResearcherFactory::new(args.report_type, config, Arc::new(llm), retriever);

    let records = batch::read_records(&args.input)?;

    batch::BatchRunner::new(Arc::new(factory), args.output_dir, args.concurrency)
        .run(records)
        .await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    exit_code(&run(Args::parse()).await)
}

/// Any error aborts the whole batch with a failing status.
fn exit_code(outcome: &Result<usize>) -> ExitCode {
    match outcome {
        Ok(completed) => {
            info!(completed, "batch finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("batch aborted: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::exit_code;
    use agent::Error;
    use std::process::ExitCode;

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code(&Ok(2)), ExitCode::SUCCESS);
        assert_eq!(exit_code(&Ok(0)), ExitCode::SUCCESS);
        assert_eq!(
            exit_code(&Err(Error::NoSourcesError("capital of France".to_string()))),
            ExitCode::FAILURE
        );
        assert_eq!(
            exit_code(&Err(Error::DecodeError("invalid base64".to_string()))),
            ExitCode::FAILURE
        );
    }
}
