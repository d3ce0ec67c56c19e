use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use riskwatch_common::{Backend, Config, Record, RecordKind};
use riskwatch_scoring::{FeatureExtractor, RecordScorer, WhatlangDetector};
use riskwatch_scout::{select_backend, FileSink, Pipeline};

#[derive(Parser)]
#[command(name = "riskwatch", about = "Explainable risk scoring for public posts and their authors")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Discover channel posts, score them, enrich their authors and write exports
    Run {
        /// Comma-separated channels (overrides RISKWATCH_CHANNELS)
        #[arg(long, value_delimiter = ',')]
        channels: Option<Vec<String>>,
        /// Output directory (overrides RISKWATCH_DATA_DIR)
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Source backend: reddit or stub (overrides RISKWATCH_BACKEND)
        #[arg(long)]
        backend: Option<Backend>,
        /// Reuse author histories already stored in the data directory
        #[arg(long)]
        skip_known_authors: bool,
    },
    /// Score one piece of text and print the result as JSON
    Score {
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("riskwatch=info".parse()?)
                .add_directive("reddit_client=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command {
        Command::Run {
            channels,
            data_dir,
            backend,
            skip_known_authors,
        } => {
            if let Some(channels) = channels {
                config.channels = channels
                    .into_iter()
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect();
            }
            if let Some(dir) = data_dir {
                config.data_dir = dir;
            }
            if let Some(backend) = backend {
                config.backend = backend;
            }
            if skip_known_authors {
                config.skip_known_authors = true;
            }
            if config.channels.is_empty() {
                anyhow::bail!("at least one channel is required");
            }
            config.validate()?;
            config.log_summary();

            info!("RiskWatch starting...");
            let source = select_backend(&config)?;
            let sink = Arc::new(FileSink::new(config.data_dir.clone())?);
            let report = Pipeline::new(config, source, sink).run().await?;
            println!("{report}");
        }
        Command::Score { text } => {
            let scorer = RecordScorer::new(
                FeatureExtractor::default(),
                config.thresholds,
                Arc::new(WhatlangDetector::new()),
            );
            let record = Record {
                id: "cli".to_string(),
                author: String::new(),
                channel: "cli".to_string(),
                kind: RecordKind::Submission,
                text,
                created_at: Utc::now(),
                permalink: String::new(),
            };
            let scored = scorer.score_record(record);
            println!("{}", serde_json::to_string_pretty(&scored)?);
        }
    }

    Ok(())
}
