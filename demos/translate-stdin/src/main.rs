mod engine;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use hibachi_translate::{
    ComputeResource,
    EngineError,
    InputFormat,
    Protocol,
    RuleSplitter,
    ServiceConfig,
    TranslationOptions,
    TranslationService,
};
use tokio::io::AsyncReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::engine::ReverseWords;

/// Translate stdin through the batching service with a toy engine
#[derive(Parser)]
#[command(name = "translate-stdin")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Maximum time (ms) an underfull batch waits for more sentences
    #[arg(long, default_value = "100")]
    queue_timeout: u64,

    /// Number of CPU workers (default: available parallelism)
    #[arg(long)]
    max_workers: Option<usize>,

    /// Maximum sentences per batch
    #[arg(long, default_value = "32")]
    max_batch: usize,

    /// Moses-style nonbreaking prefix file for sentence splitting
    #[arg(long)]
    ssplit_prefix_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "wrapped-text")]
    input_format: Format,

    /// Hypotheses to print per sentence
    #[arg(long, default_value = "1")]
    n_best: usize,

    /// Print the response as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Sentence,
    Paragraph,
    WrappedText,
}

impl From<Format> for InputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Sentence => InputFormat::Sentence,
            Format::Paragraph => InputFormat::Paragraph,
            Format::WrappedText => InputFormat::WrappedText,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hibachi_translate=info,translate_stdin=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = ServiceConfig::default()
        .with_queue_timeout_ms(cli.queue_timeout)
        .with_max_batch_sentences(cli.max_batch);
    if let Some(workers) = cli.max_workers {
        config = config.with_max_workers(workers);
    }

    let splitter = match &cli.ssplit_prefix_file {
        Some(path) => RuleSplitter::from_prefix_file(path)
            .with_context(|| format!("reading prefix file {}", path.display()))?,
        None => RuleSplitter::english(),
    };

    let service = TranslationService::start(config, splitter, |resource: ComputeResource| {
        Ok::<_, EngineError>(ReverseWords::new(resource))
    })?;

    let mut text = String::new();
    tokio::io::stdin()
        .read_to_string(&mut text)
        .await
        .context("reading stdin")?;

    let options = TranslationOptions::default()
        .with_n_best(cli.n_best)
        .with_input_format(cli.input_format.into());
    let result = service.submit(&text, options, Protocol::Bergamot).await.await;
    service.shutdown().await;

    let translation = result?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&translation)?);
    } else {
        for sentence in &translation.sentences {
            for hypothesis in &sentence.hypotheses {
                println!("{}\t{:.2}", hypothesis.text, hypothesis.score);
            }
        }
    }

    let stats = service.stats();
    tracing::info!(
        sentences = translation.sentences.len(),
        batches = stats.batches_dispatched,
        "done"
    );
    Ok(())
}
