#![allow(clippy::multiple_crate_versions)]

use anyhow::{bail, Context};
use bergamot_models::config::Config;
use bergamot_models::engine::{ProcessEngine, ResponseOptions, ServiceConfig, TranslationEngine};
use bergamot_models::models::Aggregator;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bergamot")]
#[command(about = "Download and run Bergamot translation models", long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/bergamot/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate standard input; two models pivot through the first's target
    Translate {
        /// Model code, given once or twice
        #[arg(short = 'm', long = "model", required = true, num_args = 1..=2)]
        models: Vec<String>,
        /// Provider to take the models from
        #[arg(short, long)]
        repository: Option<String>,
        #[arg(long)]
        num_workers: Option<usize>,
        #[arg(long)]
        log_level: Option<String>,
        /// Input is HTML
        #[arg(long)]
        html: bool,
        #[arg(long)]
        alignment: bool,
        #[arg(long)]
        quality_scores: bool,
    },
    /// Download one model, or every model the provider lists
    Download {
        #[arg(short, long)]
        model: Option<String>,
        #[arg(short, long)]
        repository: Option<String>,
    },
    /// List downloaded models
    Ls {
        #[arg(short, long)]
        repository: Option<String>,
        /// Include models that are not downloaded yet
        #[arg(long)]
        all: bool,
    },
    /// List registered providers
    Providers,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;
    let aggregator = Aggregator::from_config(&config)?;

    tokio::select! {
        result = run(cli.command, &config, &aggregator) => result,
        _ = tokio::signal::ctrl_c() => bail!("Interrupted"),
    }
}

async fn run(command: Commands, config: &Config, aggregator: &Aggregator) -> anyhow::Result<()> {
    match command {
        Commands::Translate {
            models,
            repository,
            num_workers,
            log_level,
            html,
            alignment,
            quality_scores,
        } => {
            let provider = repository
                .as_deref()
                .unwrap_or_else(|| aggregator.default_provider());

            let mut service = ServiceConfig::from(&config.engine);
            if let Some(num_workers) = num_workers {
                service.num_workers = num_workers;
            }
            if let Some(log_level) = log_level {
                service.log_level = log_level;
            }
            let options = ResponseOptions {
                alignment,
                quality_scores,
                html,
            };

            translate(aggregator, provider, &models, service, &config.engine.binary, options).await
        }
        Commands::Download { model, repository } => {
            let provider = repository
                .as_deref()
                .unwrap_or_else(|| aggregator.default_provider());
            aggregator.update(provider).await?;

            let codes = match model {
                Some(code) => vec![code],
                None => aggregator.models(provider, false)?,
            };
            for code in codes {
                aggregator.download(provider, &code).await?;
                println!(
                    "✓ {code} ready at {}",
                    aggregator.model_config_path(provider, &code)?.display()
                );
            }
            Ok(())
        }
        Commands::Ls { repository, all } => {
            let provider = repository
                .as_deref()
                .unwrap_or_else(|| aggregator.default_provider());
            aggregator.update(provider).await?;

            println!("Available models: ");
            for (counter, code) in aggregator.models(provider, !all)?.iter().enumerate() {
                let entry = aggregator.model(provider, code)?;
                println!(" {:>4}. {} {}", counter + 1, entry.code, entry.name);
            }
            println!();
            Ok(())
        }
        Commands::Providers => {
            let default = aggregator.default_provider();
            for name in aggregator.available() {
                let marker = if name == default { "*" } else { " " };
                println!("{marker} {name}");
            }
            Ok(())
        }
    }
}

async fn translate(
    aggregator: &Aggregator,
    provider: &str,
    codes: &[String],
    service: ServiceConfig,
    binary: &str,
    options: ResponseOptions,
) -> anyhow::Result<()> {
    let engine = ProcessEngine::new(binary, service)?;

    let mut models = Vec::with_capacity(codes.len());
    for code in codes {
        let config_path = aggregator.model_config_path(provider, code)?;
        let model = engine
            .load_model(&config_path)
            .await
            .with_context(|| format!("Model '{code}' is not available from '{provider}'"))?;
        models.push(model);
    }

    let mut source = String::new();
    tokio::io::stdin()
        .read_to_string(&mut source)
        .await
        .context("Failed to read standard input")?;
    let inputs = [source];

    let responses = match models.as_slice() {
        [model] => engine.translate(model, &inputs, &options).await?,
        [first, second] => engine.pivot(first, second, &inputs, &options).await?,
        _ => bail!("Expected one or two models, got {}", models.len()),
    };

    for response in responses {
        print!("{}", response.target);
        if let Some(scores) = response.quality_scores {
            eprintln!("quality: {scores:?}");
        }
        if let Some(alignments) = response.alignments {
            eprintln!("alignments: {alignments:?}");
        }
    }
    Ok(())
}
