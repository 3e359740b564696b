//! CDP CLI - Command-line interface
//!
//! Usage:
//!   cdp run --listings <json> [--prior <json>] [--output <json>]
//!   cdp normalize --type <type> <value>
//!   cdp validate --type <type> <value> [--reality-checks]
//!   cdp config

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cdp_core::{
    CandidateContact, ContactType, ExtractionMethod, ListingPayload, LoggingConfig, Normalizer,
    PipelineConfig, ResolutionStrategy,
};
use cdp_ocr::{OcrManager, TesseractConfig};
use cdp_pipeline::{ContactPipeline, TracingSink};
use cdp_quality::SearchContext;
use cdp_validator::Validator;

#[derive(Parser)]
#[command(name = "cdp")]
#[command(about = "Contact discovery pipeline CLI")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override one setting, e.g. `--set dedup.similarity_threshold=0.85`
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    settings: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a batch over crawled listings
    Run {
        /// JSON array of listing payloads
        #[arg(long)]
        listings: PathBuf,

        /// JSON array of candidates from earlier runs
        #[arg(long)]
        prior: Option<PathBuf>,

        /// Resolution strategy (keep_best, merge, keep_newest, keep_oldest, manual_review)
        #[arg(long)]
        strategy: Option<ResolutionStrategy>,

        /// Search keywords for relevance scoring
        #[arg(long, value_delimiter = ',')]
        keywords: Vec<String>,

        /// Write the full report here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the normalized form of one value
    Normalize {
        #[arg(long = "type")]
        contact_type: ContactType,

        value: String,
    },
    /// Validate one value
    Validate {
        #[arg(long = "type")]
        contact_type: ContactType,

        value: String,

        /// Also resolve the email domain or request the website
        #[arg(long)]
        reality_checks: bool,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref(), &cli.settings)?;
    init_logging(&config.logging);

    match cli.command {
        Commands::Run {
            listings,
            prior,
            strategy,
            keywords,
            output,
        } => run_batch(config, &listings, prior.as_deref(), strategy, keywords, output.as_deref()).await?,
        Commands::Normalize {
            contact_type,
            value,
        } => {
            let normalizer = Normalizer::new(&config.normalization);
            println!("{}", normalizer.normalize(contact_type, &value));
        }
        Commands::Validate {
            contact_type,
            value,
            reality_checks,
        } => validate_value(config, contact_type, value, reality_checks).await,
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

/// File, then environment, then `--set` overrides
fn load_config(path: Option<&Path>, settings: &[String]) -> anyhow::Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    }
    .with_env_override()?;

    for setting in settings {
        let (key, value) = setting
            .split_once('=')
            .with_context(|| format!("expected KEY=VALUE, got {setting:?}"))?;
        config.apply_setting(key.trim(), value.trim())?;
    }

    config.validate()?;
    Ok(config)
}

fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    // stdout is reserved for command output
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    if config.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

async fn run_batch(
    mut config: PipelineConfig,
    listings: &Path,
    prior: Option<&Path>,
    strategy: Option<ResolutionStrategy>,
    keywords: Vec<String>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    if let Some(strategy) = strategy {
        config.resolution.strategy = strategy;
    }

    let listings: Vec<ListingPayload> = read_json(listings)?;
    let prior: Vec<CandidateContact> = match prior {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };

    let ocr_enabled = config.extraction.is_enabled(ExtractionMethod::Ocr);
    let ocr_language = config.extraction.ocr_language.clone();

    let sink = Arc::new(TracingSink::new());
    let mut pipeline = ContactPipeline::new(config)?
        .with_sink(sink.clone())
        .with_observer(sink);
    if ocr_enabled {
        pipeline = pipeline.with_ocr(OcrManager::detect(
            TesseractConfig::default().with_language(ocr_language),
        ));
    }
    if !keywords.is_empty() {
        pipeline = pipeline.with_search_context(SearchContext::new().with_keywords(keywords));
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing running extractors");
            on_signal.cancel();
        }
    });

    let report = pipeline.run(listings, prior, &cancel).await?;
    let rendered = serde_json::to_string_pretty(&report)?;

    match output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("{}", report.summary());
            println!("Report written to {}", path.display());
        }
        None => println!("{rendered}"),
    }

    Ok(())
}

async fn validate_value(
    mut config: PipelineConfig,
    contact_type: ContactType,
    value: String,
    reality_checks: bool,
) {
    if reality_checks {
        config.validation.reality_checks_enabled = true;
    }

    let mut candidate =
        CandidateContact::new(contact_type, value, ExtractionMethod::FreeText, 1.0, "cli");
    Normalizer::new(&config.normalization).apply(&mut candidate);

    let report = Validator::new(&config.validation).validate(&candidate).await;

    println!("{} ({})", report.status, candidate.normalized_value);
    for finding in report.errors.iter().chain(&report.warnings) {
        println!("  {:?} {}: {}", finding.severity, finding.rule, finding.message);
    }
    for outcome in &report.reality_checks {
        println!(
            "  {} {} -> {:?}{}",
            outcome.check,
            outcome.target,
            outcome.status,
            outcome
                .detail
                .as_deref()
                .map(|d| format!(" ({d})"))
                .unwrap_or_default()
        );
    }
}
