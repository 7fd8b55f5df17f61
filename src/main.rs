//! KleinValue — LLM fair-value estimates for marketplace listings
//!
//! Entry point. Loads configuration, initialises structured logging and
//! dispatches one of the CLI commands: estimate a listing, list the
//! models a provider offers, or show the analysis history.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kleinvalue::config::{self, AppConfig};
use kleinvalue::error::EstimatorError;
use kleinvalue::llm::catalog;
use kleinvalue::llm::factory::EstimatorFactory;
use kleinvalue::storage;
use kleinvalue::types::{Listing, ProviderId};

#[derive(Parser, Debug)]
#[command(
    name = "kleinvalue",
    version,
    about = "AI fair-value estimates for marketplace listings"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (TOML); defaults apply when it does not exist
    #[arg(long, global = true, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Estimate the fair value of a listing stored as JSON
    Estimate {
        /// Listing JSON file (camelCase fields as scraped)
        listing: PathBuf,

        /// Provider to use instead of the configured one
        #[arg(long)]
        provider: Option<ProviderId>,

        /// Model to use instead of the configured one
        #[arg(long)]
        model: Option<String>,

        /// Record the result in the analysis history
        #[arg(long)]
        save: bool,

        /// Print the estimation as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the models available to the configured key
    Models {
        #[arg(long)]
        provider: Option<ProviderId>,

        #[arg(long)]
        json: bool,
    },
    /// Show or clear the analysis history
    History {
        #[arg(long)]
        clear: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let cli = Cli::parse();
    let mut cfg = AppConfig::load_or_default(&cli.config)?;

    match cli.command {
        Command::Estimate {
            listing,
            provider,
            model,
            save,
            json,
        } => {
            if let Some(provider) = provider {
                // A provider switch without a model means that provider's default.
                cfg.estimator.provider = provider.to_string();
                cfg.estimator.model_name = None;
            }
            if model.is_some() {
                cfg.estimator.model_name = model;
            }
            run_estimate(&cfg, &listing, save, json).await
        }
        Command::Models { provider, json } => run_models(&cfg, provider, json).await,
        Command::History { clear } => run_history(&cfg, clear),
    }
}

async fn run_estimate(cfg: &AppConfig, listing_path: &Path, save: bool, json: bool) -> Result<()> {
    let raw = std::fs::read_to_string(listing_path)
        .with_context(|| format!("Failed to read listing {}", listing_path.display()))?;
    let listing: Listing = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse listing {}", listing_path.display()))?;

    let factory = EstimatorFactory::new(cfg.http_options());
    let estimator = factory
        .get_estimator(cfg)
        .await
        .map_err(|e| with_key_hint(cfg, e))?;

    info!(
        listing = %listing,
        provider = %estimator.provider(),
        model = estimator.model_name(),
        "Estimating listing"
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling estimate");
            on_interrupt.cancel();
        }
    });

    let estimation = estimator.estimate_value_with_cancel(&listing, &cancel).await;
    let good_value = listing.is_good_value(&estimation);

    if json {
        println!("{}", serde_json::to_string_pretty(&estimation)?);
    } else {
        println!("{listing}");
        println!("{estimation}");
        if !estimation.error {
            println!("{}", estimation.reasoning);
        }
        if good_value {
            println!("Good value: estimate is above the asking price");
        }
    }

    if save {
        let item = storage::save_item(&cfg.storage.history_path, &listing, &estimation)?;
        info!(id = %item.id, path = %cfg.storage.history_path.display(), "Saved to history");
    }

    if estimation.error {
        anyhow::bail!(
            "Estimation failed: {}",
            estimation.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn run_models(cfg: &AppConfig, provider: Option<ProviderId>, json: bool) -> Result<()> {
    let provider = match provider {
        Some(p) => p,
        None => cfg.request_settings()?.provider,
    };
    let meta = provider.meta();

    // Without a key the live catalog is out of reach; show the built-in picks.
    let Some(key) = cfg.api_key_for(provider) else {
        println!("{}: {}", meta.name, meta.tagline);
        for model in meta.suggested_models {
            println!("  {:<40} {}", model.id, model.label);
        }
        println!();
        println!("{}", meta.key_hint(&cfg.provider(provider).api_key_env));
        return Ok(());
    };

    let models = catalog::fetch_models(&cfg.http_options(), provider, &key).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    println!("{} ({} models): {}", meta.name, models.len(), meta.tagline);
    for model in &models {
        let marker = if model.id == meta.default_model { "*" } else { " " };
        println!("{marker} {:<40} {}", model.id, model.label);
    }
    Ok(())
}

fn run_history(cfg: &AppConfig, clear: bool) -> Result<()> {
    let path = &cfg.storage.history_path;
    if clear {
        storage::clear_items(path)?;
        println!("History cleared");
        return Ok(());
    }

    let items = storage::load_items(path)?;
    if items.is_empty() {
        println!("No analyzed listings yet");
        return Ok(());
    }

    for item in &items {
        let flag = if item.is_good_value { "GOOD" } else { "    " };
        println!(
            "{flag} {} {} | {}",
            item.analyzed_at.format("%Y-%m-%d %H:%M"),
            item.listing,
            item.estimation
        );
    }
    Ok(())
}

/// Attach the "where do I get a key" hint to a missing-key error.
fn with_key_hint(cfg: &AppConfig, err: EstimatorError) -> anyhow::Error {
    match err {
        EstimatorError::MissingApiKey(provider) => {
            let hint = provider.meta().key_hint(&cfg.provider(provider).api_key_env);
            anyhow::Error::new(EstimatorError::MissingApiKey(provider)).context(hint)
        }
        other => other.into(),
    }
}

/// Initialise structured logging.
/// Uses JSON format if KLEINVALUE_LOG_JSON is set, otherwise human-readable.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("kleinvalue=info"));

    let json_logging = std::env::var("KLEINVALUE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
