//! `harvest` - operator CLI for site harvesting and incident geocoding.

mod context;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use harvester::harvest::start_scheduler;
use harvester::{parse_records, DedupStore, HarvestJob, ImportOptions, LimitOverrides};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::context::AppContext;

#[derive(Parser)]
#[command(name = "harvest")]
#[command(about = "Harvest incident sources and geocode incident records")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the configured sites of a country (or `all`)
    Scrape {
        target: String,
        /// Candidate pages per site; `full` or `*` for no limit
        max_pages: Option<String>,
        /// Minimum content length in characters
        min_len: Option<String>,
        /// Visits allowed per wanted page; `full` for no limit
        visit_factor: Option<String>,
        /// Hard ceiling on page visits per site
        #[arg(long)]
        max_visits: Option<String>,
    },

    /// Import incident records (JSON array, object or JSON Lines)
    Import {
        file: PathBuf,
        #[arg(long)]
        country_hint: Option<String>,
        #[arg(long)]
        no_geocode: bool,
    },

    /// Geocode stored incidents that still lack coordinates
    Resolve {
        #[arg(long)]
        country_hint: Option<String>,
    },

    /// Run `scrape all` on a cron schedule until interrupted
    Schedule {
        /// Six-field cron expression (with seconds)
        #[arg(long)]
        cron: Option<String>,
        /// JSON object with max_pages, min_len, visit_factor, max_visits
        #[arg(long)]
        overrides: Option<String>,
    },

    /// Forget every visited URL
    ResetSeen,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,harvester=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let ctx = AppContext::from_env()?;

    match cli.command {
        Commands::Scrape {
            target,
            max_pages,
            min_len,
            visit_factor,
            max_visits,
        } => {
            let overrides = LimitOverrides {
                max_pages: max_pages.map(Into::into),
                min_len: min_len.map(Into::into),
                visit_factor: visit_factor.map(Into::into),
                max_visits: max_visits.map(Into::into),
            };
            scrape(&ctx, HarvestJob::new(target).with_overrides(overrides)).await
        }
        Commands::Import {
            file,
            country_hint,
            no_geocode,
        } => {
            let opts = ImportOptions {
                country_hint,
                geocode: !no_geocode,
            };
            import(&ctx, &file, &opts).await
        }
        Commands::Resolve { country_hint } => resolve(&ctx, country_hint.as_deref()).await,
        Commands::Schedule { cron, overrides } => schedule(&ctx, cron, overrides).await,
        Commands::ResetSeen => reset_seen(&ctx).await,
    }
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping after the current request");
            child.cancel();
        }
    });
    token
}

async fn scrape(ctx: &AppContext, job: HarvestJob) -> Result<()> {
    let harvester = ctx.harvester().await?;
    let report = harvester
        .run(&job, cancel_on_ctrl_c())
        .await
        .with_context(|| format!("Harvest of {} failed", job.target))?;

    print!("{}", report);
    Ok(())
}

async fn import(ctx: &AppContext, file: &Path, opts: &ImportOptions) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let records = parse_records(&text);

    let service = ctx.incidents().await?;
    let summary = service.import_parsed(&records, opts).await;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn resolve(ctx: &AppContext, country_hint: Option<&str>) -> Result<()> {
    let service = ctx.incidents().await?;
    let summary = service
        .resolve_missing(country_hint)
        .await
        .context("Failed to read pending incidents")?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn schedule(ctx: &AppContext, cron: Option<String>, overrides: Option<String>) -> Result<()> {
    let cron = cron.unwrap_or_else(|| ctx.settings.cron.clone());
    let overrides = match overrides {
        Some(raw) => LimitOverrides::from_json(&raw)?,
        None => LimitOverrides::default(),
    };

    let harvester = Arc::new(ctx.harvester().await?);
    let cancel = CancellationToken::new();
    let mut scheduler = start_scheduler(harvester, &cron, overrides, cancel.clone())
        .await
        .context("Failed to start scheduler")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down scheduler");
    cancel.cancel();
    scheduler
        .shutdown()
        .await
        .context("Failed to stop scheduler")?;
    Ok(())
}

async fn reset_seen(ctx: &AppContext) -> Result<()> {
    let store = ctx.dedup_store().await?;
    let forgotten = store.len();
    store
        .reset()
        .await
        .context("Failed to reset seen-URL store")?;

    println!("Forgot {} visited URL(s)", forgotten);
    Ok(())
}
