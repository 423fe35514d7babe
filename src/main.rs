use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

use disaster_pipeline::app::ports::{DocumentFetcher, RecordStore, ValidationSink};
use disaster_pipeline::app::{RunOutcome, ValidationUseCase};
use disaster_pipeline::config::Config;
use disaster_pipeline::db::SqliteStore;
use disaster_pipeline::infra::{FixtureFetcher, ReqwestFetcher};
use disaster_pipeline::pipeline::{cancellation, CancelHandle, Pipeline};
use disaster_pipeline::strategies::create_strategy;
use disaster_pipeline::{logging, metrics};

#[derive(Parser)]
#[command(name = "disaster_pipeline")]
#[command(about = "Disaster declaration crawler with dual-pipeline cross validation")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration (defaults to ./pipeline.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serve pages from a captured `url -> html` JSON file instead of the network
    #[arg(long, global = true)]
    fixtures: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run both pipelines, record the validation run, and commit on pass
    Validate {
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a single pipeline and print its result without storing anything
    Crawl {
        /// Extraction strategy: table_rows or anchor_scan
        #[arg(long, default_value = "table_rows")]
        strategy: String,
        /// Write the result to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List active declarations in the canonical store
    Active {
        #[arg(long)]
        json: bool,
    },
    /// Show recent validation runs from the audit log
    Runs {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn build_fetcher(cli: &Cli, config: &Config) -> Result<Arc<dyn DocumentFetcher>> {
    match &cli.fixtures {
        Some(path) => {
            let fetcher = FixtureFetcher::from_json_file(path)
                .with_context(|| format!("loading fixtures from {}", path.display()))?;
            info!(path = %path.display(), "Serving pages from fixtures");
            Ok(Arc::new(fetcher))
        }
        None => Ok(Arc::new(ReqwestFetcher::new(
            &config.source.user_agent,
            config.pipeline.request_timeout(),
        )?)),
    }
}

// Operator abort: stop issuing new work and let in-flight fetches settle
fn cancel_on_ctrl_c(handle: CancelHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            handle.cancel();
        }
    });
}

async fn validate(cli: &Cli, config: &Config, json: bool) -> Result<ExitCode> {
    let fetcher = build_fetcher(cli, config)?;
    let store = Arc::new(SqliteStore::open(&config.store.path)?);
    let use_case = ValidationUseCase::from_config(config, fetcher, store)?;

    let (handle, token) = cancellation();
    cancel_on_ctrl_c(handle);

    let outcome = use_case.run_validation(token).await?;
    let report = outcome.report();

    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("\n📊 Validation run {}", report.run_id);
        println!("   Records compared: {}", report.records_compared);
        println!(
            "   Active: {} ({}) / {} ({})",
            report.active_count_a, report.result_a.strategy, report.active_count_b, report.result_b.strategy
        );
        for (state, counts) in report.active_by_state.iter().filter(|(_, c)| c.differs()) {
            println!("   Active in {}: {} / {}", state.as_str(), counts.a, counts.b);
        }
        println!("   Discrepancies: {} ({} high)", report.discrepancies.len(), report.high_severity_count());
        println!("   Confidence: {:.1} (threshold {:.1})", report.confidence_score, report.threshold);
        println!("   Needs review: {}", report.needs_review.len());
        for reason in &report.fail_reasons {
            println!("   ❌ {:?}", reason);
        }
    }

    match outcome {
        RunOutcome::Committed { summary, .. } => {
            println!(
                "✅ Committed: {} inserted, {} replaced, {} unchanged",
                summary.inserted, summary.replaced, summary.unchanged
            );
            Ok(ExitCode::SUCCESS)
        }
        RunOutcome::DiscrepancyThresholdExceeded { .. } => {
            println!("⚠️  Verdict: fail, commit withheld");
            Ok(ExitCode::from(2))
        }
    }
}

async fn crawl(cli: &Cli, config: &Config, strategy: &str, output: Option<&PathBuf>) -> Result<ExitCode> {
    let fetcher = build_fetcher(cli, config)?;
    let pipeline = Pipeline::new(
        create_strategy(strategy)?,
        fetcher,
        config.source.listing_url.clone(),
        config.pipeline.clone(),
    );

    let (handle, token) = cancellation();
    cancel_on_ctrl_c(handle);
    let result = pipeline.run(token).await;

    let body = serde_json::to_string_pretty(&result)?;
    match output {
        Some(path) => {
            std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
            println!(
                "💾 {} records ({} active, {} need review, {} errors, partial: {}) written to {}",
                result.records.len(),
                result.active_count(),
                result.needs_review_count(),
                result.errors.len(),
                result.partial,
                path.display()
            );
        }
        None => println!("{body}"),
    }
    Ok(ExitCode::SUCCESS)
}

async fn active(config: &Config, json: bool) -> Result<ExitCode> {
    let store = SqliteStore::open(&config.store.path)?;
    let records = store.list_active().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        for r in &records {
            println!(
                "{}  {:<4} {:<12} {}",
                r.reference_id,
                r.state_code.map(|s| s.as_str()).unwrap_or("?"),
                r.disaster_type.as_str(),
                r.event_name
            );
        }
        println!("{} active declarations", records.len());
    }
    Ok(ExitCode::SUCCESS)
}

async fn runs(config: &Config, limit: usize) -> Result<ExitCode> {
    let store = SqliteStore::open(&config.store.path)?;
    for run in store.recent_runs(limit).await? {
        println!(
            "{}  {}  {:<4}  {:.1}",
            run.created_at.format("%Y-%m-%d %H:%M:%S"),
            run.run_id,
            run.verdict,
            run.confidence_score
        );
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv::dotenv().ok();
    let _guard = logging::init_logging();
    metrics::init_metrics();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let outcome = match &cli.command {
        Commands::Validate { json } => validate(&cli, &config, *json).await,
        Commands::Crawl { strategy, output } => crawl(&cli, &config, strategy, output.as_ref()).await,
        Commands::Active { json } => active(&config, *json).await,
        Commands::Runs { limit } => runs(&config, *limit).await,
    };

    if let Err(e) = &outcome {
        error!(error = %e, "Command failed");
    }
    outcome
}
