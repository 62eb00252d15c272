//! Command-line entry point
//!
//! Results are printed as JSON on stdout; logs go to stderr and the
//! optional log file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use price_tracker_lib::application::{AggregateStats, CrawlOrchestrator, CrawlRun, ResultEvaluator};
use price_tracker_lib::domain::{DocumentStore, RangeQuery, RunReport};
use price_tracker_lib::infrastructure::config::{AppConfig, SinkKind};
use price_tracker_lib::infrastructure::{
    CsvDocumentStore, DatabaseConnection, ElasticsearchStore, HttpClient, HttpClientConfig,
    InMemoryDocumentStore, SqliteCatalogSource, init_logging,
};

#[derive(Parser)]
#[command(name = "price-tracker")]
#[command(about = "Crawl marketplace search results and index time-stamped price records", version)]
struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Keep records in memory instead of writing them to the store
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl one free-text search term
    Search { term: String },

    /// Crawl every active item of the catalog database
    Catalog,

    /// Statistics over stored records
    Evaluate {
        /// Only records produced by this search term
        #[arg(long)]
        term: Option<String>,
        #[arg(long)]
        days: Option<u32>,
    },

    /// Price points over time for listings matching a title
    Evolution {
        title: String,
        #[arg(long)]
        days: Option<u32>,
    },
}

#[derive(Serialize)]
struct RunOutput {
    report: RunReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<AggregateStats>,
}

fn output<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

impl Commands {
    /// Commands that read stored records instead of producing new ones
    const fn reads_store(&self) -> bool {
        matches!(self, Self::Evaluate { .. } | Self::Evolution { .. })
    }
}

fn open_store(config: &AppConfig, reads_store: bool) -> Result<Arc<dyn DocumentStore>> {
    Ok(match config.crawl.sink {
        SinkKind::Store => Arc::new(ElasticsearchStore::from_config(&config.store)?),
        SinkKind::Memory => Arc::new(InMemoryDocumentStore::new()),
        SinkKind::Csv => {
            if reads_store && config.csv.path.is_none() {
                bail!("csv.path must be set to read records back from CSV output");
            }
            Arc::new(CsvDocumentStore::create(config.csv.output_path(Utc::now()))?)
        }
    })
}

fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupt received, finishing current step and flushing");
            child.cancel();
        }
    });
    token
}

fn run_output(run: CrawlRun, evaluator: Option<&ResultEvaluator>) -> RunOutput {
    RunOutput {
        stats: evaluator.map(|e| e.evaluate(&run.batch.records)),
        report: run.report,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        AppConfig::load_unvalidated(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.dry_run {
        config.crawl.sink = SinkKind::Memory;
    }
    config.validate()?;
    let config = Arc::new(config);

    init_logging(&config.logging)?;
    info!("price-tracker {} starting", env!("CARGO_PKG_VERSION"));

    let store = open_store(&config, cli.command.reads_store())?;
    let evaluator = ResultEvaluator::new(&config.evaluator);
    // in-memory batches are evaluated right away, nothing else will read them
    let batch_evaluator = (config.crawl.sink == SinkKind::Memory).then_some(&evaluator);

    match cli.command {
        Commands::Search { term } => {
            let http = Arc::new(HttpClient::new(HttpClientConfig::from(config.as_ref()))?);
            let orchestrator = CrawlOrchestrator::new(config.clone(), http, store)?;
            let run = orchestrator.run_term(&term, &shutdown_token()).await;
            output(&run_output(run, batch_evaluator))?;
        }
        Commands::Catalog => {
            let database_url = config
                .catalog
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow!("catalog.database_url is not configured"))?;
            let db = DatabaseConnection::new(database_url).await?;
            db.migrate().await?;
            let catalog = SqliteCatalogSource::new(db.pool().clone());

            let http = Arc::new(HttpClient::new(HttpClientConfig::from(config.as_ref()))?);
            let orchestrator = CrawlOrchestrator::new(config.clone(), http, store)?;
            let run = orchestrator.run_catalog(&catalog, &shutdown_token()).await?;
            output(&run_output(run, batch_evaluator))?;
        }
        Commands::Evaluate { term, days } => {
            let window = days.unwrap_or(config.evaluator.evolution_window_days);
            let mut query = RangeQuery::last_days(window);
            if let Some(term) = term {
                query = query.with_search_term(term);
            }
            let stats = evaluator.evaluate_range(store.as_ref(), &query).await?;
            output(&stats)?;
        }
        Commands::Evolution { title, days } => {
            let points = evaluator.price_evolution(store.as_ref(), &title, days).await?;
            output(&points)?;
        }
    }

    Ok(())
}
