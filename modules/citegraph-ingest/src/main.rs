use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info, info_span, Instrument};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use citegraph_common::Config;
use citegraph_graph::{migrate::migrate, GraphClient, GraphWriter, MergeEngine};
use citegraph_ingest::{
    CrawlStateStore, Crawler, Direction, Importer, Pipeline, Pruner, RunStatus, StagingLog, StubReconciler,
    WorksSource,
};
use openalex_client::{OpenAlexClient, RateGate};

#[derive(Parser)]
#[command(name = "citegraph", about = "Incremental OpenAlex crawler and citation-graph loader")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create uniqueness constraints and indexes
    Migrate,
    /// Fetch one page per concept into the staging log
    Crawl {
        #[arg(value_enum)]
        direction: Direction,
    },
    /// Merge the staging log into the graph
    Import {
        #[arg(long, default_value_t = 25)]
        batch_size: usize,
        /// Re-import the failed-batch log instead of the staging log
        #[arg(long)]
        replay_failed: bool,
    },
    /// Fill stub papers from OpenAlex or delete the unresolvable ones
    Reconcile {
        #[arg(long, default_value_t = 1000)]
        max_stubs: usize,
        #[arg(long, default_value_t = 100)]
        lookup_batch: usize,
    },
    /// Delete low-cited papers and the authors they orphan
    Prune {
        #[arg(long, default_value_t = 5)]
        min_citations: u64,
        #[arg(long, default_value_t = 500)]
        batch_size: usize,
    },
    /// Crawl, import, then reconcile until no stubs are left
    Run {
        #[arg(value_enum)]
        direction: Direction,
        #[arg(long, default_value_t = 25)]
        batch_size: usize,
        #[arg(long, default_value_t = 1000)]
        max_stubs: usize,
        #[arg(long, default_value_t = 100)]
        lookup_batch: usize,
        #[arg(long, default_value_t = 10)]
        max_passes: usize,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Migrate => "migrate",
            Command::Crawl { .. } => "crawl",
            Command::Import { .. } => "import",
            Command::Reconcile { .. } => "reconcile",
            Command::Prune { .. } => "prune",
            Command::Run { .. } => "run",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.json) {
        eprintln!("failed to initialise logging: {e}");
        return RunStatus::Failed.exit_code();
    }

    let run_id = Uuid::new_v4();
    let span = info_span!("citegraph", %run_id, command = cli.command.name());
    let status = async {
        match execute(cli.command).await {
            Ok(status) => {
                info!(%status, code = status.code(), "Done");
                status
            }
            Err(e) => {
                let status = RunStatus::from_error(&e);
                error!(%status, code = status.code(), "{e:#}");
                status
            }
        }
    }
    .instrument(span)
    .await;

    status.exit_code()
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("citegraph=info".parse()?)
        .add_directive("openalex_client=info".parse()?);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn execute(command: Command) -> Result<RunStatus> {
    let config = Config::from_env()?;
    config.log_redacted();

    match command {
        Command::Migrate => {
            let client = connect(&config).await?;
            migrate(&client).await.context("running schema migrations")?;
            Ok(RunStatus::Completed)
        }
        Command::Crawl { direction } => {
            let stats = crawler(&config)?.run(direction).await?;
            info!("{stats}");
            Ok(stats.status())
        }
        Command::Import {
            batch_size,
            replay_failed,
        } => {
            let engine = merge_engine(&config).await?;
            let importer = importer(&config, engine, batch_size);
            let stats = if replay_failed {
                importer.replay_failed().await?
            } else {
                importer.drain().await?
            };
            info!("{stats}");
            Ok(stats.status())
        }
        Command::Reconcile {
            max_stubs,
            lookup_batch,
        } => {
            let source = upstream(&config)?;
            let engine = merge_engine(&config).await?;
            let stats = StubReconciler::new(source, engine, lookup_batch)
                .reconcile(max_stubs)
                .await?;
            info!("{stats}");
            Ok(stats.status())
        }
        Command::Prune {
            min_citations,
            batch_size,
        } => {
            let engine = merge_engine(&config).await?;
            let stats = Pruner::new(engine.store().clone())
                .prune(min_citations, batch_size)
                .await?;
            info!("{stats}");
            Ok(stats.status())
        }
        Command::Run {
            direction,
            batch_size,
            max_stubs,
            lookup_batch,
            max_passes,
        } => {
            let source = upstream(&config)?;
            let engine = merge_engine(&config).await?;
            let pipeline = Pipeline {
                crawler: Crawler::new(
                    source.clone(),
                    StagingLog::new(config.staging_path()),
                    CrawlStateStore::new(config.crawl_state_path.clone()),
                ),
                importer: importer(&config, engine.clone(), batch_size),
                reconciler: StubReconciler::new(source, engine, lookup_batch),
                max_stubs,
                max_passes,
            };
            pipeline.run(direction, Utc::now().date_naive()).await
        }
    }
}

fn upstream(config: &Config) -> Result<Arc<dyn WorksSource>> {
    let mailto = config.require_mailto()?;
    let client = OpenAlexClient::new(mailto, RateGate::new(config.openalex_min_interval))?
        .with_base_url(config.openalex_base_url.clone());
    Ok(Arc::new(client))
}

fn crawler(config: &Config) -> Result<Crawler> {
    Ok(Crawler::new(
        upstream(config)?,
        StagingLog::new(config.staging_path()),
        CrawlStateStore::new(config.crawl_state_path.clone()),
    ))
}

fn importer(config: &Config, engine: MergeEngine, batch_size: usize) -> Importer {
    Importer::new(
        engine,
        StagingLog::new(config.staging_path()),
        StagingLog::new(config.failed_path()),
        batch_size,
    )
}

async fn connect(config: &Config) -> Result<GraphClient> {
    let (uri, user, password) = config.require_neo4j()?;
    GraphClient::connect(uri, user, password)
        .await
        .with_context(|| format!("connecting to Neo4j at {uri}"))
}

async fn merge_engine(config: &Config) -> Result<MergeEngine> {
    let client = connect(config).await?;
    Ok(MergeEngine::new(Arc::new(GraphWriter::new(client))))
}
