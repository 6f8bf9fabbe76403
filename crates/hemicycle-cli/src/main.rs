use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use hemicycle_client::{ReqwestFetcher, WebhookNotifier};
use hemicycle_core::taxonomy::UnclassifiedLabel;
use hemicycle_core::traits::{IngestionStore, Notifier, TracingNotifier};
use hemicycle_core::{
    IngestConfig, IngestionCoordinator, MemoryStore, Resolution, Scheduler, Taxonomy,
};
use hemicycle_db::{Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "hemicycle", version, about = "Parliamentary open-data harvester")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one ingestion cycle and print its report
    Run(PipelineArgs),

    /// Run a cycle now, then at the configured hours until interrupted
    Schedule(PipelineArgs),

    /// Show how a theme label maps onto the taxonomy
    ResolveTheme {
        /// Label as found on a remote page
        label: String,

        /// Path to the theme taxonomy JSON file
        #[arg(short, long, env = "HEMICYCLE_TAXONOMY")]
        taxonomy: PathBuf,
    },
}

#[derive(Args)]
struct PipelineArgs {
    /// Path to the theme taxonomy JSON file
    #[arg(short, long, env = "HEMICYCLE_TAXONOMY")]
    taxonomy: PathBuf,

    /// POST update signals as JSON to this URL
    #[arg(long, env = "HEMICYCLE_WEBHOOK_URL")]
    webhook_url: Option<String>,

    /// Keep records in memory instead of PostgreSQL (no DATABASE_URL needed)
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Once,
    Recurring,
}

/// Webhook when configured, logs otherwise.
enum CliNotifier {
    Webhook(WebhookNotifier),
    Tracing(TracingNotifier),
}

impl Notifier for CliNotifier {
    fn entity_updated(&self, official_id: &str) {
        match self {
            CliNotifier::Webhook(n) => n.entity_updated(official_id),
            CliNotifier::Tracing(n) => n.entity_updated(official_id),
        }
    }

    fn batch_completed(&self, batch: &str, updated: usize) {
        match self {
            CliNotifier::Webhook(n) => n.batch_completed(batch, updated),
            CliNotifier::Tracing(n) => n.batch_completed(batch, updated),
        }
    }

    fn unclassified_label(&self, label: &UnclassifiedLabel) {
        match self {
            CliNotifier::Webhook(n) => n.unclassified_label(label),
            CliNotifier::Tracing(n) => n.unclassified_label(label),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hemicycle=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => cmd_pipeline(args, Mode::Once).await?,
        Commands::Schedule(args) => cmd_pipeline(args, Mode::Recurring).await?,
        Commands::ResolveTheme { label, taxonomy } => cmd_resolve_theme(&label, &taxonomy)?,
    }

    Ok(())
}

fn load_taxonomy(path: &Path) -> Result<Arc<Taxonomy>> {
    let taxonomy = Taxonomy::load(path)
        .with_context(|| format!("Failed to load taxonomy from {}", path.display()))?;
    Ok(Arc::new(taxonomy))
}

async fn cmd_pipeline(args: PipelineArgs, mode: Mode) -> Result<()> {
    let config = IngestConfig::from_env().context("Invalid HEMICYCLE_* configuration")?;
    let taxonomy = load_taxonomy(&args.taxonomy)?;
    let hours = config.schedule_hours.clone();
    let fetcher = ReqwestFetcher::with_timeout(config.request_timeout)
        .context("Failed to create HTTP client")?;

    let notifier = match &args.webhook_url {
        Some(url) => CliNotifier::Webhook(
            WebhookNotifier::new(url).context("Failed to create webhook client")?,
        ),
        None => CliNotifier::Tracing(TracingNotifier),
    };

    if args.dry_run {
        tracing::info!("Dry run: records are kept in memory");
        let store = MemoryStore::new();
        let coordinator = IngestionCoordinator::new(fetcher, store, notifier, taxonomy, config);
        return drive(coordinator, mode, hours).await;
    }

    let db_config = DatabaseConfig::from_env()?;
    let db = Database::connect(&db_config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.context("Failed to run migrations")?;
    let status = db.status().await.context("Database is not usable")?;
    tracing::info!(
        deputies = status.deputies,
        active_deputies = status.active_deputies,
        ballots = status.ballots,
        "Store ready"
    );
    let coordinator = IngestionCoordinator::new(fetcher, db.store(), notifier, taxonomy, config);
    drive(coordinator, mode, hours).await
}

async fn drive<S: IngestionStore>(
    coordinator: IngestionCoordinator<ReqwestFetcher, S, CliNotifier>,
    mode: Mode,
    hours: Vec<u32>,
) -> Result<()> {
    if mode == Mode::Once {
        let report = coordinator.run_cycle().await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            token.cancel();
        }
    });

    Scheduler::new(hours)
        .run(cancel, || coordinator.run_cycle())
        .await;
    Ok(())
}

fn cmd_resolve_theme(label: &str, taxonomy_path: &Path) -> Result<()> {
    let taxonomy = load_taxonomy(taxonomy_path)?;

    match taxonomy.resolve(label, None) {
        Resolution::Matched(node) => {
            println!("{}\t{}", node.id, node.name);
            if let Some(parent) = taxonomy.parent_of(&node) {
                println!("  parent: {}\t{}", parent.id, parent.name);
            }
        }
        Resolution::Unrecognized(unclassified) => {
            println!(
                "Unrecognized ({:?}): {}",
                unclassified.reason, unclassified.raw_text
            );
        }
    }

    Ok(())
}
