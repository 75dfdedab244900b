//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use pricebot_core::{
    CancelSignal, ProductOutcome, ProductReport, ProgressReporter, RunSummary, run_pipeline,
};
use pricebot_shared::{
    AppConfig, Product, SourceKind, StorageConfig, init_config, load_config, load_config_from,
    validate_config, validate_credentials,
};
use pricebot_sources::SourceRegistry;
use pricebot_storage::{LibsqlStore, Store};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// pricebot: aggregate supermarket prices into one record per product.
#[derive(Parser)]
#[command(
    name = "pricebot",
    version,
    about = "Collect product prices from several retailers and merge them into the price store.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.pricebot/pricebot.toml).
    #[arg(long, global = true, env = "PRICEBOT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the pipeline once over the whole catalog.
    Run {
        /// Local database file, overriding the configured backend.
        #[arg(long)]
        db: Option<PathBuf>,

        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print stored price records.
    Show {
        /// Product id (all records when omitted).
        id: Option<String>,

        /// Local database file, overriding the configured backend.
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// List the configured sources and the product catalog.
    Sources,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

const CRATES: &[&str] = &[
    "pricebot",
    "pricebot_core",
    "pricebot_sources",
    "pricebot_storage",
    "pricebot_shared",
];

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let directives = CRATES
        .iter()
        .map(|c| format!("{c}={level}"))
        .collect::<Vec<_>>()
        .join(",");

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run { db, json } => cmd_run(config_path, db.as_deref(), json).await,
        Command::Show { id, db } => cmd_show(config_path, id.as_deref(), db.as_deref()).await,
        Command::Sources => cmd_sources(config_path),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Open the configured backend, or a local file when `db` is given.
async fn open_store(storage: &StorageConfig, db: Option<&Path>, readonly: bool) -> Result<LibsqlStore> {
    if let Some(path) = db {
        return open_local(path, readonly).await;
    }
    match &storage.remote_url {
        Some(url) => {
            validate_credentials(storage)?;
            let token = std::env::var(&storage.auth_token_env)?;
            info!(%url, "connecting to remote price store");
            Ok(LibsqlStore::open_remote(url, &token).await?)
        }
        None => open_local(Path::new(&storage.db_path), readonly).await,
    }
}

async fn open_local(path: &Path, readonly: bool) -> Result<LibsqlStore> {
    let store = if readonly {
        LibsqlStore::open_readonly(path).await?
    } else {
        LibsqlStore::open(path).await?
    };
    Ok(store)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config_path: Option<&Path>, db: Option<&Path>, json: bool) -> Result<()> {
    let config = resolve_config(config_path)?;
    // Fail on a bad config before touching the backend.
    validate_config(&config)?;
    let store: Arc<dyn Store> = Arc::new(open_store(&config.storage, db, false).await?);

    let cancel = CancelSignal::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            trigger.cancel();
        }
    });

    info!(
        products = config.products.len(),
        sources = config.sources.len(),
        collection = %config.pipeline.collection,
        "starting run"
    );

    let summary = if json {
        run_pipeline(&config, store, &cancel, &pricebot_core::SilentProgress).await?
    } else {
        let reporter = CliProgress::new();
        run_pipeline(&config, store, &cancel, &reporter).await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    if summary.cancelled {
        return Err(eyre!(
            "run cancelled, {} product(s) not attempted",
            summary.not_attempted
        ));
    }
    if summary.failed > 0 {
        return Err(eyre!("{} product(s) could not be written", summary.failed));
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("  Run:       {}", summary.run_id);
    println!("  Succeeded: {}", summary.succeeded);
    println!("  Partial:   {}", summary.partial);
    println!("  Failed:    {}", summary.failed);
    for f in &summary.failed_products {
        println!("    {} ({}): {}", f.product_id, f.kind, f.message);
    }
    if !summary.warnings.is_empty() {
        println!("  No prices: {}", summary.warnings.join(", "));
    }
    if summary.cancelled {
        println!("  Cancelled: {} not attempted", summary.not_attempted);
    }
    println!("  Time:      {:.1}s", summary.elapsed_ms as f64 / 1000.0);
    println!();
}

async fn cmd_show(config_path: Option<&Path>, id: Option<&str>, db: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let store = open_store(&config.storage, db, true).await?;
    let collection = &config.pipeline.collection;

    match id {
        Some(id) => {
            let body = store
                .get(collection, id)
                .await?
                .ok_or_else(|| eyre!("no record '{id}' in collection '{collection}'"))?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        None => {
            let docs = store.list(collection).await?;
            if docs.is_empty() {
                println!("No records in '{collection}'.");
            }
            for (_, body) in docs {
                println!("{}", serde_json::to_string_pretty(&body)?);
            }
        }
    }
    Ok(())
}

fn cmd_sources(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    validate_config(&config)?;
    let registry = SourceRegistry::from_config(&config)?;

    println!("Sources (record order):");
    for (name, sc) in registry.names().iter().zip(&config.sources) {
        let detail = match &sc.kind {
            SourceKind::Simulated { base, step } => format!("simulated base={base} step={step}"),
            SourceKind::Scaled { of, factor } => format!("scaled {factor} x {of}"),
            SourceKind::Html { search_url, .. } => format!("html {search_url}"),
        };
        println!("  {name:<16} {detail}");
    }
    println!();
    println!("Catalog:");
    for product in registry.catalog() {
        println!("  {:<6} {}", product.id, product.search_term);
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn product_started(&self, product: &Product, current: usize, total: usize) {
        self.spinner.set_message(format!(
            "Pricing [{current}/{total}] {} ({})",
            product.id, product.search_term
        ));
    }

    fn product_finished(&self, report: &ProductReport) {
        let mark = match report.outcome {
            ProductOutcome::Success => "ok",
            ProductOutcome::PartialSuccess => "partial",
            ProductOutcome::Failed => "FAILED",
        };
        self.spinner.println(format!(
            "  {:<6} {mark:<8} {} price(s)",
            report.product_id, report.quotes
        ));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}
