//! Application configuration for pricebot.
//!
//! User config lives at `~/.pricebot/pricebot.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PriceBotError, Result};
use crate::types::Product;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "pricebot.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".pricebot";

/// Placeholder replaced by the URL-encoded search term in HTML sources.
pub const QUERY_PLACEHOLDER: &str = "{query}";

// ---------------------------------------------------------------------------
// Config structs (matching pricebot.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Timeouts and target collection.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Persistence backend location.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Product catalog, processed in this order.
    #[serde(default = "default_products")]
    pub products: Vec<Product>,

    /// Price sources, queried and reported in this order.
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            storage: StorageConfig::default(),
            products: default_products(),
            sources: default_sources(),
        }
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Ceiling for a single source's quote.
    #[serde(default = "default_per_source_timeout_ms")]
    pub per_source_timeout_ms: u64,

    /// Ceiling for all sources of one product together.
    #[serde(default = "default_aggregation_timeout_ms")]
    pub aggregation_timeout_ms: u64,

    /// Document collection that holds price records.
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl PipelineConfig {
    pub fn per_source_timeout(&self) -> Duration {
        Duration::from_millis(self.per_source_timeout_ms)
    }

    pub fn aggregation_timeout(&self) -> Duration {
        Duration::from_millis(self.aggregation_timeout_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            per_source_timeout_ms: default_per_source_timeout_ms(),
            aggregation_timeout_ms: default_aggregation_timeout_ms(),
            collection: default_collection(),
        }
    }
}

fn default_per_source_timeout_ms() -> u64 {
    5_000
}
fn default_aggregation_timeout_ms() -> u64 {
    15_000
}
fn default_collection() -> String {
    "products".into()
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Local libSQL database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Remote libSQL/Turso URL. When set, `db_path` is ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,

    /// Name of the env var holding the remote auth token (never store the token itself).
    #[serde(default = "default_auth_token_env")]
    pub auth_token_env: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            remote_url: None,
            auth_token_env: default_auth_token_env(),
        }
    }
}

fn default_db_path() -> String {
    "var/pricebot.db".into()
}
fn default_auth_token_env() -> String {
    "PRICEBOT_DB_TOKEN".into()
}

/// `[[sources]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Retailer name, written as `supermarket` in records.
    pub name: String,
    /// Variant-specific settings.
    #[serde(flatten)]
    pub kind: SourceKind,
}

/// The built-in source variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    /// Deterministic price: `base + (chars(term) % 10) * step`.
    Simulated { base: Decimal, step: Decimal },
    /// Another source's price multiplied by `factor`.
    Scaled { of: String, factor: Decimal },
    /// Scrape the first `price_selector` match on a search results page.
    Html {
        search_url: String,
        price_selector: String,
    },
}

impl SourceConfig {
    pub fn simulated(name: &str, base: Decimal, step: Decimal) -> Self {
        Self {
            name: name.into(),
            kind: SourceKind::Simulated { base, step },
        }
    }

    pub fn scaled(name: &str, of: &str, factor: Decimal) -> Self {
        Self {
            name: name.into(),
            kind: SourceKind::Scaled {
                of: of.into(),
                factor,
            },
        }
    }
}

fn default_products() -> Vec<Product> {
    vec![
        Product::new("p1", "leite mimosa meio gordo"),
        Product::new("p3", "maçã golden"),
        Product::new("p14", "coca-cola"),
        Product::new("p13", "arroz agulha cigala"),
    ]
}

fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig::simulated("Continente", Decimal::new(199, 2), Decimal::new(10, 2)),
        SourceConfig::simulated("Pingo Doce", Decimal::new(195, 2), Decimal::new(11, 2)),
        SourceConfig::scaled("Lidl", "Continente", Decimal::new(98, 2)),
        SourceConfig::scaled("Auchan", "Pingo Doce", Decimal::new(102, 2)),
    ]
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.pricebot/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PriceBotError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.pricebot/pricebot.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PriceBotError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| PriceBotError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PriceBotError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PriceBotError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PriceBotError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Check the catalog, the source list, and the timeouts.
///
/// Every problem here is fatal: a run must not start on an invalid config.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.pipeline.per_source_timeout_ms == 0 || config.pipeline.aggregation_timeout_ms == 0 {
        return Err(PriceBotError::config("timeouts must be greater than zero"));
    }
    if config.pipeline.collection.trim().is_empty() {
        return Err(PriceBotError::config("pipeline.collection must not be empty"));
    }

    if config.products.is_empty() {
        return Err(PriceBotError::config("product catalog is empty"));
    }
    let mut ids = HashSet::new();
    for product in &config.products {
        if product.id.trim().is_empty() {
            return Err(PriceBotError::config("product id must not be empty"));
        }
        if product.search_term.trim().is_empty() {
            return Err(PriceBotError::config(format!(
                "product '{}' has an empty search_term",
                product.id
            )));
        }
        if !ids.insert(product.id.as_str()) {
            return Err(PriceBotError::config(format!(
                "duplicate product id '{}'",
                product.id
            )));
        }
    }

    if config.sources.is_empty() {
        return Err(PriceBotError::config("no price sources configured"));
    }
    let mut declared: HashSet<&str> = HashSet::new();
    for source in &config.sources {
        let name = source.name.as_str();
        if name.trim().is_empty() {
            return Err(PriceBotError::config("source name must not be empty"));
        }
        if declared.contains(name) {
            return Err(PriceBotError::config(format!("duplicate source name '{name}'")));
        }
        validate_source_kind(name, &source.kind, &declared)?;
        declared.insert(name);
    }

    Ok(())
}

fn validate_source_kind(name: &str, kind: &SourceKind, declared: &HashSet<&str>) -> Result<()> {
    match kind {
        SourceKind::Simulated { base, step } => {
            if base.is_sign_negative() || step.is_sign_negative() {
                return Err(PriceBotError::config(format!(
                    "source '{name}': base and step must not be negative"
                )));
            }
        }
        SourceKind::Scaled { of, factor } => {
            // Referencing only earlier sources rules out cycles.
            if !declared.contains(of.as_str()) {
                return Err(PriceBotError::config(format!(
                    "source '{name}' scales '{of}', which is not declared before it"
                )));
            }
            if *factor <= Decimal::ZERO {
                return Err(PriceBotError::config(format!(
                    "source '{name}': factor must be positive"
                )));
            }
        }
        SourceKind::Html {
            search_url,
            price_selector,
        } => {
            if !search_url.contains(QUERY_PLACEHOLDER) {
                return Err(PriceBotError::config(format!(
                    "source '{name}': search_url must contain {QUERY_PLACEHOLDER}"
                )));
            }
            url::Url::parse(&search_url.replace(QUERY_PLACEHOLDER, "x")).map_err(|e| {
                PriceBotError::config(format!("source '{name}': invalid search_url: {e}"))
            })?;
            if price_selector.trim().is_empty() {
                return Err(PriceBotError::config(format!(
                    "source '{name}': price_selector must not be empty"
                )));
            }
        }
    }
    Ok(())
}

/// Check that the remote backend token env var is set when a remote backend is configured.
pub fn validate_credentials(storage: &StorageConfig) -> Result<()> {
    if storage.remote_url.is_none() {
        return Ok(());
    }
    let var_name = &storage.auth_token_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(PriceBotError::config(format!(
            "backend auth token not found. Set the {var_name} environment variable."
        ))),
    }
}
