//! Shared types, error model, and configuration for pricebot.
//!
//! This crate is the foundation depended on by all other pricebot crates.
//! It provides:
//! - [`PriceBotError`]: the unified error type, plus [`SourceError`] and [`WriteError`]
//! - Domain types ([`Product`], [`Quote`], [`PriceEntry`], [`PriceRecord`])
//! - Configuration ([`AppConfig`], [`SourceConfig`], config loading and validation)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, PipelineConfig, SourceConfig, SourceKind, StorageConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_config,
    validate_credentials,
};
pub use error::{PriceBotError, Result, SourceError, SourceErrorKind, WriteError, WriteErrorKind};
pub use types::{PriceEntry, PriceRecord, Product, Quote};
