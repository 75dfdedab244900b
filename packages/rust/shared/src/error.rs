//! Error types for pricebot.
//!
//! Library crates use [`PriceBotError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Two narrower errors describe per-unit failures that the pipeline records
//! instead of propagating: [`SourceError`] (one source, one product) and
//! [`WriteError`] (one product's persistence step).

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level error type for all pricebot operations.
#[derive(Debug, thiserror::Error)]
pub enum PriceBotError {
    /// Configuration loading or validation error. Fatal for a run.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to a retailer or a remote backend.
    #[error("network error: {0}")]
    Network(String),

    /// Response parsing error (HTML, price text, stored documents).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// The backend refused the write (read-only handle, constraint violation).
    #[error("write rejected: {0}")]
    WriteRejected(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (invalid state transition, bad input).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PriceBotError>;

impl PriceBotError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

// ---------------------------------------------------------------------------
// SourceError
// ---------------------------------------------------------------------------

/// Why a price source failed to produce a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    Network,
    Timeout,
    Parse,
    NotFound,
}

impl fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Parse => "parse",
            Self::NotFound => "not_found",
        };
        f.write_str(s)
    }
}

/// A single source's failure for a single product.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{source_name}: {kind}: {message}")]
pub struct SourceError {
    /// Registered name of the failing source.
    pub source_name: String,
    /// Failure category.
    pub kind: SourceErrorKind,
    /// Human-readable detail for logs.
    pub message: String,
}

impl SourceError {
    pub fn new(
        source_name: impl Into<String>,
        kind: SourceErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn network(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(source_name, SourceErrorKind::Network, message)
    }

    pub fn timeout(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(source_name, SourceErrorKind::Timeout, message)
    }

    pub fn parse(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(source_name, SourceErrorKind::Parse, message)
    }

    pub fn not_found(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(source_name, SourceErrorKind::NotFound, message)
    }
}

// ---------------------------------------------------------------------------
// WriteError
// ---------------------------------------------------------------------------

/// Why a product's record could not be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteErrorKind {
    /// Backend unreachable or failing.
    Unavailable,
    /// Backend reachable but the write was refused.
    Rejected,
}

impl fmt::Display for WriteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => f.write_str("unavailable"),
            Self::Rejected => f.write_str("rejected"),
        }
    }
}

/// Persistence failure for one product.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to write product '{product_id}' ({kind}): {message}")]
pub struct WriteError {
    pub product_id: String,
    pub kind: WriteErrorKind,
    pub message: String,
}

impl WriteError {
    /// Classify a storage-layer error for the given product.
    pub fn from_storage(product_id: impl Into<String>, err: &PriceBotError) -> Self {
        let kind = match err {
            PriceBotError::WriteRejected(_) | PriceBotError::Validation { .. } => {
                WriteErrorKind::Rejected
            }
            _ => WriteErrorKind::Unavailable,
        };
        Self {
            product_id: product_id.into(),
            kind,
            message: err.to_string(),
        }
    }
}
