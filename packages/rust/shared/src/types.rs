//! Core domain types for pricebot.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Product
// ---------------------------------------------------------------------------

/// A catalog entry. Defined by static configuration, immutable during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Stable key of the persisted record.
    pub id: String,
    /// Term sent to every price source.
    pub search_term: String,
}

impl Product {
    pub fn new(id: impl Into<String>, search_term: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            search_term: search_term.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Quote
// ---------------------------------------------------------------------------

/// One source's reported price for one product at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    /// Registered source name, becomes `supermarket` in the record.
    pub source_name: String,
    /// Price as reported by the source, not yet rounded.
    pub price: Decimal,
    /// Client-side observation time (diagnostics only).
    pub observed_at: DateTime<Utc>,
}

impl Quote {
    /// Create a quote observed now.
    pub fn now(source_name: impl Into<String>, price: Decimal) -> Self {
        Self {
            source_name: source_name.into(),
            price,
            observed_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// PriceRecord
// ---------------------------------------------------------------------------

/// A single `{supermarket, price}` entry of a persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    pub supermarket: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

/// The canonical per-product document, keyed by product id.
///
/// `last_updated` is assigned by the backend on write; a freshly built record
/// carries `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub prices: Vec<PriceEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl PriceRecord {
    /// Look up the entry for a given supermarket.
    pub fn price_of(&self, supermarket: &str) -> Option<Decimal> {
        self.prices
            .iter()
            .find(|e| e.supermarket == supermarket)
            .map(|e| e.price)
    }

    /// Parse a stored document body. Unknown fields are ignored.
    pub fn from_document(body: serde_json::Value) -> crate::Result<Self> {
        serde_json::from_value(body)
            .map_err(|e| crate::PriceBotError::parse(format!("invalid price record: {e}")))
    }
}
