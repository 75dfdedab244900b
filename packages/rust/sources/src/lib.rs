//! Price sources: the per-retailer capability the pipeline fans out to.
//!
//! This crate provides:
//! - [`PriceSource`]: the async capability trait (search term → [`Quote`])
//! - [`SourceRegistry`]: registered sources in order, plus the product catalog
//! - Built-in sources: [`SimulatedSource`], [`ScaledSource`], [`HtmlPriceSource`]

mod html;
mod price_text;
mod registry;
mod scaled;
mod simulated;

use async_trait::async_trait;
use pricebot_shared::{Quote, SourceError};
use rust_decimal::{Decimal, RoundingStrategy};

pub use html::HtmlPriceSource;
pub use price_text::parse_price;
pub use registry::SourceRegistry;
pub use scaled::ScaledSource;
pub use simulated::SimulatedSource;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A retailer that can quote a price for a search term.
///
/// Implementations bound their own latency (client timeouts) and report every
/// failure as a [`SourceError`]; they never panic on bad responses.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Look up the current price for `search_term`.
    async fn quote(&self, search_term: &str) -> Result<Quote, SourceError>;

    /// Registered name, written as `supermarket` in price records.
    fn name(&self) -> &str;
}

/// Round to cents, half away from zero.
pub(crate) fn to_cents(price: Decimal) -> Decimal {
    price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
