//! Deterministic stand-in retailer.
//!
//! Produces `base + (chars(term) % 10) * step`, which varies across products
//! without any network access. Used for the default catalog and for dry runs.

use async_trait::async_trait;
use pricebot_shared::{Quote, SourceError};
use rust_decimal::Decimal;

use crate::{PriceSource, to_cents};

pub struct SimulatedSource {
    name: String,
    base: Decimal,
    step: Decimal,
}

impl SimulatedSource {
    pub fn new(name: impl Into<String>, base: Decimal, step: Decimal) -> Self {
        Self {
            name: name.into(),
            base,
            step,
        }
    }

    fn price_for(&self, search_term: &str) -> Decimal {
        let bucket = Decimal::from(search_term.chars().count() % 10);
        to_cents(self.base + bucket * self.step)
    }
}

#[async_trait]
impl PriceSource for SimulatedSource {
    async fn quote(&self, search_term: &str) -> Result<Quote, SourceError> {
        if search_term.trim().is_empty() {
            return Err(SourceError::not_found(&self.name, "empty search term"));
        }
        Ok(Quote::now(&self.name, self.price_for(search_term)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
