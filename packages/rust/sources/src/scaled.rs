//! Retailer priced relative to a reference retailer.

use std::sync::Arc;

use async_trait::async_trait;
use pricebot_shared::{Quote, SourceError};
use rust_decimal::Decimal;

use crate::{PriceSource, to_cents};

/// Quotes `reference price * factor`. A failing reference fails this source
/// with the same kind.
pub struct ScaledSource {
    name: String,
    reference: Arc<dyn PriceSource>,
    factor: Decimal,
}

impl ScaledSource {
    pub fn new(name: impl Into<String>, reference: Arc<dyn PriceSource>, factor: Decimal) -> Self {
        Self {
            name: name.into(),
            reference,
            factor,
        }
    }
}

#[async_trait]
impl PriceSource for ScaledSource {
    async fn quote(&self, search_term: &str) -> Result<Quote, SourceError> {
        let base = self.reference.quote(search_term).await.map_err(|e| {
            SourceError::new(
                &self.name,
                e.kind,
                format!("reference '{}' failed: {}", e.source_name, e.message),
            )
        })?;
        Ok(Quote::now(&self.name, to_cents(base.price * self.factor)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimulatedSource;
    use pricebot_shared::SourceErrorKind;
    use rust_decimal_macros::dec;

    struct Unreachable;

    #[async_trait]
    impl PriceSource for Unreachable {
        async fn quote(&self, _search_term: &str) -> Result<Quote, SourceError> {
            Err(SourceError::network("Continente", "connection reset"))
        }

        fn name(&self) -> &str {
            "Continente"
        }
    }

    #[tokio::test]
    async fn scales_reference_price() {
        let continente: Arc<dyn PriceSource> =
            Arc::new(SimulatedSource::new("Continente", dec!(1.99), dec!(0.10)));
        let lidl = ScaledSource::new("Lidl", continente, dec!(0.98));

        // 2.29 * 0.98 = 2.2442
        let quote = lidl.quote("leite mimosa meio gordo").await.unwrap();
        assert_eq!(quote.source_name, "Lidl");
        assert_eq!(quote.price, dec!(2.24));
    }

    #[tokio::test]
    async fn reference_failure_keeps_kind() {
        let lidl = ScaledSource::new("Lidl", Arc::new(Unreachable), dec!(0.98));
        let err = lidl.quote("coca-cola").await.unwrap_err();
        assert_eq!(err.source_name, "Lidl");
        assert_eq!(err.kind, SourceErrorKind::Network);
        assert!(err.message.contains("Continente"));
    }
}
