//! Fan-out of one product's search term to every registered source.

use std::sync::Arc;
use std::time::Duration;

use pricebot_shared::{Product, Quote, SourceError, SourceErrorKind};
use pricebot_sources::PriceSource;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cancel::CancelSignal;

/// A source that produced no quote for a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source_name: String,
    pub kind: SourceErrorKind,
}

/// Quotes from the sources that answered, plus who did not.
#[derive(Debug, Default)]
pub struct AggregateResult {
    /// In source registration order.
    pub quotes: Vec<Quote>,
    pub failures: Vec<SourceFailure>,
}

#[derive(Debug)]
pub enum Aggregation {
    Completed(AggregateResult),
    /// Cancelled before every source was collected; partial results dropped.
    Cancelled,
}

/// Queries all sources concurrently for one product at a time.
pub struct Aggregator {
    sources: Vec<Arc<dyn PriceSource>>,
    per_source_timeout: Duration,
    aggregation_timeout: Duration,
}

impl Aggregator {
    pub fn new(
        sources: Vec<Arc<dyn PriceSource>>,
        per_source_timeout: Duration,
        aggregation_timeout: Duration,
    ) -> Self {
        Self {
            sources,
            per_source_timeout,
            aggregation_timeout,
        }
    }

    /// Ask every source for `product`'s price.
    ///
    /// Each source runs in its own task under `per_source_timeout`; collection
    /// as a whole is bounded by `aggregation_timeout`. Sources still running at
    /// the deadline are aborted and reported as timeouts.
    pub async fn aggregate(&self, product: &Product, cancel: &CancelSignal) -> Aggregation {
        if cancel.is_cancelled() {
            return Aggregation::Cancelled;
        }

        let deadline = Instant::now() + self.aggregation_timeout;
        let tasks: Vec<(String, JoinHandle<Result<Quote, SourceError>>)> = self
            .sources
            .iter()
            .map(|source| {
                let name = source.name().to_string();
                let handle = tokio::spawn(quote_with_timeout(
                    Arc::clone(source),
                    product.search_term.clone(),
                    self.per_source_timeout,
                ));
                (name, handle)
            })
            .collect();
        let aborts: Vec<_> = tasks.iter().map(|(_, h)| h.abort_handle()).collect();

        let mut result = AggregateResult::default();
        for (i, (name, handle)) in tasks.into_iter().enumerate() {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    aborts.iter().for_each(|a| a.abort());
                    debug!(product = %product.id, "aggregation cancelled");
                    return Aggregation::Cancelled;
                }
                joined = tokio::time::timeout_at(deadline, handle) => joined,
            };

            let failure = match joined {
                Ok(Ok(Ok(quote))) => {
                    debug!(product = %product.id, source = %name, price = %quote.price, "quote received");
                    result.quotes.push(quote);
                    continue;
                }
                Ok(Ok(Err(e))) => {
                    warn!(product = %product.id, source = %name, kind = %e.kind, error = %e.message, "source failed");
                    e.kind
                }
                Ok(Err(join_err)) => {
                    warn!(product = %product.id, source = %name, error = %join_err, "source task panicked");
                    SourceErrorKind::Network
                }
                Err(_) => {
                    aborts[i].abort();
                    warn!(
                        product = %product.id,
                        source = %name,
                        timeout_ms = self.aggregation_timeout.as_millis() as u64,
                        "aggregation deadline reached"
                    );
                    SourceErrorKind::Timeout
                }
            };
            result.failures.push(SourceFailure {
                source_name: name,
                kind: failure,
            });
        }

        Aggregation::Completed(result)
    }
}

async fn quote_with_timeout(
    source: Arc<dyn PriceSource>,
    search_term: String,
    limit: Duration,
) -> Result<Quote, SourceError> {
    match tokio::time::timeout(limit, source.quote(&search_term)).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::timeout(
            source.name(),
            format!("no answer within {} ms", limit.as_millis()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingSource, FixedSource, HangingSource};
    use rust_decimal_macros::dec;

    fn product() -> Product {
        Product::new("p1", "leite mimosa meio gordo")
    }

    fn aggregator(sources: Vec<Arc<dyn PriceSource>>) -> Aggregator {
        Aggregator::new(sources, Duration::from_millis(200), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn keeps_registration_order() {
        let agg = aggregator(vec![
            FixedSource::slow("Continente", dec!(3.10), Duration::from_millis(60)),
            FixedSource::arc("Pingo Doce", dec!(3.05)),
        ]);
        let Aggregation::Completed(result) = agg.aggregate(&product(), &CancelSignal::new()).await
        else {
            panic!("expected completion");
        };
        let names: Vec<_> = result.quotes.iter().map(|q| q.source_name.as_str()).collect();
        assert_eq!(names, vec!["Continente", "Pingo Doce"]);
        assert!(result.failures.is_empty());
    }

    #[tokio::test]
    async fn failures_are_collected_not_propagated() {
        let agg = aggregator(vec![
            FixedSource::arc("Continente", dec!(3.10)),
            FailingSource::arc("Lidl", SourceErrorKind::Network),
            HangingSource::arc("Auchan"),
        ]);
        let Aggregation::Completed(result) = agg.aggregate(&product(), &CancelSignal::new()).await
        else {
            panic!("expected completion");
        };
        assert_eq!(result.quotes.len(), 1);
        assert_eq!(
            result.failures,
            vec![
                SourceFailure {
                    source_name: "Lidl".into(),
                    kind: SourceErrorKind::Network
                },
                SourceFailure {
                    source_name: "Auchan".into(),
                    kind: SourceErrorKind::Timeout
                },
            ]
        );
    }

    #[tokio::test]
    async fn aggregation_deadline_bounds_slow_sources() {
        let agg = Aggregator::new(
            vec![HangingSource::arc("Auchan"), FixedSource::arc("Lidl", dec!(2.24))],
            Duration::from_secs(30),
            Duration::from_millis(100),
        );
        let started = std::time::Instant::now();
        let Aggregation::Completed(result) = agg.aggregate(&product(), &CancelSignal::new()).await
        else {
            panic!("expected completion");
        };
        assert!(started.elapsed() < Duration::from_secs(2));
        // Lidl finished long before the deadline and is still collected.
        assert_eq!(result.quotes.len(), 1);
        assert_eq!(result.failures[0].kind, SourceErrorKind::Timeout);
    }

    #[tokio::test]
    async fn zero_sources_answering_is_not_an_error() {
        let agg = aggregator(vec![FailingSource::arc("Lidl", SourceErrorKind::NotFound)]);
        let Aggregation::Completed(result) = agg.aggregate(&product(), &CancelSignal::new()).await
        else {
            panic!("expected completion");
        };
        assert!(result.quotes.is_empty());
        assert_eq!(result.failures.len(), 1);
    }

    #[tokio::test]
    async fn cancellation_interrupts_collection() {
        let agg = Aggregator::new(
            vec![HangingSource::arc("Auchan")],
            Duration::from_secs(30),
            Duration::from_secs(30),
        );
        let cancel = CancelSignal::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let outcome = tokio::time::timeout(Duration::from_secs(2), agg.aggregate(&product(), &cancel))
            .await
            .expect("cancel should interrupt");
        assert!(matches!(outcome, Aggregation::Cancelled));
    }
}
