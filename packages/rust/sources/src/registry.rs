//! Registered price sources and the product catalog for one run.

use std::sync::Arc;

use pricebot_shared::{AppConfig, PriceBotError, Product, Result, SourceKind};
use tracing::debug;

use crate::{HtmlPriceSource, PriceSource, ScaledSource, SimulatedSource};

/// Ordered set of price sources plus the static catalog they are asked about.
///
/// Registration order is the order of entries in every built price record.
/// Read-only once a run starts.
pub struct SourceRegistry {
    sources: Vec<Arc<dyn PriceSource>>,
    catalog: Vec<Product>,
}

impl SourceRegistry {
    /// Create an empty registry for the given catalog.
    pub fn new(catalog: Vec<Product>) -> Self {
        Self {
            sources: Vec::new(),
            catalog,
        }
    }

    /// Add a source. Names must be unique.
    pub fn register(&mut self, source: Arc<dyn PriceSource>) -> Result<()> {
        if self.find(source.name()).is_some() {
            return Err(PriceBotError::config(format!(
                "duplicate source name '{}'",
                source.name()
            )));
        }
        debug!(source = source.name(), "registered price source");
        self.sources.push(source);
        Ok(())
    }

    /// Build the registry described by a (validated) configuration.
    ///
    /// `scaled` sources resolve their reference among the sources already
    /// registered, so references must point backwards.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mut registry = Self::new(config.products.clone());
        let timeout = config.pipeline.per_source_timeout();

        for sc in &config.sources {
            let source: Arc<dyn PriceSource> = match &sc.kind {
                SourceKind::Simulated { base, step } => {
                    Arc::new(SimulatedSource::new(&sc.name, *base, *step))
                }
                SourceKind::Scaled { of, factor } => {
                    let reference = registry.find(of).ok_or_else(|| {
                        PriceBotError::config(format!(
                            "source '{}' scales unknown or later source '{of}'",
                            sc.name
                        ))
                    })?;
                    Arc::new(ScaledSource::new(&sc.name, reference, *factor))
                }
                SourceKind::Html {
                    search_url,
                    price_selector,
                } => Arc::new(HtmlPriceSource::new(
                    &sc.name,
                    search_url,
                    price_selector,
                    timeout,
                )?),
            };
            registry.register(source)?;
        }

        Ok(registry)
    }

    pub fn sources(&self) -> &[Arc<dyn PriceSource>] {
        &self.sources
    }

    pub fn catalog(&self) -> &[Product] {
        &self.catalog
    }

    /// Source names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    fn find(&self, name: &str) -> Option<Arc<dyn PriceSource>> {
        self.sources.iter().find(|s| s.name() == name).cloned()
    }
}
