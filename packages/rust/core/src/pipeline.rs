//! End-to-end price run: catalog → aggregate → build record → merge-upsert.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use pricebot_shared::{
    AppConfig, PipelineConfig, PriceBotError, Product, Result, WriteErrorKind, validate_config,
};
use pricebot_sources::SourceRegistry;
use pricebot_storage::Store;

use crate::aggregator::{Aggregation, Aggregator, SourceFailure};
use crate::cancel::CancelSignal;
use crate::record::build_record;
use crate::writer::StoreWriter;

/// Lifecycle of a [`PipelineRunner`]. A runner executes exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
}

/// Per-product result classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductOutcome {
    /// Every source quoted and the record was written.
    Success,
    /// At least one source failed; the record was still written.
    PartialSuccess,
    /// The record could not be written.
    Failed,
}

/// What happened to one product during the run.
#[derive(Debug, Clone, Serialize)]
pub struct ProductReport {
    pub product_id: String,
    pub outcome: ProductOutcome,
    /// Number of quotes that made it into the record.
    pub quotes: usize,
    pub failed_sources: Vec<SourceFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_error: Option<WriteErrorKind>,
    /// Backend commit time, when written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedProduct {
    pub product_id: String,
    pub kind: WriteErrorKind,
    pub message: String,
}

/// Result of a complete run, suitable for logging or alerting as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub succeeded: usize,
    pub partial: usize,
    pub failed: usize,
    pub failed_products: Vec<FailedProduct>,
    /// Products written with no prices at all.
    pub warnings: Vec<String>,
    pub products: Vec<ProductReport>,
    pub cancelled: bool,
    /// Catalog entries never completed because the run was cancelled.
    pub not_attempted: usize,
    pub elapsed_ms: u64,
}

impl RunSummary {
    /// True when the caller should treat the run as unhealthy.
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.cancelled
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a product's sources are queried.
    fn product_started(&self, product: &Product, current: usize, total: usize);
    /// Called once a product has been classified.
    fn product_finished(&self, report: &ProductReport);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn product_started(&self, _product: &Product, _current: usize, _total: usize) {}
    fn product_finished(&self, _report: &ProductReport) {}
    fn done(&self, _summary: &RunSummary) {}
}

/// Drives one run over the catalog, sequentially per product.
pub struct PipelineRunner {
    catalog: Vec<Product>,
    aggregator: Aggregator,
    writer: StoreWriter,
    state: RunState,
}

impl PipelineRunner {
    pub fn new(registry: SourceRegistry, store: Arc<dyn Store>, config: &PipelineConfig) -> Self {
        let aggregator = Aggregator::new(
            registry.sources().to_vec(),
            config.per_source_timeout(),
            config.aggregation_timeout(),
        );
        Self {
            catalog: registry.catalog().to_vec(),
            aggregator,
            writer: StoreWriter::new(store, config.collection.clone()),
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Process every catalog product once.
    ///
    /// Source and write failures are recorded in the summary and never stop
    /// the run. Cancellation stops before the next product; the product in
    /// flight is not written.
    #[instrument(skip_all, fields(run_id))]
    pub async fn run(
        &mut self,
        cancel: &CancelSignal,
        progress: &dyn ProgressReporter,
    ) -> Result<RunSummary> {
        if self.state != RunState::Idle {
            return Err(PriceBotError::validation(format!(
                "pipeline runner cannot start from state {:?}",
                self.state
            )));
        }
        self.state = RunState::Running;

        let start = Instant::now();
        let run_id = Uuid::now_v7();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let total = self.catalog.len();
        info!(%run_id, products = total, "starting price run");

        let mut summary = RunSummary {
            run_id,
            succeeded: 0,
            partial: 0,
            failed: 0,
            failed_products: Vec::new(),
            warnings: Vec::new(),
            products: Vec::new(),
            cancelled: false,
            not_attempted: 0,
            elapsed_ms: 0,
        };

        progress.phase("Collecting prices");
        for (i, product) in self.catalog.iter().enumerate() {
            progress.product_started(product, i + 1, total);

            let aggregate = match self.aggregator.aggregate(product, cancel).await {
                Aggregation::Completed(result) => result,
                Aggregation::Cancelled => {
                    summary.cancelled = true;
                    break;
                }
            };
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let record = build_record(product, &aggregate.quotes);
            if record.prices.is_empty() {
                warn!(product = %product.id, "no source returned a price");
                summary.warnings.push(product.id.clone());
            }

            let mut report = ProductReport {
                product_id: product.id.clone(),
                outcome: ProductOutcome::Success,
                quotes: record.prices.len(),
                failed_sources: aggregate.failures,
                write_error: None,
                last_updated: None,
            };

            match self.writer.write(&record).await {
                Ok(stamp) => {
                    report.last_updated = Some(stamp);
                    if report.failed_sources.is_empty() {
                        summary.succeeded += 1;
                    } else {
                        report.outcome = ProductOutcome::PartialSuccess;
                        summary.partial += 1;
                    }
                }
                Err(e) => {
                    warn!(product = %product.id, kind = %e.kind, error = %e.message, "write failed");
                    report.outcome = ProductOutcome::Failed;
                    report.write_error = Some(e.kind);
                    summary.failed += 1;
                    summary.failed_products.push(FailedProduct {
                        product_id: e.product_id,
                        kind: e.kind,
                        message: e.message,
                    });
                }
            }

            info!(
                product = %report.product_id,
                outcome = ?report.outcome,
                quotes = report.quotes,
                failed_sources = report.failed_sources.len(),
                "product processed"
            );
            progress.product_finished(&report);
            summary.products.push(report);
        }

        summary.not_attempted = total - summary.products.len();
        summary.elapsed_ms = start.elapsed().as_millis() as u64;
        self.state = RunState::Completed;

        if summary.cancelled {
            warn!(%run_id, not_attempted = summary.not_attempted, "price run cancelled");
        }
        info!(
            %run_id,
            succeeded = summary.succeeded,
            partial = summary.partial,
            failed = summary.failed,
            warnings = summary.warnings.len(),
            elapsed_ms = summary.elapsed_ms,
            "price run completed"
        );

        progress.done(&summary);
        Ok(summary)
    }
}

/// Validate `config`, build its sources, and run the pipeline once.
///
/// Configuration problems are returned before any product is processed.
#[instrument(skip_all, fields(products = config.products.len(), sources = config.sources.len()))]
pub async fn run_pipeline(
    config: &AppConfig,
    store: Arc<dyn Store>,
    cancel: &CancelSignal,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    progress.phase("Loading sources");
    validate_config(config)?;
    let registry = SourceRegistry::from_config(config)?;
    let mut runner = PipelineRunner::new(registry, store, &config.pipeline);
    runner.run(cancel, progress).await
}
