//! Core pipeline orchestration for pricebot.
//!
//! Ties price sources and the store together: for each catalog product the
//! [`Aggregator`] collects quotes, [`build_record`] shapes the record and the
//! [`StoreWriter`] merge-upserts it. [`run_pipeline`] is the entry point.

pub mod aggregator;
pub mod cancel;
pub mod pipeline;
pub mod record;
pub mod writer;

#[cfg(test)]
mod testing;

pub use aggregator::{AggregateResult, Aggregation, Aggregator, SourceFailure};
pub use cancel::CancelSignal;
pub use pipeline::{
    FailedProduct, PipelineRunner, ProductOutcome, ProductReport, ProgressReporter, RunState,
    RunSummary, SilentProgress, run_pipeline,
};
pub use record::{build_record, round_price, title_case};
pub use writer::StoreWriter;
