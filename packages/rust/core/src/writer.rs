//! Persisting price records through the [`Store`] boundary.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pricebot_shared::{PriceRecord, WriteError, WriteErrorKind};
use pricebot_storage::{MergePolicy, Store};
use serde_json::{Map, Value};
use tracing::debug;

/// Merge-upserts records into one collection.
///
/// Only `prices` is overwritten on an existing document; `id` and `name` are
/// written when missing and otherwise left alone. The backend stamps
/// `last_updated`.
pub struct StoreWriter {
    store: Arc<dyn Store>,
    collection: String,
}

impl StoreWriter {
    pub fn new(store: Arc<dyn Store>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    /// Write one record; returns the backend's commit timestamp.
    pub async fn write(&self, record: &PriceRecord) -> Result<DateTime<Utc>, WriteError> {
        let prices = serde_json::to_value(&record.prices).map_err(|e| WriteError {
            product_id: record.id.clone(),
            kind: WriteErrorKind::Rejected,
            message: format!("cannot encode prices: {e}"),
        })?;

        let mut fields = Map::new();
        fields.insert("prices".into(), prices);

        let mut defaults = Map::new();
        defaults.insert("id".into(), Value::String(record.id.clone()));
        defaults.insert("name".into(), Value::String(record.name.clone()));

        let stamp = self
            .store
            .upsert(&self.collection, &record.id, &fields, &defaults, MergePolicy::Merge)
            .await
            .map_err(|e| WriteError::from_storage(&record.id, &e))?;

        debug!(product = %record.id, entries = record.prices.len(), last_updated = %stamp, "record written");
        Ok(stamp)
    }
}
