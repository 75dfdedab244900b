//! Test doubles shared by the unit tests in this crate.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pricebot_shared::{PriceBotError, Quote, Result, SourceError, SourceErrorKind};
use pricebot_sources::PriceSource;
use pricebot_storage::{MergePolicy, Store};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

pub struct FixedSource {
    name: String,
    price: Decimal,
    delay: Duration,
}

impl FixedSource {
    pub fn arc(name: &str, price: Decimal) -> Arc<dyn PriceSource> {
        Self::slow(name, price, Duration::ZERO)
    }

    pub fn slow(name: &str, price: Decimal, delay: Duration) -> Arc<dyn PriceSource> {
        Arc::new(Self {
            name: name.into(),
            price,
            delay,
        })
    }
}

#[async_trait]
impl PriceSource for FixedSource {
    async fn quote(&self, _search_term: &str) -> std::result::Result<Quote, SourceError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(Quote::now(&self.name, self.price))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub struct FailingSource {
    name: String,
    kind: SourceErrorKind,
}

impl FailingSource {
    pub fn arc(name: &str, kind: SourceErrorKind) -> Arc<dyn PriceSource> {
        Arc::new(Self {
            name: name.into(),
            kind,
        })
    }
}

#[async_trait]
impl PriceSource for FailingSource {
    async fn quote(&self, _search_term: &str) -> std::result::Result<Quote, SourceError> {
        Err(SourceError::new(&self.name, self.kind, "simulated failure"))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Never answers.
pub struct HangingSource {
    name: String,
}

impl HangingSource {
    pub fn arc(name: &str) -> Arc<dyn PriceSource> {
        Arc::new(Self { name: name.into() })
    }
}

#[async_trait]
impl PriceSource for HangingSource {
    async fn quote(&self, _search_term: &str) -> std::result::Result<Quote, SourceError> {
        std::future::pending().await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// One recorded `upsert` call.
#[derive(Debug, Clone)]
pub struct UpsertCall {
    pub collection: String,
    pub id: String,
    pub fields: Map<String, Value>,
    pub defaults: Map<String, Value>,
    pub policy: MergePolicy,
}

/// Records calls; fails for the ids listed in `reject`.
#[derive(Default)]
pub struct RecordingStore {
    pub calls: Mutex<Vec<UpsertCall>>,
    pub reject: Vec<String>,
}

impl RecordingStore {
    pub fn rejecting(ids: &[&str]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            reject: ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.id.clone())
            .collect()
    }
}

#[async_trait]
impl Store for RecordingStore {
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        fields: &Map<String, Value>,
        defaults: &Map<String, Value>,
        policy: MergePolicy,
    ) -> Result<DateTime<Utc>> {
        if self.reject.iter().any(|r| r == id) {
            return Err(PriceBotError::Storage("connection reset".into()));
        }
        self.calls.lock().unwrap().push(UpsertCall {
            collection: collection.into(),
            id: id.into(),
            fields: fields.clone(),
            defaults: defaults.clone(),
            policy,
        });
        Ok(Utc::now())
    }

    async fn get(&self, _collection: &str, _id: &str) -> Result<Option<Value>> {
        Ok(None)
    }
}
