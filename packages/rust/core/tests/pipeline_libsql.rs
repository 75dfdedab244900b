//! Full runs against a real libSQL database file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pricebot_core::{CancelSignal, ProductOutcome, SilentProgress, run_pipeline};
use pricebot_shared::{
    AppConfig, PriceRecord, Product, SourceConfig, SourceErrorKind, SourceKind, WriteErrorKind,
};
use pricebot_storage::{LibsqlStore, MergePolicy, Store};
use rust_decimal_macros::dec;
use serde_json::{Map, Value, json};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PRODUCTS: &str = "products";

fn temp_db() -> PathBuf {
    std::env::temp_dir().join(format!("pricebot_it_{}.db", Uuid::now_v7()))
}

async fn open_store(path: &PathBuf) -> Arc<LibsqlStore> {
    Arc::new(LibsqlStore::open(path).await.expect("open test db"))
}

async fn record(store: &LibsqlStore, id: &str) -> PriceRecord {
    let body = store
        .get(PRODUCTS, id)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("record {id} missing"));
    PriceRecord::from_document(body).unwrap()
}

fn rounded(record: &PriceRecord, supermarket: &str) -> Option<rust_decimal::Decimal> {
    record.price_of(supermarket).map(|p| p.round_dp(2))
}

#[tokio::test]
async fn default_catalog_is_persisted() {
    let db = temp_db();
    let store = open_store(&db).await;

    let summary = run_pipeline(
        &AppConfig::default(),
        store.clone(),
        &CancelSignal::new(),
        &SilentProgress,
    )
    .await
    .unwrap();
    assert_eq!(summary.succeeded, 4);
    assert!(!summary.has_failures());

    let p1 = record(&store, "p1").await;
    assert_eq!(p1.name, "Leite Mimosa Meio Gordo");
    let names: Vec<_> = p1.prices.iter().map(|e| e.supermarket.as_str()).collect();
    assert_eq!(names, vec!["Continente", "Pingo Doce", "Lidl", "Auchan"]);
    assert_eq!(rounded(&p1, "Continente"), Some(dec!(2.29)));
    assert_eq!(rounded(&p1, "Pingo Doce"), Some(dec!(2.28)));
    assert_eq!(rounded(&p1, "Lidl"), Some(dec!(2.24)));
    assert_eq!(rounded(&p1, "Auchan"), Some(dec!(2.33)));
    assert_eq!(p1.last_updated, summary.products[0].last_updated);

    assert_eq!(store.list(PRODUCTS).await.unwrap().len(), 4);
}

#[tokio::test]
async fn repeated_runs_are_idempotent() {
    let db = temp_db();
    let store = open_store(&db).await;
    let config = AppConfig::default();

    run_pipeline(&config, store.clone(), &CancelSignal::new(), &SilentProgress)
        .await
        .unwrap();
    let first = record(&store, "p14").await;

    run_pipeline(&config, store.clone(), &CancelSignal::new(), &SilentProgress)
        .await
        .unwrap();
    let second = record(&store, "p14").await;

    assert_eq!(first.prices, second.prices);
    assert_eq!(second.prices.len(), 4);
    assert!(second.last_updated >= first.last_updated);
}

#[tokio::test]
async fn unrelated_fields_and_existing_name_survive() {
    let db = temp_db();
    let store = open_store(&db).await;

    let Value::Object(seed) = json!({
        "id": "p1",
        "name": "Leite Mimosa 1L",
        "category": "laticínios",
        "prices": [{ "supermarket": "Minipreço", "price": 0.99 }]
    }) else {
        unreachable!()
    };
    store
        .upsert(PRODUCTS, "p1", &seed, &Map::new(), MergePolicy::Merge)
        .await
        .unwrap();

    let mut config = AppConfig::default();
    config.products = vec![Product::new("p1", "leite mimosa meio gordo")];
    run_pipeline(&config, store.clone(), &CancelSignal::new(), &SilentProgress)
        .await
        .unwrap();

    let body = store.get(PRODUCTS, "p1").await.unwrap().unwrap();
    assert_eq!(body["category"], "laticínios");
    assert_eq!(body["name"], "Leite Mimosa 1L");
    // The price list is replaced, not appended to.
    let p1 = PriceRecord::from_document(body).unwrap();
    assert!(p1.price_of("Minipreço").is_none());
    assert_eq!(p1.prices.len(), 4);
}

#[tokio::test]
async fn slow_retailer_is_excluded_without_stalling_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<span class="price">1,00 €</span>"#)
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let mut config = AppConfig::default();
    config.pipeline.per_source_timeout_ms = 200;
    config.pipeline.aggregation_timeout_ms = 1000;
    config.sources = vec![
        SourceConfig::simulated("Continente", dec!(1.99), dec!(0.10)),
        SourceConfig {
            name: "Slow Market".into(),
            kind: SourceKind::Html {
                search_url: format!("{}/search?q={{query}}", server.uri()),
                price_selector: ".price".into(),
            },
        },
    ];

    let db = temp_db();
    let store = open_store(&db).await;
    let started = Instant::now();
    let summary = run_pipeline(&config, store.clone(), &CancelSignal::new(), &SilentProgress)
        .await
        .unwrap();

    // Four products, each bounded by the aggregation timeout.
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(summary.partial, 4);
    for report in &summary.products {
        assert_eq!(report.outcome, ProductOutcome::PartialSuccess);
        assert_eq!(report.failed_sources[0].source_name, "Slow Market");
        assert_eq!(report.failed_sources[0].kind, SourceErrorKind::Timeout);
    }
    let p3 = record(&store, "p3").await;
    assert_eq!(p3.prices.len(), 1);
    assert_eq!(rounded(&p3, "Continente"), Some(dec!(2.09)));
}

#[tokio::test]
async fn html_retailer_prices_are_stored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<div class="tile"><span class="price">3,10 €</span></div>"#),
        )
        .mount(&server)
        .await;

    let mut config = AppConfig::default();
    config.products = vec![Product::new("p1", "leite mimosa meio gordo")];
    config.sources = vec![SourceConfig {
        name: "Continente".into(),
        kind: SourceKind::Html {
            search_url: format!("{}/search?q={{query}}", server.uri()),
            price_selector: ".tile .price".into(),
        },
    }];

    let db = temp_db();
    let store = open_store(&db).await;
    run_pipeline(&config, store.clone(), &CancelSignal::new(), &SilentProgress)
        .await
        .unwrap();

    let p1 = record(&store, "p1").await;
    assert_eq!(rounded(&p1, "Continente"), Some(dec!(3.10)));
}

#[tokio::test]
async fn all_sources_failing_writes_empty_prices() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut config = AppConfig::default();
    config.products = vec![Product::new("p13", "arroz agulha cigala")];
    config.sources = vec![SourceConfig {
        name: "Auchan".into(),
        kind: SourceKind::Html {
            search_url: format!("{}/search?q={{query}}", server.uri()),
            price_selector: ".price".into(),
        },
    }];

    let db = temp_db();
    let store = open_store(&db).await;
    let summary = run_pipeline(&config, store.clone(), &CancelSignal::new(), &SilentProgress)
        .await
        .unwrap();

    assert_eq!(summary.warnings, vec!["p13".to_string()]);
    assert_eq!(summary.products[0].outcome, ProductOutcome::PartialSuccess);
    let p13 = record(&store, "p13").await;
    assert!(p13.prices.is_empty());
    assert_eq!(p13.name, "Arroz Agulha Cigala");
}

#[tokio::test]
async fn readonly_store_fails_every_product_but_finishes() {
    let db = temp_db();
    drop(open_store(&db).await);
    let readonly = Arc::new(LibsqlStore::open_readonly(&db).await.unwrap());

    let summary = run_pipeline(
        &AppConfig::default(),
        readonly.clone(),
        &CancelSignal::new(),
        &SilentProgress,
    )
    .await
    .unwrap();

    assert_eq!(summary.failed, 4);
    assert_eq!(summary.products.len(), 4);
    assert!(summary.has_failures());
    assert!(
        summary
            .failed_products
            .iter()
            .all(|f| f.kind == WriteErrorKind::Rejected)
    );
    assert!(readonly.list(PRODUCTS).await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_config_writes_nothing() {
    let db = temp_db();
    let store = open_store(&db).await;

    let mut config = AppConfig::default();
    config.sources.push(SourceConfig::scaled("Intermarché", "Mercadona", dec!(1.05)));

    let err = run_pipeline(&config, store.clone(), &CancelSignal::new(), &SilentProgress)
        .await
        .unwrap_err();
    assert!(err.is_config());
    assert!(store.list(PRODUCTS).await.unwrap().is_empty());
}

#[tokio::test]
async fn cancelled_run_stops_before_next_product() {
    let db = temp_db();
    let store = open_store(&db).await;
    let cancel = CancelSignal::new();
    cancel.cancel();

    let summary = run_pipeline(&AppConfig::default(), store.clone(), &cancel, &SilentProgress)
        .await
        .unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.not_attempted, 4);
    assert!(store.list(PRODUCTS).await.unwrap().is_empty());
}
