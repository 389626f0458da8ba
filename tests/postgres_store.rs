// tests/postgres_store.rs
//! Requires `--features postgres-tests` and a scratch database in EDC_TEST_DATABASE_URL.
#![cfg(feature = "postgres-tests")]

use std::sync::Arc;

use deadpool_postgres::{Config, Runtime};
use edc_poller::ingest::extract;
use edc_poller::ingest::fields::RowDefaults;
use edc_poller::ingest::providers;
use edc_poller::ingest::sink::database::ACTIVITIES_DDL;
use edc_poller::ingest::sink::{DatabaseSink, PostgresStore};
use edc_poller::ingest::types::ResponseFormat;
use tokio_postgres::NoTls;

const XML: &str = include_str!("fixtures/activities.xml");

#[tokio::test]
async fn upsert_keeps_one_row_per_key() {
    let url = std::env::var("EDC_TEST_DATABASE_URL").expect("EDC_TEST_DATABASE_URL");
    let mut cfg = Config::new();
    cfg.url = Some(url);
    let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls).unwrap();

    let client = pool.get().await.unwrap();
    client.batch_execute("DROP TABLE IF EXISTS activities").await.unwrap();
    client.batch_execute(ACTIVITIES_DDL).await.unwrap();
    drop(client);

    let store = Arc::new(PostgresStore::from_pool(pool.clone()));
    let sink = DatabaseSink::new(
        store,
        RowDefaults {
            publisher: "Twitter".into(),
            job_uuid: None,
            rehydration: false,
        },
    );

    let doc = providers::decode(ResponseFormat::Xml, XML).unwrap();
    extract("1", &doc, ResponseFormat::Xml, &sink).await;
    let mut edited = doc.clone();
    edited.entries[0].body = "second pass".into();
    let summary = extract("1", &edited, ResponseFormat::Xml, &sink).await;
    assert_eq!(summary.stored, 3);

    let client = pool.get().await.unwrap();
    let count: i64 = client
        .query_one("SELECT COUNT(*) FROM activities", &[])
        .await
        .unwrap()
        .get(0);
    assert_eq!(count, 3);
    let body: String = client
        .query_one(
            "SELECT body FROM activities WHERE native_id = $1 AND publisher = $2",
            &[&198308769506136064_i64, &"twitter"],
        )
        .await
        .unwrap()
        .get(0);
    assert_eq!(body, "second pass");
}
