//! DedupStore integration tests over both backends

use chrono::Utc;
use leakwatch_ingest::models::{ContentType, MessageId, Record};
use leakwatch_ingest::store::{CsvTable, DedupStore, SqliteTable, StoreBackend, RECORD_SCHEMA};
use leakwatch_ingest::StoreError;
use std::path::Path;

fn record(email: &str, password: &str, message: i64) -> Record {
    Record::new(
        email,
        password,
        "",
        ContentType::EmailPassword,
        "a.txt",
        MessageId::from(message),
        Utc::now(),
    )
    .unwrap()
}

async fn open(path: &Path, backend: StoreBackend) -> DedupStore {
    let store = DedupStore::open(path, backend).unwrap();
    store.initialize().await.unwrap();
    store
}

async fn check_append_idempotent(backend: StoreBackend, file: &str) {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir.path().join(file), backend).await;
    let batch = vec![record("a@x.com", "1", 1), record("b@x.com", "2", 1)];

    assert_eq!(store.append_batch(batch.clone()).await.unwrap(), 2);
    assert_eq!(store.append_batch(batch).await.unwrap(), 0);
    assert_eq!(store.len().await.unwrap(), 2);
}

async fn check_intra_batch_first_wins(backend: StoreBackend, file: &str) {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir.path().join(file), backend).await;

    let inserted = store
        .append_batch(vec![
            record("a@x.com", "1", 10),
            record("a@x.com", "1", 20),
            record("a@x.com", "other", 30),
        ])
        .await
        .unwrap();

    assert_eq!(inserted, 2);
    let rows = store.rows().await.unwrap();
    assert_eq!(rows[0].source_message_id, "10");
    assert_eq!(rows[1].password, "other");
}

async fn check_dedup_survives_restart(backend: StoreBackend, file: &str) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(file);

    {
        let store = open(&path, backend).await;
        assert_eq!(store.append_batch(vec![record("a@x.com", "1", 1)]).await.unwrap(), 1);
    }

    let reopened = open(&path, backend).await;
    assert_eq!(
        reopened
            .append_batch(vec![record("a@x.com", "1", 2), record("c@x.com", "3", 2)])
            .await
            .unwrap(),
        1
    );
    let rows = reopened.rows().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].source_message_id, "1");
}

#[tokio::test]
async fn test_sqlite_append_idempotent() {
    check_append_idempotent(StoreBackend::Sqlite, "records.sqlite").await;
}

#[tokio::test]
async fn test_csv_append_idempotent() {
    check_append_idempotent(StoreBackend::Csv, "records.csv").await;
}

#[tokio::test]
async fn test_sqlite_intra_batch_first_wins() {
    check_intra_batch_first_wins(StoreBackend::Sqlite, "records.sqlite").await;
}

#[tokio::test]
async fn test_csv_intra_batch_first_wins() {
    check_intra_batch_first_wins(StoreBackend::Csv, "records.csv").await;
}

#[tokio::test]
async fn test_sqlite_dedup_survives_restart() {
    check_dedup_survives_restart(StoreBackend::Sqlite, "records.sqlite").await;
}

#[tokio::test]
async fn test_csv_dedup_survives_restart() {
    check_dedup_survives_restart(StoreBackend::Csv, "records.csv").await;
}

#[tokio::test]
async fn test_initialize_reports_creation_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("records.sqlite");

    let store = DedupStore::open(&path, StoreBackend::Sqlite).unwrap();
    assert!(store.initialize().await.unwrap());
    assert!(!store.initialize().await.unwrap());
}

#[tokio::test]
async fn test_empty_batch_does_not_touch_backend() {
    // table never created: any backend access would fail
    let store = DedupStore::new(SqliteTable::in_memory().unwrap());
    assert_eq!(store.append_batch(Vec::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_append_before_initialize_fails() {
    let store = DedupStore::new(SqliteTable::in_memory().unwrap());
    let err = store.append_batch(vec![record("a@x.com", "1", 1)]).await.unwrap_err();
    assert!(matches!(err, StoreError::NotInitialized(_)));
}

#[tokio::test]
async fn test_foreign_csv_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.csv");
    std::fs::write(&path, "user,pass\nx,y\n").unwrap();

    let store = DedupStore::new(CsvTable::new(&path));
    let err = store.initialize().await.unwrap_err();
    assert!(matches!(err, StoreError::SchemaMismatch { .. }));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "user,pass\nx,y\n");
}

#[tokio::test]
async fn test_concurrent_appends_stay_unique() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir.path().join("records.sqlite"), StoreBackend::Sqlite).await;

    let mut handles = Vec::new();
    for message in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let batch = (0..20)
                .map(|i| record(&format!("user{i}@x.com"), "same", message))
                .collect();
            store.append_batch(batch).await.unwrap()
        }));
    }

    let mut total = 0;
    for handle in handles {
        total += handle.await.unwrap();
    }

    assert_eq!(total, 20);
    assert_eq!(store.len().await.unwrap(), 20);
}

#[test]
fn test_schema_column_order() {
    assert_eq!(
        RECORD_SCHEMA.columns,
        &[
            "timestamp",
            "filename",
            "file_type",
            "content_type",
            "email",
            "domain",
            "password",
            "additional_data",
            "source_message_id",
        ]
    );
}
