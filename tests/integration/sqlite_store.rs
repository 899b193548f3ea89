//! SQLite store, file backed

use std::sync::Arc;

use chrono::{Duration, Utc};
use errstore::config::{ConnectionStrings, StoreKind, StoreSettings};
use errstore::db::SqliteErrorStore;
use errstore::store::{RollupPolicy, MAXIMUM_DISPLAY_COUNT};
use errstore::{open_store, ErrorRecord, ErrorStore, StoreOptions};
use tokio_test::assert_ok;

use super::{exercise_store, sample_error, APP};

fn settings_for(dir: &tempfile::TempDir) -> (StoreSettings, ConnectionStrings) {
    let path = dir.path().join("errors.db");
    let settings = StoreSettings {
        kind: StoreKind::Sqlite,
        application_name: APP.to_string(),
        connection_string_name: Some("errors".to_string()),
        rollup_seconds: 600,
        ..Default::default()
    };
    let named = ConnectionStrings::from([(
        "errors".to_string(),
        format!("sqlite://{}", path.display()),
    )]);
    (settings, named)
}

#[tokio::test]
async fn test_sqlite_store_properties() {
    let dir = tempfile::tempdir().unwrap();
    let (settings, named) = settings_for(&dir);

    let store = assert_ok!(open_store(&settings, &named).await);
    assert_eq!(store.name(), "SQLite Error Store");
    exercise_store(store).await;
}

#[tokio::test]
async fn test_sqlite_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let (settings, named) = settings_for(&dir);

    let mut error = sample_error("persisted").with_hash(99);
    {
        let store = open_store(&settings, &named).await.unwrap();
        store.log(&mut error).await.unwrap();
    }

    let store = open_store(&settings, &named).await.unwrap();
    let loaded = store.get(error.guid).await.unwrap().unwrap();
    assert_eq!(loaded.message, "persisted");
    assert_eq!(loaded.custom_data.unwrap()["tenant"], "acme");

    // The reopened store still rolls up into the persisted row
    let mut duplicate = sample_error("persisted").with_hash(99);
    store.log(&mut duplicate).await.unwrap();
    assert_eq!(duplicate.guid, error.guid);
}

#[tokio::test]
async fn test_list_is_capped_at_maximum() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("many.db").display());
    let options = StoreOptions::new(APP).with_rollup(RollupPolicy::disabled());
    let store: Arc<dyn ErrorStore> = Arc::new(SqliteErrorStore::connect(&url, options).await.unwrap());

    let now = Utc::now();
    for i in 0..(MAXIMUM_DISPLAY_COUNT as i64 + 20) {
        let mut error = ErrorRecord::new(APP, "T", format!("error {}", i))
            .with_created_at(now - Duration::seconds(i));
        store.log(&mut error).await.unwrap();
    }

    let listed = store.list(None, Some(10_000)).await.unwrap();
    assert_eq!(listed.len(), MAXIMUM_DISPLAY_COUNT as usize);
    assert!(listed
        .windows(2)
        .all(|pair| pair[0].creation_date >= pair[1].creation_date));
    assert_eq!(listed[0].message, "error 0");

    assert_eq!(store.list(None, None).await.unwrap().len(), 200);
}

#[tokio::test]
async fn test_memory_store_properties() {
    let settings = StoreSettings {
        kind: StoreKind::Memory,
        application_name: APP.to_string(),
        ..Default::default()
    };

    let store = open_store(&settings, &ConnectionStrings::new()).await.unwrap();
    exercise_store(store).await;
}
