//! PostgreSQL store, needs a live server

use std::sync::Arc;

use errstore::db::PostgresErrorStore;
use errstore::store::RollupPolicy;
use errstore::{ErrorStore, StoreOptions};

use super::{exercise_store, APP};

#[tokio::test]
#[ignore = "requires ERRSTORE_TEST_PG_URL"]
async fn test_postgres_store_properties() {
    let Ok(url) = std::env::var("ERRSTORE_TEST_PG_URL") else {
        return;
    };

    let options = StoreOptions::new(APP).with_rollup(RollupPolicy::from_seconds(600));
    let store = PostgresErrorStore::connect(&url, options).await.unwrap();
    sqlx::query("DELETE FROM errors")
        .execute(store.pool())
        .await
        .unwrap();

    let store: Arc<dyn ErrorStore> = Arc::new(store);
    exercise_store(store).await;
}
