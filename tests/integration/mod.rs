//! Integration tests for the error stores
//!
//! SQLite tests run against a file database in a temp directory. PostgreSQL
//! tests need `ERRSTORE_TEST_PG_URL` and are ignored by default.

mod postgres_store;
mod sqlite_store;

use std::sync::Arc;

use chrono::{Duration, Utc};
use errstore::{ErrorRecord, ErrorStore};

pub const APP: &str = "Integration App";

/// A request-shaped error with every column populated
pub fn sample_error(message: &str) -> ErrorRecord {
    ErrorRecord::new(APP, "System.InvalidOperationException", message)
        .with_source("Checkout.Controllers")
        .with_detail("at Checkout.Controllers.Cart.Submit()\n  at Router.Dispatch()")
        .with_request("POST", "shop.example.com", "/cart/submit?id=42", 500)
        .with_ip_address("10.1.2.3")
        .with_sql("SELECT * FROM carts WHERE id = @id")
        .with_custom_data("tenant", "acme")
        .with_custom_data("build", "2024.06.1")
}

/// Properties every backend has to satisfy
pub async fn exercise_store(store: Arc<dyn ErrorStore>) {
    // Round-trip through the snapshot
    let mut original = sample_error("round trip");
    store.log(&mut original).await.unwrap();
    let mut loaded = store.get(original.guid).await.unwrap().unwrap();
    assert!(loaded.full_json.is_some());
    loaded.full_json = None;
    assert_eq!(loaded, original);

    // No hash never rolls up
    let mut a = sample_error("unhashed");
    let mut b = sample_error("unhashed");
    store.log(&mut a).await.unwrap();
    store.log(&mut b).await.unwrap();
    assert_ne!(a.guid, b.guid);

    // Same hash inside the window rolls up
    let mut first = sample_error("hashed").with_hash(0x5eed);
    let mut second = sample_error("hashed").with_hash(0x5eed);
    store.log(&mut first).await.unwrap();
    store.log(&mut second).await.unwrap();
    assert_eq!(second.guid, first.guid);
    assert_eq!(store.get(first.guid).await.unwrap().unwrap().duplicate_count, 2);

    // Same hash with the earlier record outside the window does not
    let mut stale = sample_error("stale")
        .with_hash(0xbeef)
        .with_created_at(Utc::now() - Duration::hours(3));
    let mut fresh = sample_error("stale").with_hash(0xbeef);
    store.log(&mut stale).await.unwrap();
    store.log(&mut fresh).await.unwrap();
    assert_ne!(fresh.guid, stale.guid);

    assert_eq!(store.count(None, None).await.unwrap(), 6);

    // Delete then get
    assert!(store.delete(a.guid).await.unwrap());
    let deleted = store.get(a.guid).await.unwrap().unwrap();
    assert!(deleted.deletion_date.is_some());
    assert!(!store.delete(a.guid).await.unwrap());

    // Protect undeletes
    assert!(store.protect(a.guid).await.unwrap());
    let protected = store.get(a.guid).await.unwrap().unwrap();
    assert!(protected.deletion_date.is_none());
    assert!(protected.is_protected);

    // Delete all spares protected records
    assert!(store.delete_all(None).await.unwrap());
    let remaining = store.list(None, None).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].guid, a.guid);
    assert_eq!(store.count(None, None).await.unwrap(), 1);

    // Hard delete is namespaced
    let mut foreign = ErrorRecord::new("Another App", "T", "foreign");
    store.log(&mut foreign).await.unwrap();
    assert!(!store.hard_delete(foreign.guid).await.unwrap());
    assert!(store.get(foreign.guid).await.unwrap().is_some());

    assert!(store.hard_delete(stale.guid).await.unwrap());
    assert!(store.get(stale.guid).await.unwrap().is_none());
}
