/*!
 * Storage Scenario Tests
 * The same contract checked against every backend and decorator chain
 */

use metrics_relay::core::retry::RetryPolicy;
use metrics_relay::{FileSnapshotStore, MemoryStore, Metric, RelationalStore, ResilientStore, Storage};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tempfile::TempDir;

async fn check_contract(store: &dyn Storage) {
    store.store(&Metric::counter("requests", 5)).await.unwrap();
    store.store(&Metric::counter("requests", 3)).await.unwrap();
    assert_eq!(store.counter("requests").await.unwrap(), 8);

    store.store(&Metric::gauge("temp", 10.0)).await.unwrap();
    store.store(&Metric::gauge("temp", 12.5)).await.unwrap();
    assert_eq!(store.gauge("temp").await.unwrap(), 12.5);

    assert!(store.counter("missing").await.unwrap_err().is_not_found());
    assert!(store.gauge("missing").await.unwrap_err().is_not_found());

    // Kinds do not collide
    store.store(&Metric::gauge("requests", 0.5)).await.unwrap();
    assert_eq!(store.counter("requests").await.unwrap(), 8);
    assert_eq!(store.gauge("requests").await.unwrap(), 0.5);

    store
        .store_batch(&[Metric::counter("requests", 2), Metric::gauge("temp", 1.0)])
        .await
        .unwrap();
    assert_eq!(store.counter("requests").await.unwrap(), 10);

    let mut list = store.list().await.unwrap();
    list.sort_by(|a, b| (a.kind().as_str(), &a.name).cmp(&(b.kind().as_str(), &b.name)));
    assert_eq!(
        list,
        vec![
            Metric::counter("requests", 10),
            Metric::gauge("requests", 0.5),
            Metric::gauge("temp", 1.0),
        ]
    );

    assert!(store.store(&Metric::counter("", 1)).await.is_err());
    assert!(store.store(&Metric::gauge("nan", f64::NAN)).await.is_err());
}

#[tokio::test]
async fn test_memory_store_contract() {
    check_contract(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_snapshot_store_contract() {
    let dir = TempDir::new().unwrap();
    let store = FileSnapshotStore::open(MemoryStore::new(), dir.path().join("db.json"), Duration::ZERO)
        .await
        .unwrap();
    check_contract(&store).await;
}

#[tokio::test]
async fn test_relational_store_contract() {
    let dir = TempDir::new().unwrap();
    let store = RelationalStore::open(dir.path().join("metrics.db")).await.unwrap();
    store.apply_schema().await.unwrap();
    check_contract(&store).await;
    store.close().await;
}

#[tokio::test]
async fn test_resilient_chain_contract() {
    let dir = TempDir::new().unwrap();
    let snapshot = FileSnapshotStore::open(MemoryStore::new(), dir.path().join("db.json"), Duration::ZERO)
        .await
        .unwrap();
    let store = ResilientStore::with_policy(snapshot, RetryPolicy::with_unit(Duration::from_millis(1)));
    check_contract(&store).await;
}
