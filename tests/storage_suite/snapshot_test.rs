/*!
 * Snapshot Store Tests
 * Restore, periodic flush, crash window and shutdown handshake
 */

use metrics_relay::{FileSnapshotStore, MemoryStore, Metric, Storage};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

fn sorted(mut metrics: Vec<Metric>) -> Vec<Metric> {
    metrics.sort_by(|a, b| (a.kind().as_str(), &a.name).cmp(&(b.kind().as_str(), &b.name)));
    metrics
}

async fn restored(path: &Path) -> Vec<Metric> {
    let store = FileSnapshotStore::open(MemoryStore::new(), path, Duration::from_secs(300))
        .await
        .unwrap();
    store.restore(true).await.unwrap();
    sorted(store.list().await.unwrap())
}

fn sample() -> Vec<Metric> {
    vec![
        Metric::counter("PollCount", 42),
        Metric::gauge("Alloc", 1024.0),
        Metric::gauge("RandomValue", 0.125),
        Metric::counter("Errors", -3),
    ]
}

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("metrics-db.json")
}

#[tokio::test]
async fn test_snapshot_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);

    let store = FileSnapshotStore::open(MemoryStore::new(), &path, Duration::from_secs(300))
        .await
        .unwrap();
    store.store_batch(&sample()).await.unwrap();
    store.flush().await.unwrap();
    let original = sorted(store.list().await.unwrap());

    assert_eq!(restored(&path).await, original);
}

#[tokio::test]
async fn test_zero_interval_survives_crash() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);

    let store = FileSnapshotStore::open(MemoryStore::new(), &path, Duration::ZERO)
        .await
        .unwrap();
    store.restore(true).await.unwrap();
    store.start();
    store.store(&Metric::counter("PollCount", 1)).await.unwrap();
    store.store(&Metric::gauge("Alloc", 7.5)).await.unwrap();

    // No shutdown: the process "crashes" right after the last store
    drop(store);

    assert_eq!(
        restored(&path).await,
        vec![Metric::counter("PollCount", 1), Metric::gauge("Alloc", 7.5)]
    );
}

#[tokio::test]
async fn test_shutdown_flushes_last_state() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);

    let store = FileSnapshotStore::open(MemoryStore::new(), &path, Duration::from_secs(3600))
        .await
        .unwrap();
    store.restore(true).await.unwrap();
    store.start();
    store.store_batch(&sample()).await.unwrap();

    // The timer never fired; only the shutdown flush can have written the file
    assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "");
    store.shutdown().await.unwrap();

    assert_eq!(restored(&path).await, sorted(sample()));
}

#[tokio::test]
async fn test_periodic_snapshot_rewrites_file() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);

    let store = FileSnapshotStore::open(MemoryStore::new(), &path, Duration::from_millis(20))
        .await
        .unwrap();
    store.start();
    store.store(&Metric::counter("PollCount", 5)).await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        if contents.lines().count() == 1 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "snapshot never written");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    store.store(&Metric::counter("PollCount", 5)).await.unwrap();
    store.shutdown().await.unwrap();

    let contents = tokio::fs::read_to_string(&path).await.unwrap();
    assert_eq!(contents, "{\"id\":\"PollCount\",\"type\":\"counter\",\"delta\":10}\n");
}

#[tokio::test]
async fn test_restore_accumulates_into_fresh_store_once() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    tokio::fs::write(
        &path,
        "{\"id\":\"PollCount\",\"type\":\"counter\",\"delta\":4}\n\n{\"id\":\"Alloc\",\"type\":\"gauge\",\"value\":2.0}\n",
    )
    .await
    .unwrap();

    let store = FileSnapshotStore::open(MemoryStore::new(), &path, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(store.restore(true).await.unwrap(), 2);
    assert_eq!(store.counter("PollCount").await.unwrap(), 4);

    store.store(&Metric::counter("PollCount", 1)).await.unwrap();
    store.shutdown().await.unwrap();

    assert_eq!(
        restored(&path).await,
        vec![Metric::counter("PollCount", 5), Metric::gauge("Alloc", 2.0)]
    );
}
