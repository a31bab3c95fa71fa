/*!
 * Storage Property Tests
 * Counter accumulation, gauge last-write and snapshot round-trip
 */

use metrics_relay::{FileSnapshotStore, MemoryStore, Metric, Storage};
use proptest::prelude::*;
use std::collections::HashMap;
use std::time::Duration;
use tempfile::TempDir;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn metric_strategy() -> impl Strategy<Value = Metric> {
    let name = prop::sample::select(vec!["a", "b", "c", "PollCount"]);
    prop_oneof![
        (name.clone(), -1_000i64..1_000).prop_map(|(n, d)| Metric::counter(n, d)),
        (name, -1.0e6f64..1.0e6).prop_map(|(n, v)| Metric::gauge(n, v)),
    ]
}

/// Expected final state: summed counters, last gauge per name
fn model(metrics: &[Metric]) -> (HashMap<String, i64>, HashMap<String, f64>) {
    let mut counters = HashMap::new();
    let mut gauges = HashMap::new();
    for metric in metrics {
        match metric.value {
            metrics_relay::MetricValue::Counter(d) => *counters.entry(metric.name.clone()).or_insert(0) += d,
            metrics_relay::MetricValue::Gauge(v) => {
                gauges.insert(metric.name.clone(), v);
            }
        }
    }
    (counters, gauges)
}

fn state_of(list: Vec<Metric>) -> (HashMap<String, i64>, HashMap<String, f64>) {
    model(&list)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_batches_match_model(metrics in prop::collection::vec(metric_strategy(), 0..60), chunk in 1usize..8) {
        let rt = runtime();
        let store = MemoryStore::new();
        rt.block_on(async {
            for part in metrics.chunks(chunk) {
                store.store_batch(part).await.unwrap();
            }
        });

        let list = rt.block_on(store.list()).unwrap();
        prop_assert_eq!(state_of(list), model(&metrics));
    }

    #[test]
    fn prop_snapshot_round_trip(metrics in prop::collection::vec(metric_strategy(), 1..40)) {
        let rt = runtime();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");

        let (before, after) = rt.block_on(async {
            let store = FileSnapshotStore::open(MemoryStore::new(), &path, Duration::from_secs(300))
                .await
                .unwrap();
            store.store_batch(&metrics).await.unwrap();
            store.shutdown().await.unwrap();
            let before = store.list().await.unwrap();

            let fresh = FileSnapshotStore::open(MemoryStore::new(), &path, Duration::from_secs(300))
                .await
                .unwrap();
            fresh.restore(true).await.unwrap();
            (before, fresh.list().await.unwrap())
        });

        prop_assert_eq!(before.len(), after.len());
        prop_assert_eq!(state_of(before), state_of(after));
    }
}
