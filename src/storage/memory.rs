/*!
 * In-Memory Storage Backend
 * Two per-kind maps behind a single reader/writer lock
 */

use ahash::RandomState;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::traits::Storage;
use crate::core::errors::{StorageError, StorageResult};
use crate::metric::{Metric, MetricKind, MetricValue};

#[derive(Debug, Default)]
struct Maps {
    gauges: HashMap<String, f64, RandomState>,
    counters: HashMap<String, i64, RandomState>,
}

impl Maps {
    fn counter_total(&self, name: &str, delta: i64) -> StorageResult<i64> {
        let current = self.counters.get(name).copied().unwrap_or(0);
        current
            .checked_add(delta)
            .ok_or_else(|| StorageError::Overflow {
                name: name.to_string(),
            })
    }
}

/// Concurrent map-backed store
///
/// Reads take the shared lock, writes the exclusive one. A batch holds the
/// exclusive lock for its whole sequence and is applied all-or-nothing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    maps: RwLock<Maps>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored metrics across both kinds
    pub fn len(&self) -> usize {
        let maps = self.maps.read();
        maps.gauges.len() + maps.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn store(&self, metric: &Metric) -> StorageResult<()> {
        metric.validate()?;

        let mut maps = self.maps.write();
        match metric.value {
            MetricValue::Gauge(v) => {
                maps.gauges.insert(metric.name.clone(), v);
            }
            MetricValue::Counter(delta) => {
                let total = maps.counter_total(&metric.name, delta)?;
                maps.counters.insert(metric.name.clone(), total);
            }
        }
        Ok(())
    }

    async fn store_batch(&self, metrics: &[Metric]) -> StorageResult<()> {
        for metric in metrics {
            metric.validate()?;
        }

        let mut maps = self.maps.write();

        // Stage counter totals first so an overflow leaves the maps untouched
        let mut staged: HashMap<&str, i64, RandomState> = HashMap::default();
        for metric in metrics {
            if let MetricValue::Counter(delta) = metric.value {
                let total = match staged.get(metric.name.as_str()) {
                    Some(&current) => current.checked_add(delta).ok_or_else(|| {
                        StorageError::Overflow {
                            name: metric.name.clone(),
                        }
                    })?,
                    None => maps.counter_total(&metric.name, delta)?,
                };
                staged.insert(metric.name.as_str(), total);
            }
        }

        for metric in metrics {
            if let MetricValue::Gauge(v) = metric.value {
                maps.gauges.insert(metric.name.clone(), v);
            }
        }
        for (name, total) in staged {
            maps.counters.insert(name.to_string(), total);
        }
        Ok(())
    }

    async fn gauge(&self, name: &str) -> StorageResult<f64> {
        self.maps
            .read()
            .gauges
            .get(name)
            .copied()
            .ok_or_else(|| StorageError::not_found(MetricKind::Gauge, name))
    }

    async fn counter(&self, name: &str) -> StorageResult<i64> {
        self.maps
            .read()
            .counters
            .get(name)
            .copied()
            .ok_or_else(|| StorageError::not_found(MetricKind::Counter, name))
    }

    async fn list(&self) -> StorageResult<Vec<Metric>> {
        let maps = self.maps.read();
        let mut metrics = Vec::with_capacity(maps.gauges.len() + maps.counters.len());
        metrics.extend(
            maps.counters
                .iter()
                .map(|(name, total)| Metric::counter(name.clone(), *total)),
        );
        metrics.extend(
            maps.gauges
                .iter()
                .map(|(name, value)| Metric::gauge(name.clone(), *value)),
        );
        Ok(metrics)
    }
}
