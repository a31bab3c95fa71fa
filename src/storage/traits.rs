/*!
 * Storage Traits
 * Contract shared by every backend and decorator
 */

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::errors::StorageResult;
use crate::metric::Metric;

/// Server-side metric storage
///
/// Gauges are overwritten, counters are added to the stored total (zero when
/// absent). Gauges and counters live in separate namespaces. Absence is
/// reported as [`StorageError::NotFound`](crate::core::errors::StorageError::NotFound).
#[async_trait]
pub trait Storage: Send + Sync {
    /// Apply one metric
    async fn store(&self, metric: &Metric) -> StorageResult<()>;

    /// Apply a sequence as one logical unit where the backend supports it
    async fn store_batch(&self, metrics: &[Metric]) -> StorageResult<()>;

    /// Current gauge value
    async fn gauge(&self, name: &str) -> StorageResult<f64>;

    /// Current counter total
    async fn counter(&self, name: &str) -> StorageResult<i64>;

    /// Every stored metric, no defined order
    async fn list(&self) -> StorageResult<Vec<Metric>>;
}

#[async_trait]
impl<S: Storage + ?Sized> Storage for Arc<S> {
    async fn store(&self, metric: &Metric) -> StorageResult<()> {
        (**self).store(metric).await
    }

    async fn store_batch(&self, metrics: &[Metric]) -> StorageResult<()> {
        (**self).store_batch(metrics).await
    }

    async fn gauge(&self, name: &str) -> StorageResult<f64> {
        (**self).gauge(name).await
    }

    async fn counter(&self, name: &str) -> StorageResult<i64> {
        (**self).counter(name).await
    }

    async fn list(&self) -> StorageResult<Vec<Metric>> {
        (**self).list().await
    }
}
