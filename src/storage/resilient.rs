/*!
 * Resilient Storage Wrapper
 * Decorator adding bounded retry to any Storage
 */

use async_trait::async_trait;
use std::sync::Arc;

use super::traits::Storage;
use crate::core::errors::{StorageError, StorageResult};
use crate::core::retry::RetryPolicy;
use crate::metric::Metric;

/// Retries transient backend faults under the shared backoff policy
///
/// Not-found and validation failures are expected outcomes and return after
/// a single attempt.
pub struct ResilientStore<S: Storage> {
    /// Inner storage implementation
    inner: Arc<S>,
    policy: RetryPolicy,
}

impl<S: Storage> ResilientStore<S> {
    pub fn new(inner: S) -> Self {
        Self::with_policy(inner, RetryPolicy::default())
    }

    pub fn with_policy(inner: S, policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(inner),
            policy,
        }
    }

    /// Wrap an Arc'd store
    pub fn from_arc(inner: Arc<S>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Get reference to inner store
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

fn is_terminal(err: &StorageError) -> bool {
    !err.is_retryable()
}

#[async_trait]
impl<S: Storage> Storage for ResilientStore<S> {
    async fn store(&self, metric: &Metric) -> StorageResult<()> {
        let inner = &self.inner;
        self.policy
            .retry(move || inner.store(metric), is_terminal)
            .await
    }

    async fn store_batch(&self, metrics: &[Metric]) -> StorageResult<()> {
        let inner = &self.inner;
        self.policy
            .retry(move || inner.store_batch(metrics), is_terminal)
            .await
    }

    async fn gauge(&self, name: &str) -> StorageResult<f64> {
        let inner = &self.inner;
        self.policy
            .retry(move || inner.gauge(name), is_terminal)
            .await
    }

    async fn counter(&self, name: &str) -> StorageResult<i64> {
        let inner = &self.inner;
        self.policy
            .retry(move || inner.counter(name), is_terminal)
            .await
    }

    async fn list(&self) -> StorageResult<Vec<Metric>> {
        let inner = &self.inner;
        self.policy.retry(move || inner.list(), is_terminal).await
    }
}
