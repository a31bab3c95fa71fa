/*!
 * Reporter
 * Batches merged events and flushes them to a sink on a fixed interval
 *
 * Each tick with a non-empty batch acquires a permit from the shared
 * semaphore, splits the batch into chunks and delivers them sequentially.
 * One failed chunk fails the whole attempt, which is then retried under the
 * backoff policy. `Forbidden` aborts at once and ends the reporter.
 *
 * # Lifecycle
 *
 * - Input closed: one final flush of the pending batch, then `Ok(())`.
 * - Cancelled: returns `Ok(())` at the next blocking point; a flush in
 *   progress (including its backoff sleep) is abandoned and its permit
 *   released.
 */

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use super::sink::Sink;
use crate::core::errors::{AgentError, DeliveryError};
use crate::core::limits::{DEFAULT_RATE_LIMIT, DELIVERY_CHUNK_SIZE, MIN_TICK_INTERVAL};
use crate::core::retry::RetryPolicy;
use crate::metric::Metric;

pub struct Reporter {
    sink: Arc<dyn Sink>,
    interval: Duration,
    permits: Arc<Semaphore>,
    policy: RetryPolicy,
    chunk_size: usize,
    cancel: CancellationToken,
    span: Span,
}

impl Reporter {
    pub fn new(sink: impl Sink + 'static, interval: Duration, cancel: CancellationToken) -> Self {
        Self::from_arc(Arc::new(sink), interval, cancel)
    }

    pub fn from_arc(sink: Arc<dyn Sink>, interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            sink,
            interval: interval.max(MIN_TICK_INTERVAL),
            permits: Arc::new(Semaphore::new(DEFAULT_RATE_LIMIT)),
            policy: RetryPolicy::default(),
            chunk_size: DELIVERY_CHUNK_SIZE,
            cancel,
            span: info_span!("reporter"),
        }
    }

    /// Share a concurrency limiter with other reporters
    pub fn with_permits(mut self, permits: Arc<Semaphore>) -> Self {
        self.permits = permits;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Run in a task instrumented with the reporter span
    pub fn spawn(self, input: mpsc::Receiver<Metric>) -> JoinHandle<Result<(), AgentError>> {
        let span = self.span.clone();
        tokio::spawn(self.run(input).instrument(span))
    }

    /// Consume `input` until it closes or the token is cancelled
    pub async fn run(self, mut input: mpsc::Receiver<Metric>) -> Result<(), AgentError> {
        let mut batch: Vec<Metric> = Vec::new();
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            interval_ms = self.interval.as_millis() as u64,
            chunk_size = self.chunk_size,
            "reporter started"
        );

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(pending = batch.len(), "reporter cancelled");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.flush(&mut batch).await?;
                }
                event = input.recv() => match event {
                    Some(metric) => batch.push(metric),
                    None => {
                        info!(pending = batch.len(), "input closed, flushing remaining batch");
                        self.flush(&mut batch).await?;
                        return Ok(());
                    }
                },
            }
        }
    }

    async fn flush(&self, batch: &mut Vec<Metric>) -> Result<(), AgentError> {
        if batch.is_empty() {
            debug!("batch empty, skipping flush");
            return Ok(());
        }

        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(()),
            permit = self.permits.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("rate limiter closed, skipping flush");
                    return Ok(());
                }
            },
        };

        let metrics: &[Metric] = batch;
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(pending = metrics.len(), "flush abandoned on cancellation");
                return Ok(());
            }
            outcome = self.policy.run(
                move || self.deliver_chunks(metrics),
                DeliveryError::is_forbidden,
            ) => outcome,
        };

        let count = batch.len();
        batch.clear();

        match outcome {
            Ok(()) => {
                info!(count, "batch flushed");
                Ok(())
            }
            Err(failure) => {
                error!(
                    error = %failure.error,
                    attempts = failure.attempts,
                    terminal = failure.terminal,
                    "update metrics error"
                );
                Err(AgentError::Delivery {
                    attempts: failure.attempts,
                    source: failure.error,
                })
            }
        }
    }

    async fn deliver_chunks(&self, metrics: &[Metric]) -> Result<(), DeliveryError> {
        for chunk in metrics.chunks(self.chunk_size) {
            self.sink.deliver(chunk).await?;
        }
        Ok(())
    }
}
