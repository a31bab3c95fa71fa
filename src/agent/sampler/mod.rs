/*!
 * Samplers
 * Periodic producers of metric events
 *
 * A sampler computes a fixed, named set of measurements per tick. Its task
 * emits each one as a separate event and blocks while the consumer is not
 * ready. A failed measurement ends the task with an error and cancels the
 * shared token so sibling tasks stop too.
 */

mod host;
mod runtime;

pub use host::HostSampler;
pub use runtime::RuntimeSampler;

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument, Span};

use crate::core::errors::{AgentError, SamplerError};
use crate::core::limits::{MIN_TICK_INTERVAL, SAMPLER_CHANNEL_CAPACITY};
use crate::metric::Metric;

/// Measurement source driven by [`spawn_sampler`]
pub trait Sampler: Send + 'static {
    /// Stable name used in logs and errors
    fn name(&self) -> &'static str;

    /// Compute one burst of measurements
    fn sample(&mut self) -> Result<Vec<Metric>, SamplerError>;
}

impl Sampler for Box<dyn Sampler> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn sample(&mut self) -> Result<Vec<Metric>, SamplerError> {
        (**self).sample()
    }
}

/// Running sampler: its event stream and its task
pub struct SamplerHandle {
    pub events: mpsc::Receiver<Metric>,
    pub task: JoinHandle<Result<(), AgentError>>,
}

/// Start `sampler` on `interval` in its own task
pub fn spawn_sampler<S: Sampler>(sampler: S, interval: Duration, cancel: CancellationToken) -> SamplerHandle {
    let span = info_span!("sampler", name = sampler.name());
    spawn_sampler_in(sampler, interval, cancel, span)
}

/// Like [`spawn_sampler`] with an explicit span
pub fn spawn_sampler_in<S: Sampler>(
    sampler: S,
    interval: Duration,
    cancel: CancellationToken,
    span: Span,
) -> SamplerHandle {
    let (tx, events) = mpsc::channel(SAMPLER_CHANNEL_CAPACITY);
    let interval = interval.max(MIN_TICK_INTERVAL);
    let task = tokio::spawn(run_sampler_loop(sampler, interval, tx, cancel).instrument(span));
    SamplerHandle { events, task }
}

async fn run_sampler_loop<S: Sampler>(
    mut sampler: S,
    interval: Duration,
    tx: mpsc::Sender<Metric>,
    cancel: CancellationToken,
) -> Result<(), AgentError> {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!(interval_ms = interval.as_millis() as u64, "sampler started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("sampler stopped");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        let metrics = match sampler.sample() {
            Ok(metrics) => metrics,
            Err(e) => {
                error!(error = %e, "sampling failed, cancelling pipeline");
                cancel.cancel();
                return Err(e.into());
            }
        };
        debug!(count = metrics.len(), "sampled");

        for metric in metrics {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("sampler stopped");
                    return Ok(());
                }
                sent = tx.send(metric) => {
                    if sent.is_err() {
                        debug!("consumer gone, sampler exiting");
                        return Ok(());
                    }
                }
            }
        }
    }
}
