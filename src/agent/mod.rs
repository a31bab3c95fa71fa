/*!
 * Agent Pipeline
 * Samplers feeding a merger feeding a rate-limited, retrying reporter
 *
 * Every stage shares one cancellation token. The coordinator waits for all
 * tasks and returns the first error; that error also cancels the token, so
 * one failed sampler or reporter stops the whole pipeline.
 */

pub mod merger;
pub mod reporter;
pub mod sampler;
pub mod sink;

// Re-exports
pub use merger::{Merged, Merger};
pub use reporter::Reporter;
pub use sampler::{spawn_sampler, HostSampler, RuntimeSampler, Sampler, SamplerHandle};
pub use sink::{DeliveryError, HttpSink, Sink};

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::AgentConfig;
use crate::core::errors::AgentError;
use crate::core::retry::RetryPolicy;

/// Supervising coordinator for one pipeline
pub struct Agent {
    samplers: Vec<Box<dyn Sampler>>,
    sink: Arc<dyn Sink>,
    poll_interval: Duration,
    report_interval: Duration,
    permits: Arc<Semaphore>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl Agent {
    pub fn new(config: &AgentConfig, sink: Arc<dyn Sink>) -> Self {
        Self {
            samplers: Vec::new(),
            sink,
            poll_interval: config.poll_interval,
            report_interval: config.report_interval,
            permits: Arc::new(Semaphore::new(config.rate_limit.max(1))),
            policy: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_sampler(mut self, sampler: impl Sampler) -> Self {
        self.samplers.push(Box::new(sampler));
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Token that stops the pipeline when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until cancelled or until the first task fails
    pub async fn run(self) -> Result<(), AgentError> {
        let cancel = self.cancel;
        let mut tasks: FuturesUnordered<JoinHandle<Result<(), AgentError>>> = FuturesUnordered::new();
        let mut streams = Vec::with_capacity(self.samplers.len());

        for sampler in self.samplers {
            let handle = spawn_sampler(sampler, self.poll_interval, cancel.clone());
            streams.push(handle.events);
            tasks.push(handle.task);
        }

        let (merged, forwarders) = Merger::new(cancel.clone()).merge(streams).into_parts();
        tasks.push(
            Reporter::from_arc(self.sink, self.report_interval, cancel.clone())
                .with_permits(self.permits)
                .with_policy(self.policy)
                .spawn(merged),
        );
        info!(tasks = tasks.len(), "agent pipeline started");

        let mut first_error = None;
        while let Some(joined) = tasks.next().await {
            let result = joined.map_err(AgentError::from).and_then(|result| result);
            if let Err(e) = result {
                if first_error.is_none() {
                    error!(error = %e, "pipeline task failed, cancelling");
                    cancel.cancel();
                    first_error = Some(e);
                } else {
                    debug!(error = %e, "further pipeline task error");
                }
            }
        }
        forwarders.join().await;

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("agent pipeline stopped");
                Ok(())
            }
        }
    }
}
