/*!
 * Metrics Agent - Main Entry Point
 *
 * Samples process and host statistics and ships them to the collector:
 * - Runtime and host samplers
 * - Fan-in of both streams
 * - Batched, rate-limited, retrying HTTP delivery
 */

use std::sync::Arc;
use tracing::{info, warn};

use metrics_relay::{init_tracing, Agent, AgentConfig, HostSampler, HttpSink, RuntimeSampler};

#[tokio::main]
async fn main() -> miette::Result<()> {
    init_tracing();

    let config = AgentConfig::from_env()?;
    info!(
        address = %config.address,
        poll_secs = config.poll_interval.as_secs(),
        report_secs = config.report_interval.as_secs(),
        rate_limit = config.rate_limit,
        "metrics agent starting"
    );

    let sink = HttpSink::new(&config.address, config.request_timeout)?;
    info!(endpoint = sink.endpoint(), "delivering to collector");

    let agent = Agent::new(&config, Arc::new(sink))
        .with_sampler(RuntimeSampler::new()?)
        .with_sampler(HostSampler::new());

    let cancel = agent.cancel_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        cancel.cancel();
    });

    agent.run().await?;
    info!("metrics agent stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
