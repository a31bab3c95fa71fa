/*!
 * Pipeline Tests
 * Samplers through the agent into a server-side store
 */

use async_trait::async_trait;
use metrics_relay::{
    Agent, AgentConfig, AgentError, DeliveryError, MemoryStore, Metric, Sampler, SamplerError, Sink,
    Storage,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Applies every chunk to a store the way a collector would
struct StoreSink {
    store: Arc<MemoryStore>,
}

#[async_trait]
impl Sink for StoreSink {
    async fn deliver(&self, batch: &[Metric]) -> Result<(), DeliveryError> {
        self.store
            .store_batch(batch)
            .await
            .map_err(|e| DeliveryError::Rejected {
                status: 400,
                body: e.to_string(),
            })
    }
}

struct PollCounter {
    polls: Arc<AtomicU32>,
}

impl Sampler for PollCounter {
    fn name(&self) -> &'static str {
        "poll-counter"
    }

    fn sample(&mut self) -> Result<Vec<Metric>, SamplerError> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(vec![
            Metric::counter("PollCount", 1),
            Metric::gauge("LastPoll", f64::from(poll)),
        ])
    }
}

fn config() -> AgentConfig {
    AgentConfig {
        poll_interval: Duration::from_secs(2),
        report_interval: Duration::from_secs(10),
        ..AgentConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_counter_deltas_sum_on_server() {
    let store = Arc::new(MemoryStore::new());
    let polls = Arc::new(AtomicU32::new(0));
    let agent = Agent::new(&config(), Arc::new(StoreSink { store: store.clone() }))
        .with_sampler(PollCounter { polls: polls.clone() });
    let cancel = agent.cancel_token();
    let run = tokio::spawn(agent.run());

    tokio::time::sleep(Duration::from_secs(31)).await;
    cancel.cancel();
    run.await.unwrap().unwrap();

    // Everything up to the last flush at 30s reached the store
    let delivered = store.counter("PollCount").await.unwrap();
    let gauge = store.gauge("LastPoll").await.unwrap();
    assert!(delivered >= 14 && delivered <= 15, "delivered {}", delivered);
    // A flush may land between the two events of one tick
    assert!((gauge - delivered as f64).abs() <= 1.0, "gauge {}", gauge);
    assert!(polls.load(Ordering::SeqCst) >= delivered as u32);
}

#[tokio::test(start_paused = true)]
async fn test_server_rejection_exhausts_and_stops_agent() {
    struct Down;

    #[async_trait]
    impl Sink for Down {
        async fn deliver(&self, _batch: &[Metric]) -> Result<(), DeliveryError> {
            Err(DeliveryError::Transport("connection refused".into()))
        }
    }

    let polls = Arc::new(AtomicU32::new(0));
    let agent = Agent::new(&config(), Arc::new(Down)).with_sampler(PollCounter { polls });

    let err = agent.run().await.unwrap_err();
    assert!(matches!(err, AgentError::Delivery { attempts: 6, .. }));
}
