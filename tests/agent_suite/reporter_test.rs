/*!
 * Reporter Tests
 * Delivery classification against a mocked sink
 */

use async_trait::async_trait;
use metrics_relay::{AgentError, DeliveryError, Metric, Reporter, Sink};
use mockall::{mock, predicate, Sequence};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mock! {
    pub Collector {}

    #[async_trait]
    impl Sink for Collector {
        async fn deliver(&self, batch: &[Metric]) -> Result<(), DeliveryError>;
    }
}

async fn closed_input(metrics: Vec<Metric>) -> mpsc::Receiver<Metric> {
    let (tx, rx) = mpsc::channel(metrics.len().max(1));
    for metric in metrics {
        tx.send(metric).await.unwrap();
    }
    rx
}

fn gauges(n: usize) -> Vec<Metric> {
    (0..n).map(|i| Metric::gauge(format!("g{}", i), i as f64)).collect()
}

#[tokio::test(start_paused = true)]
async fn test_chunks_are_sent_in_order() {
    let mut sink = MockCollector::new();
    let mut seq = Sequence::new();
    for expected in [10usize, 10, 3] {
        sink.expect_deliver()
            .withf(move |batch: &[Metric]| batch.len() == expected)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
    }

    Reporter::new(sink, Duration::from_secs(10), CancellationToken::new())
        .run(closed_input(gauges(23)).await)
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_forbidden_is_sent_once() {
    let mut sink = MockCollector::new();
    sink.expect_deliver()
        .times(1)
        .returning(|_| Err(DeliveryError::Forbidden));

    let err = Reporter::new(sink, Duration::from_secs(10), CancellationToken::new())
        .run(closed_input(gauges(2)).await)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AgentError::Delivery {
            attempts: 1,
            source: DeliveryError::Forbidden
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_recover() {
    let mut sink = MockCollector::new();
    let mut seq = Sequence::new();
    sink.expect_deliver()
        .times(2)
        .in_sequence(&mut seq)
        .returning(|_| Err(DeliveryError::Transport("connection refused".into())));
    sink.expect_deliver()
        .with(predicate::function(|batch: &[Metric]| batch.len() == 1))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));

    let start = tokio::time::Instant::now();
    Reporter::new(sink, Duration::from_secs(10), CancellationToken::new())
        .run(closed_input(gauges(1)).await)
        .await
        .unwrap();

    // Slept 1s then 3s between the three attempts
    assert_eq!(start.elapsed(), Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_shared_limiter_serializes_reporters() {
    struct Slow {
        active: Arc<std::sync::atomic::AtomicUsize>,
        peak: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait]
    impl Sink for Slow {
        async fn deliver(&self, _batch: &[Metric]) -> Result<(), DeliveryError> {
            use std::sync::atomic::Ordering;
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let active = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let peak = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let permits = Arc::new(tokio::sync::Semaphore::new(1));

    let mut tasks = Vec::new();
    for _ in 0..3 {
        let sink = Slow {
            active: active.clone(),
            peak: peak.clone(),
        };
        let reporter = Reporter::new(sink, Duration::from_secs(10), CancellationToken::new())
            .with_permits(permits.clone());
        tasks.push(tokio::spawn(reporter.run(closed_input(gauges(5)).await)));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(peak.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(permits.available_permits(), 1);
}
