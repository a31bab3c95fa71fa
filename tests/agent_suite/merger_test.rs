/*!
 * Merger Tests
 * Completion and multiset union over arbitrary inputs
 */

use metrics_relay::Merger;
use proptest::prelude::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_output_is_union_and_closes_after_all_inputs(
        inputs in prop::collection::vec(prop::collection::vec(any::<u16>(), 0..30), 0..6)
    ) {
        let rt = runtime();
        let mut received = rt.block_on(async {
            let mut receivers = Vec::new();
            let mut producers = Vec::new();
            for items in inputs.clone() {
                let (tx, rx) = mpsc::channel(1);
                receivers.push(rx);
                producers.push(tokio::spawn(async move {
                    for item in items {
                        tx.send(item).await.unwrap();
                    }
                }));
            }

            let (mut output, forwarders) = Merger::new(CancellationToken::new())
                .merge(receivers)
                .into_parts();

            let mut received = Vec::new();
            while let Some(item) = output.recv().await {
                received.push(item);
            }
            // Output closed: every input must have closed first
            assert_eq!(forwarders.remaining(), 0);
            for producer in producers {
                producer.await.unwrap();
            }
            forwarders.join().await;
            received
        });

        let mut expected: Vec<u16> = inputs.into_iter().flatten().collect();
        expected.sort_unstable();
        received.sort_unstable();
        prop_assert_eq!(received, expected);
    }
}

#[tokio::test]
async fn test_per_input_order_is_preserved() {
    let (tx_a, rx_a) = mpsc::channel(8);
    let (tx_b, rx_b) = mpsc::channel(8);
    for i in 0..5 {
        tx_a.send(("a", i)).await.unwrap();
        tx_b.send(("b", i)).await.unwrap();
    }
    drop((tx_a, tx_b));

    let mut merged = Merger::new(CancellationToken::new()).merge(vec![rx_a, rx_b]);
    let mut received = Vec::new();
    while let Some(item) = merged.output.recv().await {
        received.push(item);
    }

    for source in ["a", "b"] {
        let seq: Vec<i32> = received.iter().filter(|(s, _)| *s == source).map(|(_, i)| *i).collect();
        assert_eq!(seq, vec![0, 1, 2, 3, 4]);
    }
}
