/*!
 * Fan-in Merger
 * Combines N event streams into one
 *
 * One forwarder task per input, each owning a clone of the output sender.
 * The output closes when the last forwarder drops its sender, which happens
 * only after its input closed (or the pipeline was cancelled). The remaining
 * input count is decremented right before that drop.
 */

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument, Span};

use crate::core::limits::MERGER_CHANNEL_CAPACITY;

/// Merged stream and the forwarder tasks feeding it
pub struct Merged<T> {
    pub output: mpsc::Receiver<T>,
    remaining: Arc<AtomicUsize>,
    tasks: Vec<JoinHandle<()>>,
}

impl<T> Merged<T> {
    /// Inputs still open
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Split into the output and a joinable group of forwarders
    pub fn into_parts(self) -> (mpsc::Receiver<T>, Forwarders) {
        (
            self.output,
            Forwarders {
                remaining: self.remaining,
                tasks: self.tasks,
            },
        )
    }
}

/// Forwarder tasks of a merge
pub struct Forwarders {
    remaining: Arc<AtomicUsize>,
    tasks: Vec<JoinHandle<()>>,
}

impl Forwarders {
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Wait for every forwarder to exit
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "merger forwarder join error");
            }
        }
    }
}

/// Builder for a fan-in stage
pub struct Merger {
    cancel: CancellationToken,
    capacity: usize,
    span: Span,
}

impl Merger {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            capacity: MERGER_CHANNEL_CAPACITY,
            span: info_span!("merger"),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Forward every event of every input into one output stream
    ///
    /// With no inputs the output is closed immediately.
    pub fn merge<T: Send + 'static>(self, inputs: Vec<mpsc::Receiver<T>>) -> Merged<T> {
        let (tx, output) = mpsc::channel(self.capacity);
        let remaining = Arc::new(AtomicUsize::new(inputs.len()));

        let tasks = inputs
            .into_iter()
            .enumerate()
            .map(|(input_id, input)| {
                tokio::spawn(
                    forward(input, tx.clone(), remaining.clone(), self.cancel.clone())
                        .instrument(info_span!(parent: &self.span, "forwarder", input_id)),
                )
            })
            .collect();

        Merged {
            output,
            remaining,
            tasks,
        }
    }
}

async fn forward<T>(
    mut input: mpsc::Receiver<T>,
    tx: mpsc::Sender<T>,
    remaining: Arc<AtomicUsize>,
    cancel: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            item = input.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = tx.send(item) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }

    if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
        debug!("last merger input closed");
    }
    drop(tx);
}
