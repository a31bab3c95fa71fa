/*!
 * File Snapshot Storage Wrapper
 * Decorator adding crash recovery and periodic full-state snapshots
 *
 * The snapshot file holds one JSON metric record per line and is rewritten
 * completely on every flush. A background task flushes on a fixed interval;
 * with a zero interval every store flushes synchronously instead.
 *
 * # Shutdown
 *
 * `shutdown().await` asks the background task for one final flush and only
 * returns after the task acknowledged it. If the store is dropped without
 * shutdown, the command channel closes and the task runs its final flush
 * detached; a flush already in progress is never cut off mid-write.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use super::traits::Storage;
use crate::core::errors::{StorageError, StorageResult};
use crate::metric::Metric;

/// Snapshot file guarded by the lock shared between the background task and
/// caller-triggered flushes
struct SnapshotFile {
    file: tokio::sync::Mutex<File>,
    path: PathBuf,
}

impl SnapshotFile {
    /// Rewrite the file with the full current state of `inner`
    async fn flush<S: Storage + ?Sized>(&self, inner: &S) -> StorageResult<usize> {
        let mut file = self.file.lock().await;

        let metrics = inner.list().await?;
        let mut buf = Vec::with_capacity(metrics.len() * 48);
        for metric in &metrics {
            serde_json::to_writer(&mut buf, metric).map_err(|e| StorageError::io("encode", e))?;
            buf.push(b'\n');
        }

        file.set_len(0)
            .await
            .map_err(|e| StorageError::io("truncate", e))?;
        file.seek(SeekFrom::Start(0))
            .await
            .map_err(|e| StorageError::io("seek", e))?;
        file.write_all(&buf)
            .await
            .map_err(|e| StorageError::io("write", e))?;
        file.flush().await.map_err(|e| StorageError::io("write", e))?;
        file.sync_data()
            .await
            .map_err(|e| StorageError::io("sync", e))?;

        Ok(metrics.len())
    }
}

/// Control messages for the snapshot task
#[derive(Debug)]
enum SnapshotCommand {
    /// Flush once more, acknowledge and exit
    Shutdown(oneshot::Sender<StorageResult<()>>),
}

/// Handle to the background snapshot task
struct SnapshotTask {
    command_tx: mpsc::Sender<SnapshotCommand>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl SnapshotTask {
    fn spawn<S: Storage + 'static>(
        inner: Arc<S>,
        file: Arc<SnapshotFile>,
        interval: Duration,
        span: Span,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(1);
        let handle = tokio::spawn(
            run_snapshot_loop(inner, file, interval, command_rx).instrument(span),
        );
        Self {
            command_tx,
            handle: Some(handle),
        }
    }

    async fn shutdown(mut self) -> StorageResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        let sent = self
            .command_tx
            .send(SnapshotCommand::Shutdown(ack_tx))
            .await
            .is_ok();

        let result = if sent {
            ack_rx
                .await
                .unwrap_or_else(|_| Err(StorageError::io("shutdown", "snapshot task exited without acknowledging")))
        } else {
            Err(StorageError::io("shutdown", "snapshot task is not running"))
        };

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "snapshot task join error");
            }
        }
        result
    }
}

impl Drop for SnapshotTask {
    fn drop(&mut self) {
        // Dropping the sender after this body ends the loop with a final flush
        if self.handle.take().is_some() {
            warn!("snapshot store dropped without shutdown; detaching snapshot task");
        }
    }
}

async fn run_snapshot_loop<S: Storage>(
    inner: Arc<S>,
    file: Arc<SnapshotFile>,
    interval: Duration,
    mut command_rx: mpsc::Receiver<SnapshotCommand>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!(interval_ms = interval.as_millis() as u64, path = %file.path.display(), "snapshot task started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match file.flush(inner.as_ref()).await {
                    Ok(count) => debug!(count, "snapshot flushed"),
                    Err(e) => error!(error = %e, "snapshot flush failed"),
                }
            }
            command = command_rx.recv() => {
                let result = file.flush(inner.as_ref()).await.map(|count| {
                    info!(count, "final snapshot flushed");
                });
                match command {
                    Some(SnapshotCommand::Shutdown(ack)) => {
                        let _ = ack.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            error!(error = %e, "final snapshot flush failed");
                        }
                    }
                }
                info!("snapshot task stopped");
                return;
            }
        }
    }
}

/// Storage decorator persisting the full state of `inner` to a file
pub struct FileSnapshotStore<S: Storage> {
    /// Inner storage implementation
    inner: Arc<S>,
    file: Arc<SnapshotFile>,
    interval: Duration,
    task: Mutex<Option<SnapshotTask>>,
    span: Span,
}

impl<S: Storage + 'static> FileSnapshotStore<S> {
    /// Open (or create) the snapshot file; fails if the file is unusable
    pub async fn open(inner: S, path: impl AsRef<Path>, interval: Duration) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await
            .map_err(|e| StorageError::io("open", e))?;

        Ok(Self {
            inner: Arc::new(inner),
            file: Arc::new(SnapshotFile {
                file: tokio::sync::Mutex::new(file),
                path,
            }),
            interval,
            task: Mutex::new(None),
            span: info_span!("snapshot_store"),
        })
    }

    /// Replace the span the background task runs in
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Get reference to inner store
    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    /// Replay the snapshot into the inner store, or truncate it when
    /// `restore` is false. Returns the number of replayed metrics.
    pub async fn restore(&self, restore: bool) -> StorageResult<usize> {
        let mut file = self.file.file.lock().await;

        if !restore {
            file.set_len(0)
                .await
                .map_err(|e| StorageError::io("truncate", e))?;
            file.seek(SeekFrom::Start(0))
                .await
                .map_err(|e| StorageError::io("seek", e))?;
            info!(path = %self.file.path.display(), "snapshot restore disabled, file truncated");
            return Ok(0);
        }

        let started = std::time::Instant::now();
        file.seek(SeekFrom::Start(0))
            .await
            .map_err(|e| StorageError::io("seek", e))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .await
            .map_err(|e| StorageError::io("read", e))?;

        let mut restored = 0;
        for (idx, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let metric: Metric = serde_json::from_str(line).map_err(|e| StorageError::Codec {
                line: idx + 1,
                message: e.to_string(),
            })?;
            self.inner.store(&metric).await?;
            restored += 1;
        }

        info!(
            restored,
            duration_ms = started.elapsed().as_millis() as u64,
            "snapshot restored"
        );
        Ok(restored)
    }

    /// Start periodic snapshots; a zero interval flushes on every store instead
    pub fn start(&self) {
        if self.interval.is_zero() {
            debug!("snapshot interval is zero, flushing synchronously on store");
            return;
        }

        let mut task = self.task.lock();
        if task.is_none() {
            *task = Some(SnapshotTask::spawn(
                self.inner.clone(),
                self.file.clone(),
                self.interval,
                self.span.clone(),
            ));
        }
    }

    /// Rewrite the snapshot now
    pub async fn flush(&self) -> StorageResult<usize> {
        self.file.flush(self.inner.as_ref()).await
    }

    /// Stop the background task after one final acknowledged flush
    pub async fn shutdown(&self) -> StorageResult<()> {
        let task = self.task.lock().take();
        match task {
            Some(task) => task.shutdown().await,
            None => self.flush().await.map(|_| ()),
        }
    }

    /// The write is already applied to `inner`, so a failed flush must not
    /// be reported as retryable
    async fn flush_if_synchronous(&self) -> StorageResult<()> {
        if self.interval.is_zero() {
            self.flush().await.map_err(StorageError::into_persist)?;
        }
        Ok(())
    }
}

#[async_trait]
impl<S: Storage + 'static> Storage for FileSnapshotStore<S> {
    async fn store(&self, metric: &Metric) -> StorageResult<()> {
        self.inner.store(metric).await?;
        self.flush_if_synchronous().await
    }

    async fn store_batch(&self, metrics: &[Metric]) -> StorageResult<()> {
        self.inner.store_batch(metrics).await?;
        self.flush_if_synchronous().await
    }

    async fn gauge(&self, name: &str) -> StorageResult<f64> {
        self.inner.gauge(name).await
    }

    async fn counter(&self, name: &str) -> StorageResult<i64> {
        self.inner.counter(name).await
    }

    async fn list(&self) -> StorageResult<Vec<Metric>> {
        self.inner.list().await
    }
}
