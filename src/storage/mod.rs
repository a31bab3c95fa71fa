/*!
 * Storage Module
 * Server-side metric storage: backends, decorators and the startup factory
 */

pub mod memory;
pub mod relational;
pub mod resilient;
pub mod snapshot;
pub mod traits;

// Re-exports
pub use memory::MemoryStore;
pub use relational::RelationalStore;
pub use resilient::ResilientStore;
pub use snapshot::FileSnapshotStore;
pub use traits::Storage;

use std::sync::Arc;
use tracing::info;

use crate::config::StorageConfig;
use crate::core::errors::StorageResult;

enum Backend {
    Snapshot(Arc<FileSnapshotStore<MemoryStore>>),
    Relational(Arc<ResilientStore<RelationalStore>>),
}

/// Storage assembled from configuration, plus what is needed to stop it
pub struct StorageHandle {
    backend: Backend,
}

impl StorageHandle {
    /// Shared storage for request handlers
    pub fn storage(&self) -> Arc<dyn Storage> {
        match &self.backend {
            Backend::Snapshot(store) => store.clone() as Arc<dyn Storage>,
            Backend::Relational(store) => store.clone() as Arc<dyn Storage>,
        }
    }

    /// Final snapshot flush or pool close
    pub async fn shutdown(self) -> StorageResult<()> {
        match self.backend {
            Backend::Snapshot(store) => store.shutdown().await,
            Backend::Relational(store) => {
                store.inner().close().await;
                Ok(())
            }
        }
    }
}

/// Build the configured storage
///
/// A database path selects the relational backend behind the resilient
/// decorator; otherwise an in-memory store is wrapped with file snapshots,
/// restored (or truncated) and started.
pub async fn open(config: &StorageConfig) -> StorageResult<StorageHandle> {
    if let Some(path) = &config.database_path {
        let store = RelationalStore::open(path).await?;
        let store = ResilientStore::new(store);
        store.inner().apply_schema().await?;
        info!(path = %path.display(), "using relational storage");
        return Ok(StorageHandle {
            backend: Backend::Relational(Arc::new(store)),
        });
    }

    let store =
        FileSnapshotStore::open(MemoryStore::new(), &config.file_path, config.store_interval).await?;
    store.restore(config.restore).await?;
    store.start();
    info!(
        path = %config.file_path.display(),
        interval_secs = config.store_interval.as_secs(),
        "using in-memory storage with file snapshots"
    );
    Ok(StorageHandle {
        backend: Backend::Snapshot(Arc::new(store)),
    })
}
