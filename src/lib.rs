/*!
 * Metrics Relay Library
 * Telemetry agent pipeline and server-side metric storage
 */

pub mod agent;
pub mod config;
pub mod core;
pub mod metric;
pub mod monitoring;
pub mod storage;

// Re-exports
pub use agent::{
    spawn_sampler, Agent, HostSampler, HttpSink, Merger, Reporter, RuntimeSampler, Sampler, Sink,
};
pub use config::{AgentConfig, StorageConfig};
pub use crate::core::errors::{
    AgentError, ConfigError, DeliveryError, MetricError, SamplerError, StorageError, StorageResult,
};
pub use crate::core::retry::RetryPolicy;
pub use metric::{Metric, MetricKind, MetricRecord, MetricValue};
pub use monitoring::init_tracing;
pub use storage::{
    FileSnapshotStore, MemoryStore, RelationalStore, ResilientStore, Storage, StorageHandle,
};
