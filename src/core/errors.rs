/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 */

use crate::metric::MetricKind;
use miette::Diagnostic;
use thiserror::Error;

/// Storage operation result
#[must_use = "storage operations can fail and must be handled"]
pub type StorageResult<T> = Result<T, StorageError>;

/// Malformed metric rejected before it reaches any backend
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum MetricError {
    #[error("metric name must not be empty")]
    #[diagnostic(code(metric::empty_name))]
    EmptyName,

    #[error("gauge {name} has a non-finite value")]
    #[diagnostic(
        code(metric::non_finite),
        help("NaN and infinities cannot be stored or serialized.")
    )]
    NonFinite { name: String },

    #[error("{kind} {name} is missing its {field} field")]
    #[diagnostic(
        code(metric::missing_value),
        help("Gauges carry `value`, counters carry `delta`.")
    )]
    MissingValue {
        kind: MetricKind,
        name: String,
        field: &'static str,
    },

    #[error("unknown metric type: {0}")]
    #[diagnostic(code(metric::unknown_kind), help("Use `gauge` or `counter`."))]
    UnknownKind(String),
}

/// Storage errors shared by every backend and decorator
#[derive(Error, Debug, Clone, PartialEq, Diagnostic)]
pub enum StorageError {
    #[error("{kind} {name} not found")]
    #[diagnostic(code(storage::not_found))]
    NotFound { kind: MetricKind, name: String },

    #[error("invalid metric: {0}")]
    #[diagnostic(transparent)]
    Invalid(#[from] MetricError),

    #[error("counter {name} overflowed")]
    #[diagnostic(
        code(storage::overflow),
        help("Counter deltas accumulated past the 64-bit signed range.")
    )]
    Overflow { name: String },

    #[error("backend error during {op}: {message}")]
    #[diagnostic(
        code(storage::backend),
        help("The database rejected or failed the operation. It is retried by the resilient store.")
    )]
    Backend { op: &'static str, message: String },

    #[error("I/O error during {op}: {message}")]
    #[diagnostic(
        code(storage::io),
        help("Check file permissions and disk space for the snapshot file.")
    )]
    Io { op: &'static str, message: String },

    #[error("write applied but not persisted during {op}: {message}")]
    #[diagnostic(
        code(storage::persist),
        help("The metric is in memory; the next successful flush persists it. Repeating the write would apply it twice.")
    )]
    Persist { op: &'static str, message: String },

    #[error("snapshot record at line {line} is malformed: {message}")]
    #[diagnostic(code(storage::codec))]
    Codec { line: usize, message: String },
}

impl StorageError {
    pub fn not_found(kind: MetricKind, name: impl Into<String>) -> Self {
        StorageError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn backend(op: &'static str, err: impl std::fmt::Display) -> Self {
        StorageError::Backend {
            op,
            message: err.to_string(),
        }
    }

    pub fn io(op: &'static str, err: impl std::fmt::Display) -> Self {
        StorageError::Io {
            op,
            message: err.to_string(),
        }
    }

    /// Reclassify a failure that happened after the write was applied
    pub fn into_persist(self) -> Self {
        match self {
            StorageError::Io { op, message } | StorageError::Backend { op, message } => {
                StorageError::Persist { op, message }
            }
            StorageError::Persist { .. } => self,
            other => StorageError::Persist {
                op: "flush",
                message: other.to_string(),
            },
        }
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    /// Transient faults worth another attempt; absence and bad input never are
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Backend { .. } | StorageError::Io { .. })
    }
}

/// Failure classification returned by a [`Sink`](crate::agent::Sink)
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum DeliveryError {
    #[error("forbidden")]
    #[diagnostic(
        code(delivery::forbidden),
        help("The collector refused the agent. Authorization failures stop the pipeline.")
    )]
    Forbidden,

    #[error("transport error: {0}")]
    #[diagnostic(code(delivery::transport))]
    Transport(String),

    #[error("collector rejected batch with status {status}: {body}")]
    #[diagnostic(code(delivery::rejected))]
    Rejected { status: u16, body: String },

    #[error("failed to encode batch: {0}")]
    #[diagnostic(code(delivery::encode))]
    Encode(String),

    #[error("refusing to deliver an empty batch")]
    #[diagnostic(code(delivery::empty_batch))]
    EmptyBatch,
}

impl DeliveryError {
    #[inline]
    pub fn is_forbidden(&self) -> bool {
        matches!(self, DeliveryError::Forbidden)
    }
}

/// A sampler could not compute one of its measurements
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
#[error("sampler {sampler} failed to measure {measurement}: {reason}")]
#[diagnostic(code(sampler::measurement_failed))]
pub struct SamplerError {
    pub sampler: &'static str,
    pub measurement: &'static str,
    pub reason: String,
}

/// Fatal pipeline errors surfaced by the agent coordinator
#[derive(Error, Debug, Diagnostic)]
pub enum AgentError {
    #[error("sampler task failed: {0}")]
    #[diagnostic(transparent)]
    Sampler(#[from] SamplerError),

    #[error("update metrics error after {attempts} attempt(s): {source}")]
    #[diagnostic(
        code(agent::delivery_failed),
        help("Delivery retries are exhausted or the collector answered forbidden.")
    )]
    Delivery {
        attempts: u32,
        #[source]
        source: DeliveryError,
    },

    #[error("startup failed: {0}")]
    #[diagnostic(code(agent::startup))]
    Startup(String),

    #[error("pipeline task panicked or was aborted: {0}")]
    #[diagnostic(code(agent::join))]
    Join(String),
}

impl From<tokio::task::JoinError> for AgentError {
    fn from(err: tokio::task::JoinError) -> Self {
        AgentError::Join(err.to_string())
    }
}

/// Configuration loading errors
#[derive(Error, Debug, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {message}")]
    #[diagnostic(code(config::read))]
    Read { path: String, message: String },

    #[error("failed to parse config file {path}: {message}")]
    #[diagnostic(code(config::parse), help("The config file must be a JSON object."))]
    Parse { path: String, message: String },

    #[error("environment variable {var}={value:?} is invalid: {reason}")]
    #[diagnostic(code(config::env))]
    Env {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid setting {field}: {reason}")]
    #[diagnostic(code(config::invalid))]
    Invalid { field: &'static str, reason: String },
}
