/*!
 * Pipeline Limits and Constants
 *
 * Centralized location for the fixed numbers shared by the agent pipeline
 * and the storage layer. Grouped by the component that owns them.
 */

use std::time::Duration;

// =============================================================================
// RETRY POLICY
// =============================================================================

/// Retries allowed after the first failed attempt
/// A permanently failing operation is invoked `MAX_RETRIES + 1` times
pub const MAX_RETRIES: u32 = 5;

/// Delay before the first retry
pub const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Linear growth added to the delay after every retry
pub const RETRY_DELAY_STEP: Duration = Duration::from_secs(2);

/// Upper bound for a single retry delay
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

// =============================================================================
// AGENT PIPELINE
// =============================================================================

/// Metrics per Sink call; a flush sends its batch in chunks of this size
pub const DELIVERY_CHUNK_SIZE: usize = 10;

/// Sampler output channel capacity
/// Kept minimal so a slow consumer back-pressures the sampler
pub const SAMPLER_CHANNEL_CAPACITY: usize = 1;

/// Merger output channel capacity
pub const MERGER_CHANNEL_CAPACITY: usize = 1;

/// Shortest ticker period; sampler and reporter intervals are clamped to it
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Default sampling interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default flush interval of the reporter
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Default number of concurrent in-flight flushes
pub const DEFAULT_RATE_LIMIT: usize = 1;

/// Default HTTP request timeout for the sink
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// STORAGE
// =============================================================================

/// Default snapshot interval (zero means flush on every store)
pub const DEFAULT_STORE_INTERVAL: Duration = Duration::from_secs(300);

/// Default snapshot file location
pub const DEFAULT_SNAPSHOT_PATH: &str = "/tmp/metrics-db.json";

/// Relational pool size
pub const RELATIONAL_MAX_CONNECTIONS: u32 = 5;
