/*!
 * Structured Tracing
 * Subscriber setup for the binaries; library code only emits events
 */

use tracing::info;
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable enabling JSON output
pub const TRACE_JSON_ENV: &str = "METRICS_TRACE_JSON";

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - METRICS_TRACE_JSON: Enable JSON output (default: false)
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let use_json = std::env::var(TRACE_JSON_ENV)
        .map(|v| json_enabled(&v))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        // JSON output for log shippers
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .compact(),
            )
            .try_init()
    };

    if installed.is_ok() {
        info!(json = use_json, "structured tracing initialized");
    }
}

fn json_enabled(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
