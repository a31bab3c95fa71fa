/*!
 * Monitoring
 * Logging setup shared by the binaries
 */

mod tracer;

pub use tracer::{init_tracing, TRACE_JSON_ENV};
