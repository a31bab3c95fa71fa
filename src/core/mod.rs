/*!
 * Core Module
 * Errors, limits and the shared retry policy
 */

pub mod errors;
pub mod limits;
pub mod retry;

// Re-export for convenience
pub use errors::*;
pub use retry::{RetryFailure, RetryPolicy};
