//! Retry and backoff policy shared by every chunk and store call.
//!
//! Errors are mapped to an [`ErrorKind`]; transient kinds (timeouts, throttling,
//! dropped connections, 5xx) are retried with exponential backoff up to the
//! configured attempt count, everything else fails on the first attempt.

mod classify;
mod policy;
mod run;

pub use classify::{classify_curl_error, classify_http_status, classify_io_error};
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::{run_with_retry, Exhausted, Retryable};
