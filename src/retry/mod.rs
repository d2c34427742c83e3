//! Retry and backoff policy.
//!
//! Encapsulates failure classification (timeouts, throttling, connection
//! failures vs. permanent request errors) and backoff decisions so the
//! prober and the segment workers share one consistent policy.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use error::TransferError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
