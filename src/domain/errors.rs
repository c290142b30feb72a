//! Domain errors. Used by ports and use cases.
//!
//! Adapters map infrastructure errors into these.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    /// Persistence failure. Propagates out of a job invocation so the next
    /// scheduled tick retries from current store state.
    #[error("Store error: {0}")]
    Store(String),

    /// Transport failure for one recipient. Consumed inside the fan-out.
    #[error("Message send failed: {0}")]
    Sender(String),

    /// Invalid startup configuration. Fatal, never retried.
    #[error("Configuration error: {0}")]
    Config(String),
}
