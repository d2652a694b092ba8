//! Service Discovery Error Hierarchy
//!
//! Errors are split by where they surface:
//! - [`Error`] is returned synchronously from registration and resolution calls.
//! - [`StoreError`] describes failures of the underlying coordination store and is
//!   surfaced unmodified through [`Error::StoreUnavailable`].
//!
//! Failures inside background tasks (keep-alive, watch) never reach the caller;
//! they terminate the task and are reported through `tracing` and metrics.

use std::time::Duration;

use config::ConfigError;

use crate::LeaseId;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

/// Result alias for coordination store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed endpoint fields at registration or deregistration
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Any failed store RPC: grant, put, delete, get, watch-open, keep-alive
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),

    /// One-shot resolution produced zero usable instances
    #[error("No instance remains for {0}")]
    NotFound(String),

    /// The component was closed, or was never started
    #[error("Not operational: {0}")]
    NotOperational(String),

    /// Instance payload could not be serialized
    #[error("Failed to encode instance: {0}")]
    Encode(#[from] serde_json::Error),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// TLS material could not be loaded
    #[error("TLS configuration error: {0}")]
    Tls(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Store endpoint unreachable or refused the request
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Single-shot request exceeded its deadline
    #[error("Store request `{operation}` timed out after {duration:?}")]
    Timeout {
        operation: &'static str,
        duration: Duration,
    },

    /// Lease expired, revoked, or never granted
    #[error("Lease {0} not found")]
    LeaseNotFound(LeaseId),

    /// Requested watch revision is older than the retained history
    #[error("Revision {requested} has been compacted (compact revision {compacted})")]
    Compacted { requested: i64, compacted: i64 },

    /// Stream or store handle has been shut down
    #[error("Store stream closed")]
    Closed,
}

/// Why a stored payload could not be turned into an instance.
///
/// Never returned to callers: decode failures are skipped, logged and counted.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed payload under {key}: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Key {0} is not valid UTF-8")]
    InvalidKey(String),
}
