//! Error types for the REST client.
//!
//! # Design
//! Input problems (`InvalidArgument`, `LengthMismatch`, `CapacityExceeded`)
//! are detected before any transport resource exists, so the caller can fix
//! the input and call again with nothing to clean up. The remaining variants
//! come from the transport side and always mean the whole batch was thrown
//! away after every handle was released.

use thiserror::Error;

/// Errors returned by `RestClient`, `RestMultiClient` and the batch engine.
#[derive(Debug, Error)]
pub enum RestError {
    /// A setter or request argument was malformed (empty host, empty
    /// payload, empty action list, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The number of payloads does not match the number of actions.
    #[error("the number of actions requested ({actions}) does not match the number of payloads provided ({payloads})")]
    LengthMismatch { actions: usize, payloads: usize },

    /// The batch is larger than the configured `max_handles`.
    #[error("batch of {requested} requests exceeds max_handles setting of {max}")]
    CapacityExceeded { requested: usize, max: usize },

    /// The controller or one of the handles could not be allocated.
    #[error("transport failed to initialize: {0}")]
    TransportInit(#[source] TransportError),

    /// The drive loop or an individual transfer failed; no results are kept.
    #[error("batch execution failed: {0}")]
    BatchExecution(String),

    /// A completed transfer reported metadata that failed validation.
    #[error("unable to build response: {0}")]
    MalformedResponse(#[source] MetadataError),
}

/// Failure reported by a `Transport` implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Raw transport metadata is missing a required key or holds the wrong type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("empty metadata map, transfer info expected")]
    Empty,

    #[error("metadata expects {expected} value at {key} key")]
    InvalidField {
        key: &'static str,
        expected: &'static str,
    },
}
