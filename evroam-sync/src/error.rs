//! Error types for the adapter

use thiserror::Error;

use crate::model::{RecordKey, StreamKind};

/// Invalid adapter construction parameters; the adapter is never started
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("adapter identity must not be empty")]
    MissingIdentity,

    #[error("adapter name must not be empty")]
    MissingName,

    #[error("{stream} interval must be greater than zero")]
    ZeroInterval { stream: StreamKind },

    #[error("request timeout must be greater than zero")]
    ZeroTimeout,
}

/// Errors raised by filter stages
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// A single record could not be processed; it is dropped
    #[error("record {key}: {reason}")]
    Record { key: RecordKey, reason: String },

    /// The stage cannot work at all; dispatch is suppressed for the tick
    #[error("stage '{stage}' misconfigured: {reason}")]
    Misconfigured { stage: String, reason: String },
}

/// Errors reported by a remote exchange
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote error {code}: {description}")]
    Remote { code: String, description: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("connection closed")]
    ConnectionClosed,
}

impl From<serde_json::Error> for ExchangeError {
    fn from(e: serde_json::Error) -> Self {
        ExchangeError::MalformedResponse(e.to_string())
    }
}

/// Structural violations of a change batch
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("full refresh batch mixed with incremental changes")]
    MixedFullRefresh,

    #[error("record {key} belongs to stream {found}, batch is for {expected}")]
    WrongStream {
        key: RecordKey,
        expected: StreamKind,
        found: StreamKind,
    },
}
