//! Error types shared across the tracker components

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Positioning failure codes surfaced by the sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositioningErrorCode {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
    NotSupported,
}

impl fmt::Display for PositioningErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            PositioningErrorCode::PermissionDenied => "PERMISSION_DENIED",
            PositioningErrorCode::PositionUnavailable => "POSITION_UNAVAILABLE",
            PositioningErrorCode::Timeout => "TIMEOUT",
            PositioningErrorCode::NotSupported => "NOT_SUPPORTED",
        };
        f.write_str(code)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{code}: {message}")]
pub struct PositioningError {
    pub code: PositioningErrorCode,
    pub message: String,
}

impl PositioningError {
    pub fn new(code: PositioningErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// A batch could not be delivered to the collector.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        DeliveryError::Transport(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("persistent storage is not supported in this environment")]
    Unavailable,

    #[error("storage error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt queue record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// Failures the sync engine cannot recover from locally.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}
