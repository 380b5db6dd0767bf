//! Error types shared by the capture components.

use serde::Serialize;
use thiserror::Error;

use crate::device::MediaKind;

/// Errors surfaced by device acquisition, recording, storage and upload.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Permission denied for {kind} input")]
    PermissionDenied { kind: MediaKind },

    #[error("Constraints cannot be satisfied: {constraint}")]
    Overconstrained { constraint: String },

    #[error("Network failure: {0}")]
    Network(String),

    #[error("Aborted by user")]
    AbortedByUser,

    #[error("Recorder error: {0}")]
    Recorder(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CaptureError {
    /// Stable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            CaptureError::PermissionDenied { .. } => "PERMISSION_DENIED",
            CaptureError::Overconstrained { .. } => "OVERCONSTRAINED",
            CaptureError::Network(_) => "NETWORK_FAILURE",
            CaptureError::AbortedByUser => "ABORTED_BY_USER",
            CaptureError::Recorder(_) => "RECORDER_ERROR",
            CaptureError::Storage(_) => "STORAGE_ERROR",
            CaptureError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

/// Error body returned to the consuming application
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub error: String,
}

impl From<&CaptureError> for ErrorResponse {
    fn from(error: &CaptureError) -> Self {
        Self {
            code: error.code().to_string(),
            error: error.to_string(),
        }
    }
}

pub type CaptureResult<T> = Result<T, CaptureError>;
