use rc_core::HttpError;
use serde::Serialize;
use thiserror::Error;

use crate::verify::InvalidReason;

/// Why a task ended up in the error list of a batch.
///
/// These are values recorded on the task, never returned as `Err` from
/// [`crate::DownloadOrchestrator::run_batch`]: one task failing does not
/// affect its siblings.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DownloadFailureReason {
    #[error("Network error: {0}")]
    Transport(String),

    #[error("HTTP error {0}")]
    HttpStatus(u16),

    #[error("Transfer ended after {received} of {expected} bytes")]
    PartialTransfer { expected: u64, received: u64 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Verification failed: {0}")]
    VerificationFailed(InvalidReason),

    #[error("Cancelled")]
    Cancelled,
}

impl DownloadFailureReason {
    /// Bad network, as opposed to bad content or a bad request
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::PartialTransfer { .. } => true,
            Self::HttpStatus(status) => rc_core::error::is_transient_status(*status),
            Self::Storage(_) | Self::VerificationFailed(_) | Self::Cancelled => false,
        }
    }
}

impl From<HttpError> for DownloadFailureReason {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Status { status, .. } => Self::HttpStatus(status),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<std::io::Error> for DownloadFailureReason {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
