use thiserror::Error;

/// Failures of the injected HTTP transport
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Transfer interrupted: {0}")]
    Transfer(String),

    #[error("HTTP error {status}: {body_snippet}")]
    Status { status: u16, body_snippet: String },

    #[error("Failed to decode JSON body: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to encode JSON body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl HttpError {
    /// Whether retrying the same request may succeed.
    ///
    /// Timeouts, broken connections, 5xx and 429 are transient. Everything
    /// else (4xx, malformed bodies, bad requests) will fail the same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connect(_) | Self::Transfer(_) => true,
            Self::Status { status, .. } => is_transient_status(*status),
            Self::Decode(_) | Self::Encode(_) | Self::InvalidRequest(_) => false,
        }
    }
}

/// 5xx, 408 and 429 are worth another attempt.
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500..=599)
}

pub type Result<T> = std::result::Result<T, HttpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_failures_are_transient() {
        assert!(HttpError::Timeout.is_transient());
        assert!(HttpError::Connect("refused".into()).is_transient());
        assert!(HttpError::Transfer("reset".into()).is_transient());
    }

    #[test]
    fn test_status_classification() {
        assert!(is_transient_status(500));
        assert!(is_transient_status(503));
        assert!(is_transient_status(429));
        assert!(!is_transient_status(400));
        assert!(!is_transient_status(401));
        assert!(!is_transient_status(404));
    }

    #[test]
    fn test_invalid_request_is_fatal() {
        assert!(!HttpError::InvalidRequest("bad url".into()).is_transient());
    }
}
