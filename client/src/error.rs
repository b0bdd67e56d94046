use std::time::Duration;

/// Why a classification call failed, by category.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Backend service is not healthy. Please try again later.")]
    HealthCheckFailed,
    #[error("Connection rejected by server: {0}")]
    HandshakeRejected(String),
    #[error("Request timed out after {} seconds. Please try again.", .0.as_secs())]
    Timeout(Duration),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Server returned an error: {0}")]
    Server(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl ClientError {
    /// Timeouts and transport failures may succeed on a fresh session.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Timeout(_) | ClientError::ConnectionFailed(_)
        )
    }
}
