use std::time::Duration;

use sea_orm::DbErr;

/// Failure taxonomy of the ingestion pipeline.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// Transport-level failure talking to the node (connect, timeout,
    /// non-success status). Retried by the fetcher up to its retry budget.
    #[error("Network error: {0}")]
    Network(String),
    /// The node answered, but with something we cannot interpret.
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// A store operation failed; the surrounding unit of work was rolled back.
    #[error("Storage error: {0}")]
    Storage(#[from] DbErr),
    /// A scheduled update cycle overran its time budget and was abandoned.
    #[error("Cycle timed out after {0:?}")]
    Timeout(Duration),
}

impl MirrorError {
    /// Only transport failures are worth another attempt; a malformed response
    /// will be just as malformed the second time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MirrorError::Network(_))
    }
}

impl From<reqwest::Error> for MirrorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            MirrorError::Protocol(err.to_string())
        } else {
            MirrorError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for MirrorError {
    fn from(err: serde_json::Error) -> Self {
        MirrorError::Protocol(err.to_string())
    }
}

pub type MirrorResult<T> = Result<T, MirrorError>;
