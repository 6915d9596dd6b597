use thiserror::Error;

/// Failure taxonomy for user-initiated operations.
///
/// Background operations (progress sync, queue flush) swallow and log their
/// errors instead; these variants surface through status fields the UI
/// renders.
#[derive(Error, Debug)]
pub enum OfflineError {
    #[error("Download already in progress")]
    AlreadyInProgress,

    #[error("HTTP error: {0}")]
    Http(u16),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Download timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
