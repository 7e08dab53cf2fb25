use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeetingError {
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("invalid state: {0}")]
    StateConflict(String),
    #[error("media client failed to start: {0}")]
    MediaStart(String),
    #[error("transport failed: {0}")]
    Transport(String),
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Configuration(String),
}
