use thiserror::Error;

/// Scout 统一错误类型
#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("Source error: {0}")]
    Source(String),

    #[error("Capture timed out after {0} ms")]
    CaptureTimeout(u64),

    #[error("Stage error: {0}")]
    Stage(String),

    #[error("Writer error: {0}")]
    Writer(String),

    #[error("PubSub error: {0}")]
    PubSub(String),

    #[error("Channel send error: {0}")]
    ChannelSend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Notify error: {0}")]
    Notify(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, ScoutError>;

impl From<anyhow::Error> for ScoutError {
    fn from(err: anyhow::Error) -> Self {
        ScoutError::Internal(err.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for ScoutError {
    fn from(err: tokio::sync::mpsc::error::SendError<T>) -> Self {
        ScoutError::ChannelSend(err.to_string())
    }
}
