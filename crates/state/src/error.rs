use thiserror::Error;

/// State persistence errors
#[derive(Error, Debug)]
pub enum StateError {
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
