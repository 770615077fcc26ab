use thiserror::Error;
use twinlock_core::QueueError;

#[derive(Error, Debug)]
pub enum StressError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0} thread panicked")]
    WorkerPanicked(&'static str),

    #[error("Failed to deliver terminal marker to consumer {consumer}: {cause}")]
    MarkerUndelivered { consumer: usize, cause: QueueError },
}

pub type Result<T> = std::result::Result<T, StressError>;
