use door_core::DoorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decoder process error: {0}")]
    Process(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Core(#[from] DoorError),
}
