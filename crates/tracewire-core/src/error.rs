//! Error types for Tracewire.

use crate::ids::ExecutionUnitId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Span stack errors
    #[error("No active span on {unit}")]
    NoActiveSpan { unit: ExecutionUnitId },

    #[error("Active span is not an exit span")]
    NotExitSpan,

    // Reporting errors
    #[error("Report queue is full, segment dropped")]
    ReportQueueFull,

    #[error("Report channel closed")]
    ReportChannelClosed,

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    Config(String),

    // Infrastructure errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}
