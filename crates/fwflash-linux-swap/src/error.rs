//! Error types for the swap attribute

use std::path::PathBuf;

use thiserror::Error;

/// Errors reading or parsing `/proc/swaps`
#[derive(Debug, Error)]
pub enum SwapError {
    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Missing or unexpected swaps header")]
    MissingHeader,

    #[error("Line {line}: expected 5 columns, got \"{content}\"")]
    Malformed { line: usize, content: String },

    #[error("Line {line}: invalid {field} \"{value}\"")]
    InvalidNumber {
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("Failed to start file monitor: {0}")]
    MonitorFailed(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SwapError>;

impl From<SwapError> for fwflash_core::Error {
    fn from(e: SwapError) -> Self {
        let message = e.to_string();
        match e {
            SwapError::ReadFailed { source, .. } | SwapError::MonitorFailed(source) => {
                fwflash_core::Error::transport_io(message, source)
            }
            SwapError::MissingHeader
            | SwapError::Malformed { .. }
            | SwapError::InvalidNumber { .. } => fwflash_core::Error::Protocol(message),
        }
    }
}
