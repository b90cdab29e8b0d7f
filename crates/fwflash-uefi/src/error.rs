//! Error types for UEFI sysfs access

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EsrtError {
    #[error("Failed to list {path}: {source}")]
    ListFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid firmware class \"{value}\" in {path}")]
    InvalidClass { path: PathBuf, value: String },
}

pub type Result<T> = std::result::Result<T, EsrtError>;

impl From<EsrtError> for fwflash_core::Error {
    fn from(e: EsrtError) -> Self {
        let message = e.to_string();
        match e {
            EsrtError::ListFailed { source, .. } | EsrtError::ReadFailed { source, .. } => {
                fwflash_core::Error::transport_io(message, source)
            }
            EsrtError::InvalidClass { .. } => fwflash_core::Error::Protocol(message),
        }
    }
}
