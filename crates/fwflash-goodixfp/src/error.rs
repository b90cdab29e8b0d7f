//! Error types for the Goodix USB backend

use thiserror::Error;

/// Errors from finding, opening and talking to the sensor over USB
#[derive(Debug, Error)]
pub enum GoodixUsbError {
    /// No matching device on the bus
    #[error("Goodix sensor not found (VID:{vendor_id:04x} PID:{product_id:04x})")]
    DeviceNotFound { vendor_id: u16, product_id: u16 },

    /// Failed to enumerate or open the device
    #[error("Failed to open Goodix sensor: {0}")]
    OpenFailed(String),

    /// Failed to claim the interface or its endpoints
    #[error("Failed to claim interface {interface}: {message}")]
    ClaimFailed { interface: u8, message: String },

    /// A bulk transfer failed
    #[error("USB transfer on endpoint 0x{endpoint:02x} failed: {message}")]
    TransferFailed { endpoint: u8, message: String },

    /// The endpoint is not one the sensor exposes
    #[error("Unknown endpoint 0x{0:02x}")]
    UnknownEndpoint(u8),
}

impl From<GoodixUsbError> for fwflash_core::Error {
    fn from(e: GoodixUsbError) -> Self {
        match e {
            GoodixUsbError::DeviceNotFound { .. } => fwflash_core::Error::NotSupported(e.to_string()),
            GoodixUsbError::UnknownEndpoint(_) => fwflash_core::Error::Internal(e.to_string()),
            _ => fwflash_core::Error::transport(e.to_string()),
        }
    }
}

/// Result type for the USB backend
pub type Result<T> = std::result::Result<T, GoodixUsbError>;
