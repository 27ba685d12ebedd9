//! Session error types.

use peqlink_usb::{SelectionError, UsbError};
use thiserror::Error;

/// Errors from PEQ operations on a device session.
#[derive(Debug, Error)]
pub enum PeqError {
    /// The session's device is no longer open; no I/O was attempted.
    #[error("Device disconnected")]
    DeviceDisconnected,

    #[error("Handler error: {0}")]
    Handler(String),

    #[error(transparent)]
    Usb(#[from] UsbError),

    #[error(transparent)]
    Selection(#[from] SelectionError),
}

/// Result type for PEQ operations.
pub type PeqResult<T> = Result<T, PeqError>;
