//! USB error types.

use thiserror::Error;

/// Errors raised by the USB transport and the HID shim.
#[derive(Debug, Clone, Error)]
pub enum UsbError {
    /// No HID (class 3) or vendor-specific (class 255) interface could be claimed.
    /// `trace` lists every inspected interface as `[I<n>C<class>S<subclass>]`.
    #[error("No claimable HID or vendor-specific interface (inspected: {trace})")]
    NoClaimableInterface { trace: String },

    #[error("Device is not open")]
    NotOpen,

    #[error("Transfer timed out")]
    Timeout,

    #[error("Device disconnected")]
    Disconnected,

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("USB error: {0}")]
    Usb(rusb::Error),
}

impl From<rusb::Error> for UsbError {
    fn from(error: rusb::Error) -> Self {
        match error {
            rusb::Error::Timeout => Self::Timeout,
            rusb::Error::NoDevice => Self::Disconnected,
            other => Self::Usb(other),
        }
    }
}

/// Result type for USB operations.
pub type UsbResult<T> = Result<T, UsbError>;

/// Why a device selection produced no device.
#[derive(Debug, Clone, Error)]
pub enum SelectionError {
    #[error("Device selection cancelled")]
    Cancelled,

    #[error("No matching device found")]
    NotFound,

    #[error("Access to the device was not allowed")]
    NotAllowed,

    #[error("Device selection failed: {0}")]
    Failed(String),
}

impl SelectionError {
    /// Whether this outcome means "the user picked nothing" rather than a failure.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::NotFound | Self::NotAllowed)
    }
}

impl From<UsbError> for SelectionError {
    fn from(error: UsbError) -> Self {
        match error {
            UsbError::Usb(rusb::Error::Access) => Self::NotAllowed,
            other => Self::Failed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rusb_errors_are_classified() {
        assert!(matches!(UsbError::from(rusb::Error::Timeout), UsbError::Timeout));
        assert!(matches!(UsbError::from(rusb::Error::NoDevice), UsbError::Disconnected));
        assert!(matches!(UsbError::from(rusb::Error::Pipe), UsbError::Usb(rusb::Error::Pipe)));
    }

    #[test]
    fn test_cancellation_kinds() {
        assert!(SelectionError::Cancelled.is_cancellation());
        assert!(SelectionError::NotFound.is_cancellation());
        assert!(SelectionError::NotAllowed.is_cancellation());
        assert!(!SelectionError::Failed("boom".into()).is_cancellation());
    }

    #[test]
    fn test_access_denied_is_not_allowed() {
        let error = SelectionError::from(UsbError::Usb(rusb::Error::Access));
        assert!(matches!(error, SelectionError::NotAllowed));
    }
}
