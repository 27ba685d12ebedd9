//! The raw USB transport contract the shim is built on.

use async_trait::async_trait;

use crate::descriptor::{ConfigurationInfo, ControlSetup, DeviceIdentity, EndpointInfo};
use crate::error::UsbResult;

/// A platform USB device handle, limited to what the HID shim needs.
///
/// Implementations must tolerate being called from the polling task and the
/// caller's task at the same time.
#[async_trait]
pub trait UsbTransport: Send + Sync {
    /// Identity known without opening the device.
    fn identity(&self) -> &DeviceIdentity;

    /// Open the device for I/O.
    async fn open(&self) -> UsbResult<()>;

    /// Close the device. Closing a closed device is not an error.
    async fn close(&self) -> UsbResult<()>;

    /// Every configuration the device offers, in descriptor order.
    async fn configurations(&self) -> UsbResult<Vec<ConfigurationInfo>>;

    /// The active configuration, or `None` while the device is unconfigured.
    async fn active_configuration(&self) -> UsbResult<Option<ConfigurationInfo>>;

    /// Select a configuration by its `bConfigurationValue`.
    async fn select_configuration(&self, value: u8) -> UsbResult<()>;

    async fn claim_interface(&self, number: u8) -> UsbResult<()>;

    async fn release_interface(&self, number: u8) -> UsbResult<()>;

    /// Host-to-device control transfer. Returns the number of bytes written.
    async fn control_transfer_out(&self, setup: ControlSetup, data: &[u8]) -> UsbResult<usize>;

    /// Read up to `length` bytes from an IN endpoint.
    ///
    /// An empty buffer means nothing arrived within the transport's read window.
    async fn transfer_in(&self, endpoint: &EndpointInfo, length: usize) -> UsbResult<Vec<u8>>;
}
