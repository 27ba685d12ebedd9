//! libusb-backed transport and device selection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusb::{ConfigDescriptor, Device, DeviceHandle, GlobalContext, UsbContext};
use tracing::{debug, info, warn};

use crate::descriptor::{
    AlternateInfo, ConfigurationInfo, ControlSetup, DeviceFilter, DeviceIdentity, EndpointInfo,
    InterfaceInfo, Recipient, RequestKind, TransferDirection, TransferKind,
};
use crate::error::{SelectionError, UsbError, UsbResult};
use crate::selector::DeviceSelector;
use crate::transport::UsbTransport;

/// Timeouts and driver handling for libusb transports.
#[derive(Debug, Clone, Copy)]
pub struct TransportOptions {
    /// Upper bound for a single IN transfer; an idle endpoint yields an empty read
    pub read_timeout: Duration,
    /// Upper bound for a control transfer
    pub control_timeout: Duration,
    /// Let libusb detach a bound kernel driver (usbhid) when claiming
    pub auto_detach_kernel_driver: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(100),
            control_timeout: Duration::from_secs(1),
            auto_detach_kernel_driver: true,
        }
    }
}

/// A USB device reached through libusb.
pub struct RusbTransport {
    device: Device<GlobalContext>,
    identity: DeviceIdentity,
    options: TransportOptions,
    handle: Mutex<Option<Arc<DeviceHandle<GlobalContext>>>>,
}

impl RusbTransport {
    /// Wrap a libusb device. The device is not opened.
    ///
    /// # Errors
    /// Returns an error if the device descriptor cannot be read.
    pub fn new(device: Device<GlobalContext>, options: TransportOptions) -> UsbResult<Self> {
        let descriptor = device.device_descriptor()?;
        let mut identity = DeviceIdentity::new(
            descriptor.vendor_id(),
            descriptor.product_id(),
            read_product_name(&device, &descriptor),
        );
        identity.bus_number = Some(device.bus_number());
        identity.address = Some(device.address());

        Ok(Self { device, identity, options, handle: Mutex::new(None) })
    }

    fn handle(&self) -> UsbResult<Arc<DeviceHandle<GlobalContext>>> {
        self.handle.lock().clone().ok_or(UsbError::NotOpen)
    }

    /// Run a blocking libusb call on the blocking pool.
    async fn with_handle<T, F>(&self, op: F) -> UsbResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&DeviceHandle<GlobalContext>) -> rusb::Result<T> + Send + 'static,
    {
        let handle = self.handle()?;
        let result = tokio::task::spawn_blocking(move || op(&handle))
            .await
            .map_err(|e| UsbError::Transfer(e.to_string()))?;
        Ok(result?)
    }
}

#[async_trait]
impl UsbTransport for RusbTransport {
    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    async fn open(&self) -> UsbResult<()> {
        if self.handle.lock().is_some() {
            return Ok(());
        }

        let device = self.device.clone();
        let detach = self.options.auto_detach_kernel_driver;
        let handle = tokio::task::spawn_blocking(move || -> rusb::Result<_> {
            let handle = device.open()?;
            if detach {
                // Not supported on every platform; claiming still works without it
                if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
                    debug!(error = %e, "Kernel driver auto-detach unavailable");
                }
            }
            Ok(handle)
        })
        .await
        .map_err(|e| UsbError::Transfer(e.to_string()))??;

        info!(device = %self.identity, "USB device opened");
        *self.handle.lock() = Some(Arc::new(handle));
        Ok(())
    }

    async fn close(&self) -> UsbResult<()> {
        if self.handle.lock().take().is_some() {
            info!(device = %self.identity, "USB device closed");
        }
        Ok(())
    }

    async fn configurations(&self) -> UsbResult<Vec<ConfigurationInfo>> {
        let device = self.device.clone();
        tokio::task::spawn_blocking(move || -> UsbResult<_> {
            let count = device.device_descriptor()?.num_configurations();
            let mut configurations = Vec::with_capacity(usize::from(count));
            for index in 0..count {
                configurations.push(describe_configuration(&device.config_descriptor(index)?));
            }
            Ok(configurations)
        })
        .await
        .map_err(|e| UsbError::Transfer(e.to_string()))?
    }

    async fn active_configuration(&self) -> UsbResult<Option<ConfigurationInfo>> {
        self.with_handle(|handle| {
            // bConfigurationValue 0 means the device is unconfigured
            if handle.active_configuration()? == 0 {
                return Ok(None);
            }
            let config = handle.device().active_config_descriptor()?;
            Ok(Some(describe_configuration(&config)))
        })
        .await
    }

    async fn select_configuration(&self, value: u8) -> UsbResult<()> {
        debug!(value, "Selecting configuration");
        self.with_handle(move |handle| handle.set_active_configuration(value)).await
    }

    async fn claim_interface(&self, number: u8) -> UsbResult<()> {
        self.with_handle(move |handle| handle.claim_interface(number)).await
    }

    async fn release_interface(&self, number: u8) -> UsbResult<()> {
        self.with_handle(move |handle| handle.release_interface(number)).await
    }

    async fn control_transfer_out(&self, setup: ControlSetup, data: &[u8]) -> UsbResult<usize> {
        let payload = data.to_vec();
        let timeout = self.options.control_timeout;
        let request_type = rusb::request_type(
            rusb::Direction::Out,
            request_kind(setup.kind),
            recipient(setup.recipient),
        );
        self.with_handle(move |handle| {
            handle.write_control(
                request_type,
                setup.request,
                setup.value,
                setup.index,
                &payload,
                timeout,
            )
        })
        .await
    }

    async fn transfer_in(&self, endpoint: &EndpointInfo, length: usize) -> UsbResult<Vec<u8>> {
        let address = endpoint.address;
        let transfer = endpoint.transfer;
        let timeout = self.options.read_timeout;
        let result = self
            .with_handle(move |handle| {
                let mut buf = vec![0; length];
                let read = match transfer {
                    TransferKind::Bulk => handle.read_bulk(address, &mut buf, timeout)?,
                    _ => handle.read_interrupt(address, &mut buf, timeout)?,
                };
                buf.truncate(read);
                Ok(buf)
            })
            .await;

        match result {
            Err(UsbError::Timeout) => Ok(Vec::new()),
            other => other,
        }
    }
}

/// Picks the first attached device matching the requested filters.
#[derive(Debug, Clone, Default)]
pub struct RusbSelector {
    options: TransportOptions,
    product_id: Option<u16>,
}

impl RusbSelector {
    #[must_use]
    pub fn new(options: TransportOptions) -> Self {
        Self { options, product_id: None }
    }

    /// Only accept devices with this product id.
    #[must_use]
    pub fn with_product_id(mut self, product_id: Option<u16>) -> Self {
        self.product_id = product_id;
        self
    }
}

#[async_trait]
impl DeviceSelector for RusbSelector {
    async fn request_device(
        &self,
        filters: &[DeviceFilter],
    ) -> Result<Arc<dyn UsbTransport>, SelectionError> {
        let filters = filters.to_vec();
        let options = self.options;
        let product_id = self.product_id;

        let mut candidates = tokio::task::spawn_blocking(move || list_devices(&filters, options))
            .await
            .map_err(|e| SelectionError::Failed(e.to_string()))??;

        candidates.retain(|t| product_id.is_none_or(|pid| t.identity().product_id == pid));
        if candidates.is_empty() {
            debug!("No matching USB device attached");
            return Err(SelectionError::NotFound);
        }

        let transport = candidates.swap_remove(0);
        info!(device = %transport.identity(), "USB device selected");
        Ok(Arc::new(transport))
    }
}

/// Enumerate attached devices passing any of `filters`.
///
/// An empty filter list matches nothing.
///
/// # Errors
/// Returns an error if the USB bus cannot be enumerated.
pub fn list_devices(
    filters: &[DeviceFilter],
    options: TransportOptions,
) -> UsbResult<Vec<RusbTransport>> {
    let devices = rusb::devices()?;
    let mut found = Vec::new();

    for device in devices.iter() {
        let Ok(desc) = device.device_descriptor() else {
            continue;
        };
        if !filters.iter().any(|f| f.matches(desc.vendor_id(), desc.product_id())) {
            continue;
        }

        match RusbTransport::new(device, options) {
            Ok(transport) => {
                debug!(device = %transport.identity(), "Matching USB device found");
                found.push(transport);
            }
            Err(e) => warn!(error = %e, "Skipping unreadable USB device"),
        }
    }

    Ok(found)
}

/// Read the product string. Needs a short-lived handle, so it fails quietly
/// on devices we lack permission for.
fn read_product_name<T: UsbContext>(
    device: &Device<T>,
    descriptor: &rusb::DeviceDescriptor,
) -> Option<String> {
    descriptor.product_string_index()?;
    let handle = device.open().ok()?;
    handle.read_product_string_ascii(descriptor).ok()
}

fn describe_configuration(config: &ConfigDescriptor) -> ConfigurationInfo {
    let interfaces = config
        .interfaces()
        .map(|interface| InterfaceInfo {
            number: interface.number(),
            alternates: interface
                .descriptors()
                .map(|alt| AlternateInfo {
                    setting: alt.setting_number(),
                    class: alt.class_code(),
                    subclass: alt.sub_class_code(),
                    protocol: alt.protocol_code(),
                    endpoints: alt
                        .endpoint_descriptors()
                        .map(|ep| EndpointInfo {
                            address: ep.address(),
                            direction: match ep.direction() {
                                rusb::Direction::In => TransferDirection::In,
                                rusb::Direction::Out => TransferDirection::Out,
                            },
                            transfer: match ep.transfer_type() {
                                rusb::TransferType::Control => TransferKind::Control,
                                rusb::TransferType::Isochronous => TransferKind::Isochronous,
                                rusb::TransferType::Bulk => TransferKind::Bulk,
                                rusb::TransferType::Interrupt => TransferKind::Interrupt,
                            },
                            max_packet_size: ep.max_packet_size(),
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();

    ConfigurationInfo { value: config.number(), interfaces }
}

fn request_kind(kind: RequestKind) -> rusb::RequestType {
    match kind {
        RequestKind::Standard => rusb::RequestType::Standard,
        RequestKind::Class => rusb::RequestType::Class,
        RequestKind::Vendor => rusb::RequestType::Vendor,
    }
}

fn recipient(recipient: Recipient) -> rusb::Recipient {
    match recipient {
        Recipient::Device => rusb::Recipient::Device,
        Recipient::Interface => rusb::Recipient::Interface,
        Recipient::Endpoint => rusb::Recipient::Endpoint,
        Recipient::Other => rusb::Recipient::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = TransportOptions::default();
        assert_eq!(options.read_timeout, Duration::from_millis(100));
        assert_eq!(options.control_timeout, Duration::from_secs(1));
        assert!(options.auto_detach_kernel_driver);
    }

    #[test]
    fn test_request_type_mapping() {
        let request_type = rusb::request_type(
            rusb::Direction::Out,
            request_kind(RequestKind::Class),
            recipient(Recipient::Interface),
        );
        // Host-to-device, class, interface
        assert_eq!(request_type, 0x21);
    }

    #[test]
    fn test_empty_filter_list_matches_nothing() {
        // Enumeration itself may be unavailable in sandboxed test environments
        if let Ok(devices) = list_devices(&[], TransportOptions::default()) {
            assert!(devices.is_empty());
        }
    }
}
