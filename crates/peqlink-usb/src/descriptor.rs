//! Plain descriptions of a USB device, independent of the backend.

use std::fmt;

/// USB interface class for HID devices.
pub const CLASS_HID: u8 = 0x03;
/// USB interface class for vendor-specific interfaces.
pub const CLASS_VENDOR_SPECIFIC: u8 = 0xff;

/// Who a device is, as seen before it is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Product string, if the device reports one
    pub product_name: Option<String>,
    pub bus_number: Option<u8>,
    pub address: Option<u8>,
}

impl DeviceIdentity {
    #[must_use]
    pub fn new(vendor_id: u16, product_id: u16, product_name: Option<String>) -> Self {
        Self { vendor_id, product_id, product_name, bus_number: None, address: None }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)?;
        if let Some(name) = &self.product_name {
            write!(f, " {name}")?;
        }
        if let (Some(bus), Some(address)) = (self.bus_number, self.address) {
            write!(f, " (bus {bus:03} address {address:03})")?;
        }
        Ok(())
    }
}

/// Vendor/product filter used when asking for a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
}

impl DeviceFilter {
    #[must_use]
    pub fn vendor(vendor_id: u16) -> Self {
        Self { vendor_id: Some(vendor_id), product_id: None }
    }

    /// Whether a device with the given ids passes this filter.
    #[must_use]
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id.is_none_or(|v| v == vendor_id)
            && self.product_id.is_none_or(|p| p == product_id)
    }
}

/// Direction of an endpoint or transfer, from the host's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferDirection {
    In,
    Out,
}

/// Endpoint transfer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    /// Full endpoint address including the direction bit
    pub address: u8,
    pub direction: TransferDirection,
    pub transfer: TransferKind,
    pub max_packet_size: u16,
}

impl EndpointInfo {
    /// Endpoint number without the direction bit.
    #[must_use]
    pub fn number(&self) -> u8 {
        self.address & 0x0f
    }

    #[must_use]
    pub fn interrupt_in(number: u8, max_packet_size: u16) -> Self {
        Self {
            address: 0x80 | (number & 0x0f),
            direction: TransferDirection::In,
            transfer: TransferKind::Interrupt,
            max_packet_size,
        }
    }

    #[must_use]
    pub fn interrupt_out(number: u8, max_packet_size: u16) -> Self {
        Self {
            address: number & 0x0f,
            direction: TransferDirection::Out,
            transfer: TransferKind::Interrupt,
            max_packet_size,
        }
    }
}

/// One alternate setting of an interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlternateInfo {
    pub setting: u8,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    pub endpoints: Vec<EndpointInfo>,
}

impl AlternateInfo {
    /// First endpoint that carries data towards the host.
    #[must_use]
    pub fn first_in_endpoint(&self) -> Option<&EndpointInfo> {
        self.endpoints.iter().find(|e| e.direction == TransferDirection::In)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub number: u8,
    pub alternates: Vec<AlternateInfo>,
}

impl InterfaceInfo {
    /// Interface with a single alternate setting.
    #[must_use]
    pub fn single(number: u8, class: u8, subclass: u8, endpoints: Vec<EndpointInfo>) -> Self {
        Self {
            number,
            alternates: vec![AlternateInfo { setting: 0, class, subclass, protocol: 0, endpoints }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationInfo {
    /// `bConfigurationValue`
    pub value: u8,
    pub interfaces: Vec<InterfaceInfo>,
}

/// Type field of a control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Standard,
    Class,
    Vendor,
}

/// Recipient field of a control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
}

/// Setup packet of an outbound control transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSetup {
    pub kind: RequestKind,
    pub recipient: Recipient,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}
