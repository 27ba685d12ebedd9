//! peqlink USB - HID device emulation over a raw USB transport.
//!
//! Platforms without a usable HID stack still let us talk to the device
//! through libusb. [`HidShim`] claims the first HID or vendor-specific
//! interface, frames output reports as `SET_REPORT` control transfers and
//! polls the interface's IN endpoint to surface input reports.

pub mod descriptor;
pub mod error;
pub mod events;
pub mod libusb;
pub mod selector;
pub mod shim;
pub mod transport;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use descriptor::{
    AlternateInfo, ConfigurationInfo, ControlSetup, DeviceFilter, DeviceIdentity, EndpointInfo,
    InterfaceInfo, Recipient, RequestKind, TransferDirection, TransferKind,
};
pub use error::{SelectionError, UsbError, UsbResult};
pub use events::{EventKind, InputReport, ListenerId};
pub use libusb::{RusbSelector, RusbTransport, TransportOptions, list_devices};
pub use selector::DeviceSelector;
pub use shim::{HidShim, ShimState};
pub use transport::UsbTransport;
