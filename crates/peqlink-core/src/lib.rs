//! peqlink core - filter model, vendor catalog and sanitizing.
//!
//! This crate holds the data shared by the USB shim, the session manager and
//! the command line tool. Nothing in here performs I/O beyond reading a
//! catalog file.

pub mod error;
pub mod filter;
pub mod model;
pub mod sanitize;
pub mod vendor;

pub use error::{CoreResult, Error};
pub use filter::{Filter, FilterType};
pub use model::{FilterBounds, ModelConfig, ModelOverrides, Slot, SlotId};
pub use sanitize::sanitize_filters;
pub use vendor::{DeviceEntry, ResolvedModel, UNKNOWN_MODEL, VendorCatalog, VendorConfig};
