//! peqlink session - the active device and the PEQ operations on it.
//!
//! [`SessionManager`] picks a device, matches it against the vendor catalog
//! and opens it through the HID shim. The resulting [`DeviceSession`] carries
//! the model configuration and the protocol handler every PEQ call goes to.

pub mod error;
pub mod handler;
pub mod manager;
pub mod session;

pub use error::{PeqError, PeqResult};
pub use handler::{HandlerRegistry, PeqHandler, PeqSnapshot};
pub use manager::{ConnectOutcome, SessionManager};
pub use session::{DeviceSession, NO_HANDLER_SLOT, is_live};
