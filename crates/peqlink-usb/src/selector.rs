//! Platform device selection.

use std::sync::Arc;

use async_trait::async_trait;

use crate::descriptor::DeviceFilter;
use crate::error::SelectionError;
use crate::transport::UsbTransport;

/// Asks the platform (or the user) for one device matching `filters`.
///
/// Cancellation and "nothing matched" are reported as
/// [`SelectionError::Cancelled`] / [`SelectionError::NotFound`] so callers can
/// tell them apart from real failures.
#[async_trait]
pub trait DeviceSelector: Send + Sync {
    async fn request_device(
        &self,
        filters: &[DeviceFilter],
    ) -> Result<Arc<dyn UsbTransport>, SelectionError>;
}
