//! The active device and the PEQ operations performed on it.

use std::fmt;
use std::sync::Arc;

use peqlink_core::{Filter, ModelConfig, ResolvedModel, Slot, SlotId, sanitize_filters};
use peqlink_usb::HidShim;
use tracing::{debug, warn};

use crate::error::{PeqError, PeqResult};
use crate::handler::{PeqHandler, PeqSnapshot};

/// Returned by [`DeviceSession::current_slot`] when no handler is bound.
/// Never a valid slot id.
pub const NO_HANDLER_SLOT: SlotId = -2;

/// A connected PEQ device.
pub struct DeviceSession {
    shim: Arc<HidShim>,
    manufacturer: String,
    model: String,
    handler_tag: Option<String>,
    handler: Option<Arc<dyn PeqHandler>>,
    model_config: ModelConfig,
}

impl DeviceSession {
    /// Combine an opened shim with its resolved configuration.
    #[must_use]
    pub fn new(
        shim: Arc<HidShim>,
        resolved: ResolvedModel,
        handler: Option<Arc<dyn PeqHandler>>,
    ) -> Self {
        Self {
            shim,
            manufacturer: resolved.manufacturer,
            model: resolved.model,
            handler_tag: resolved.handler,
            handler,
            model_config: resolved.model_config,
        }
    }

    /// The HID shim handlers use to talk to the device.
    #[must_use]
    pub fn shim(&self) -> &Arc<HidShim> {
        &self.shim
    }

    #[must_use]
    pub fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn model_config(&self) -> &ModelConfig {
        &self.model_config
    }

    /// Tag of the handler the catalog asked for, bound or not.
    #[must_use]
    pub fn handler_tag(&self) -> Option<&str> {
        self.handler_tag.as_deref()
    }

    #[must_use]
    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Whether the device is still open for I/O.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.shim.opened()
    }

    fn ensure_live(&self) -> PeqResult<()> {
        if self.is_live() {
            Ok(())
        } else {
            warn!(model = %self.model, "Device disconnected");
            Err(PeqError::DeviceDisconnected)
        }
    }

    /// Write `filters` and the preamp to `slot`.
    ///
    /// Filters are fitted to the model first: truncated or padded to exactly
    /// `max_filters` and with out-of-range frequency or Q replaced. Without a
    /// handler this succeeds without touching the device.
    ///
    /// # Errors
    /// Returns [`PeqError::DeviceDisconnected`] if the device is no longer
    /// open, otherwise whatever the handler returns.
    pub async fn push(&self, slot: SlotId, preamp_db: f64, filters: &[Filter]) -> PeqResult<()> {
        self.ensure_live()?;

        let sanitized = sanitize_filters(filters, &self.model_config);
        let Some(handler) = &self.handler else {
            debug!(model = %self.model, "No handler bound, push ignored");
            return Ok(());
        };

        debug!(slot, preamp_db, filters = sanitized.len(), "Pushing filters");
        handler.push(self, slot, preamp_db, &sanitized).await
    }

    /// Read the filter set stored in `slot`. Without a handler the result is
    /// empty.
    ///
    /// # Errors
    /// Returns [`PeqError::DeviceDisconnected`] if the device is no longer
    /// open, otherwise whatever the handler returns.
    pub async fn pull(&self, slot: SlotId) -> PeqResult<PeqSnapshot> {
        self.ensure_live()?;

        match &self.handler {
            Some(handler) => handler.pull(self, slot).await,
            None => Ok(PeqSnapshot::default()),
        }
    }

    /// Slot the device is using, or [`NO_HANDLER_SLOT`] without a handler.
    ///
    /// # Errors
    /// Returns the handler's error.
    pub async fn current_slot(&self) -> PeqResult<SlotId> {
        match &self.handler {
            Some(handler) => handler.current_slot(self).await,
            None => Ok(NO_HANDLER_SLOT),
        }
    }

    /// Slots the model exposes.
    #[must_use]
    pub fn available_slots(&self) -> &[Slot] {
        &self.model_config.available_slots
    }

    /// Turn PEQ on or off. Does nothing without a handler.
    ///
    /// # Errors
    /// Returns the handler's error.
    pub async fn enable_peq(&self, enabled: bool, slot: SlotId) -> PeqResult<()> {
        match &self.handler {
            Some(handler) => handler.enable_peq(self, enabled, slot).await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("device", self.shim.identity())
            .field("manufacturer", &self.manufacturer)
            .field("model", &self.model)
            .field("handler", &self.handler_tag)
            .field("live", &self.is_live())
            .finish_non_exhaustive()
    }
}

/// True only for an existing session whose device is still open.
#[must_use]
pub fn is_live(session: Option<&DeviceSession>) -> bool {
    session.is_some_and(DeviceSession::is_live)
}
