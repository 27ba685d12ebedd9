//! The capability contract every vendor protocol implements.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use peqlink_core::{Filter, SlotId};
use serde::{Deserialize, Serialize};

use crate::error::PeqResult;
use crate::session::DeviceSession;

/// Filters and preamp read back from a device slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeqSnapshot {
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preamp_db: Option<f64>,
}

/// Byte-level PEQ protocol of one vendor or model.
///
/// The session manager only calls these with a live session and, for
/// [`PeqHandler::push`], with filters already fitted to the model's table.
/// Implementations talk to the device through [`DeviceSession::shim`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PeqHandler: Send + Sync {
    /// Write a filter set and preamp to `slot`.
    async fn push(
        &self,
        device: &DeviceSession,
        slot: SlotId,
        preamp_db: f64,
        filters: &[Filter],
    ) -> PeqResult<()>;

    /// Read the filter set stored in `slot`.
    async fn pull(&self, device: &DeviceSession, slot: SlotId) -> PeqResult<PeqSnapshot>;

    /// Slot the device is currently using.
    async fn current_slot(&self, device: &DeviceSession) -> PeqResult<SlotId>;

    /// Turn PEQ processing on or off, selecting `slot` when enabling.
    async fn enable_peq(&self, device: &DeviceSession, enabled: bool, slot: SlotId)
    -> PeqResult<()>;
}

/// Handlers keyed by the tag used in the vendor catalog.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn PeqHandler>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one with the same tag.
    pub fn register(&mut self, tag: impl Into<String>, handler: Arc<dyn PeqHandler>) {
        self.handlers.insert(tag.into(), handler);
    }

    /// Builder form of [`HandlerRegistry::register`].
    #[must_use]
    pub fn with(mut self, tag: impl Into<String>, handler: Arc<dyn PeqHandler>) -> Self {
        self.register(tag, handler);
        self
    }

    #[must_use]
    pub fn get(&self, tag: &str) -> Option<Arc<dyn PeqHandler>> {
        self.handlers.get(tag).cloned()
    }

    /// Registered tags, sorted.
    #[must_use]
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry").field("tags", &self.tags()).finish()
    }
}
