//! Input report events and listener bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::descriptor::DeviceIdentity;

/// Capacity of the input report broadcast channel.
const REPORT_CHANNEL_CAPACITY: usize = 64;

/// Kinds of events a shim emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    InputReport,
}

/// One payload read from the device's IN endpoint.
///
/// `data` is the raw transfer; a leading report id, if the device sends one,
/// is left in place for the protocol handler to strip.
#[derive(Debug, Clone)]
pub struct InputReport {
    pub data: Bytes,
    pub device: DeviceIdentity,
}

impl InputReport {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        EventKind::InputReport
    }
}

/// Token returned when registering a listener, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type InputReportCallback = Arc<dyn Fn(&InputReport) + Send + Sync>;

/// Callback registry shared between a shim and its polling task.
pub(crate) struct EventListeners {
    primary: RwLock<Option<InputReportCallback>>,
    listeners: RwLock<HashMap<EventKind, Vec<(ListenerId, InputReportCallback)>>>,
    next_id: AtomicU64,
    reports: broadcast::Sender<InputReport>,
}

impl EventListeners {
    pub(crate) fn new() -> Self {
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        Self {
            primary: RwLock::new(None),
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            reports,
        }
    }

    pub(crate) fn set_primary(&self, callback: Option<InputReportCallback>) {
        *self.primary.write() = callback;
    }

    pub(crate) fn add(&self, kind: EventKind, callback: InputReportCallback) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().entry(kind).or_default().push((id, callback));
        id
    }

    pub(crate) fn remove(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(registered) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = registered.len();
        registered.retain(|(listener_id, _)| *listener_id != id);
        before != registered.len()
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<InputReport> {
        self.reports.subscribe()
    }

    /// Deliver a report: primary callback first, then listeners in
    /// registration order, then broadcast subscribers.
    ///
    /// Listeners are snapshotted before any is called, so a removal made
    /// during dispatch applies from the next report on.
    pub(crate) fn dispatch(&self, report: &InputReport) {
        let primary = self.primary.read().clone();
        if let Some(callback) = primary {
            callback(report);
        }

        let snapshot: Vec<InputReportCallback> = self
            .listeners
            .read()
            .get(&report.kind())
            .map(|registered| registered.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();
        for callback in snapshot {
            callback(report);
        }

        // No subscribers is fine
        let _ = self.reports.send(report.clone());
    }
}
