//! HID-style device on top of a raw USB transport.

use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::descriptor::{
    CLASS_HID, CLASS_VENDOR_SPECIFIC, ControlSetup, DeviceIdentity, EndpointInfo, Recipient,
    RequestKind,
};
use crate::error::{UsbError, UsbResult};
use crate::events::{EventKind, EventListeners, InputReport, ListenerId};
use crate::transport::UsbTransport;

/// HID class request `SET_REPORT`.
pub const SET_REPORT: u8 = 0x09;
/// HID report type "Output", the high byte of `wValue`.
pub const OUTPUT_REPORT_TYPE: u16 = 0x02;
/// Maximum bytes requested per IN transfer.
pub const INPUT_REPORT_LEN: usize = 64;
/// Delay between two IN transfers.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Lifecycle of a shim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShimState {
    Closed,
    Opening,
    /// Interface claimed; polling runs if an IN endpoint was found
    Open,
    Closing,
}

/// Interface claimed by `open`, and the IN endpoint polled for input reports.
#[derive(Debug, Clone)]
struct ClaimedInterface {
    number: u8,
    in_endpoint: Option<EndpointInfo>,
}

/// A USB device presented with a HID-like API.
pub struct HidShim {
    transport: Arc<dyn UsbTransport>,
    identity: DeviceIdentity,
    opened: Arc<AtomicBool>,
    state: Mutex<ShimState>,
    claimed: Mutex<Option<ClaimedInterface>>,
    listeners: Arc<EventListeners>,
    poller: Mutex<Option<JoinHandle<()>>>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl HidShim {
    /// Wrap a transport. Nothing is opened until [`HidShim::open`].
    #[must_use]
    pub fn new(transport: Arc<dyn UsbTransport>) -> Self {
        let identity = transport.identity().clone();
        Self {
            transport,
            identity,
            opened: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(ShimState::Closed),
            claimed: Mutex::new(None),
            listeners: Arc::new(EventListeners::new()),
            poller: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    #[must_use]
    pub fn vendor_id(&self) -> u16 {
        self.identity.vendor_id
    }

    #[must_use]
    pub fn product_id(&self) -> u16 {
        self.identity.product_id
    }

    #[must_use]
    pub fn product_name(&self) -> Option<&str> {
        self.identity.product_name.as_deref()
    }

    /// Whether the device is open and an interface is claimed.
    #[must_use]
    pub fn opened(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn state(&self) -> ShimState {
        *self.state.lock()
    }

    /// Number of the claimed interface, if any.
    #[must_use]
    pub fn claimed_interface(&self) -> Option<u8> {
        self.claimed.lock().as_ref().map(|c| c.number)
    }

    /// IN endpoint being polled, if any.
    #[must_use]
    pub fn input_endpoint(&self) -> Option<EndpointInfo> {
        self.claimed.lock().as_ref().and_then(|c| c.in_endpoint.clone())
    }

    /// Open the device, claim the first HID or vendor-specific interface and
    /// start polling for input reports. Does nothing if already open.
    ///
    /// # Errors
    /// Returns [`UsbError::NoClaimableInterface`] if no candidate interface
    /// could be claimed, or the transport's error if opening fails.
    pub async fn open(&self) -> UsbResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.opened() {
            return Ok(());
        }

        self.set_state(ShimState::Opening);
        self.transport.open().await.inspect_err(|_| self.set_state(ShimState::Closed))?;

        let claim = match self.claim_first_interface().await {
            Ok(claim) => claim,
            Err(e) => {
                if let Err(close_err) = self.transport.close().await {
                    debug!(error = %close_err, "Failed to close transport after open failure");
                }
                self.set_state(ShimState::Closed);
                return Err(e);
            }
        };

        info!(
            device = %self.identity,
            interface = claim.number,
            in_endpoint = claim.in_endpoint.as_ref().map(|e| e.address),
            "Interface claimed"
        );

        let endpoint = claim.in_endpoint.clone();
        *self.claimed.lock() = Some(claim);
        self.opened.store(true, Ordering::Release);

        match endpoint {
            Some(endpoint) => self.start_polling(endpoint),
            None => debug!("Claimed interface has no IN endpoint, input polling disabled"),
        }

        self.set_state(ShimState::Open);
        Ok(())
    }

    /// Stop polling, release the claimed interface and close the device.
    /// Closing a closed shim is a no-op.
    ///
    /// # Errors
    /// Returns the first error from releasing the interface or closing the
    /// transport; the shim ends up closed either way.
    pub async fn close(&self) -> UsbResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.opened() {
            return Ok(());
        }

        self.set_state(ShimState::Closing);
        self.opened.store(false, Ordering::Release);

        // The poll loop exits on its own once it sees the flag
        let poller = self.poller.lock().take();
        if let Some(poller) = poller
            && let Err(e) = poller.await
        {
            warn!(error = %e, "Input polling task ended abnormally");
        }

        let mut result = Ok(());
        let claimed = self.claimed.lock().take();
        if let Some(claimed) = claimed
            && let Err(e) = self.transport.release_interface(claimed.number).await
        {
            warn!(interface = claimed.number, error = %e, "Failed to release interface");
            result = Err(e);
        }

        if let Err(e) = self.transport.close().await {
            warn!(error = %e, "Failed to close USB device");
            result = result.and(Err(e));
        }

        self.set_state(ShimState::Closed);
        info!(device = %self.identity, "Device closed");
        result
    }

    /// Send an output report as a HID `SET_REPORT` class request.
    ///
    /// Failures are logged and swallowed; this never fails the caller.
    pub async fn send_report(&self, report_id: u8, data: &[u8]) {
        let setup = ControlSetup {
            kind: RequestKind::Class,
            recipient: Recipient::Interface,
            request: SET_REPORT,
            value: (OUTPUT_REPORT_TYPE << 8) | u16::from(report_id),
            index: u16::from(self.claimed_interface().unwrap_or(0)),
        };

        match self.transport.control_transfer_out(setup, data).await {
            Ok(written) => trace!(report_id, written, "Output report sent"),
            Err(e) => warn!(report_id, len = data.len(), error = %e, "Output report failed"),
        }
    }

    /// Set the single input report callback, which runs before any
    /// registered listener. Replaces a previous one.
    pub fn set_oninputreport<F>(&self, callback: F)
    where
        F: Fn(&InputReport) + Send + Sync + 'static,
    {
        self.listeners.set_primary(Some(Arc::new(callback)));
    }

    pub fn clear_oninputreport(&self) {
        self.listeners.set_primary(None);
    }

    /// Register a listener. Listeners run in registration order.
    pub fn add_event_listener<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&InputReport) + Send + Sync + 'static,
    {
        self.listeners.add(kind, Arc::new(listener))
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn remove_event_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        self.listeners.remove(kind, id)
    }

    /// Receive every input report on a channel, after the callbacks ran.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<InputReport> {
        self.listeners.subscribe()
    }

    fn set_state(&self, state: ShimState) {
        *self.state.lock() = state;
    }

    /// Pick the first configuration if none is active, then claim the first
    /// HID or vendor-specific interface that lets us.
    async fn claim_first_interface(&self) -> UsbResult<ClaimedInterface> {
        let mut config = self.transport.active_configuration().await?;
        if config.is_none() {
            let configurations = self.transport.configurations().await?;
            if let Some(first) = configurations.first() {
                self.transport.select_configuration(first.value).await?;
                config = self.transport.active_configuration().await?;
            }
        }

        let mut trace = String::new();
        for interface in config.iter().flat_map(|c| c.interfaces.iter()) {
            let Some(alt) = interface.alternates.first() else {
                continue;
            };
            let _ = write!(trace, "[I{}C{}S{}]", interface.number, alt.class, alt.subclass);
            debug!(
                interface = interface.number,
                class = alt.class,
                subclass = alt.subclass,
                "Inspecting interface"
            );

            if alt.class != CLASS_HID && alt.class != CLASS_VENDOR_SPECIFIC {
                continue;
            }

            match self.transport.claim_interface(interface.number).await {
                Ok(()) => {
                    return Ok(ClaimedInterface {
                        number: interface.number,
                        in_endpoint: alt.first_in_endpoint().cloned(),
                    });
                }
                Err(e) => {
                    let _ = write!(trace, "!E:{e}!");
                    warn!(interface = interface.number, error = %e, "Could not claim interface");
                }
            }
        }

        Err(UsbError::NoClaimableInterface { trace })
    }

    fn start_polling(&self, endpoint: EndpointInfo) {
        let mut poller = self.poller.lock();
        if poller.is_some() {
            return;
        }

        *poller = Some(tokio::spawn(poll_input_reports(
            Arc::clone(&self.transport),
            endpoint,
            Arc::clone(&self.opened),
            Arc::clone(&self.listeners),
            self.identity.clone(),
        )));
    }
}

impl Drop for HidShim {
    fn drop(&mut self) {
        // Lets a still-running poll loop wind down
        self.opened.store(false, Ordering::Release);
    }
}

/// Read the IN endpoint every [`POLL_INTERVAL`] until `opened` is cleared.
async fn poll_input_reports(
    transport: Arc<dyn UsbTransport>,
    endpoint: EndpointInfo,
    opened: Arc<AtomicBool>,
    listeners: Arc<EventListeners>,
    identity: DeviceIdentity,
) {
    debug!(endpoint = endpoint.address, "Input polling started");

    while opened.load(Ordering::Acquire) {
        match transport.transfer_in(&endpoint, INPUT_REPORT_LEN).await {
            Ok(data) if !data.is_empty() => {
                let report = InputReport { data: Bytes::from(data), device: identity.clone() };
                listeners.dispatch(&report);
            }
            Ok(_) => {}
            Err(e) if opened.load(Ordering::Acquire) => {
                warn!(endpoint = endpoint.address, error = %e, "Input report poll failed");
            }
            Err(e) => trace!(error = %e, "Poll error after close ignored"),
        }

        if !opened.load(Ordering::Acquire) {
            break;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    debug!(endpoint = endpoint.address, "Input polling stopped");
}
