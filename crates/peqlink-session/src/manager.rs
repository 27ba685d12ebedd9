//! Connection lifecycle of the active device.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use peqlink_core::VendorCatalog;
use peqlink_usb::{DeviceFilter, DeviceSelector, HidShim};
use tracing::{debug, info, warn};

use crate::error::PeqError;
use crate::handler::HandlerRegistry;
use crate::session::DeviceSession;

/// Result of [`SessionManager::connect`].
#[derive(Debug)]
pub enum ConnectOutcome {
    /// A session is active: freshly opened or the one already there.
    Connected(Arc<DeviceSession>),
    /// The chosen device belongs to no known vendor.
    NoMatch,
    /// The prompt was dismissed or nothing could be selected.
    UserCancelled,
    /// Selection or opening failed. No session was stored.
    Failed { error: PeqError },
}

impl ConnectOutcome {
    #[must_use]
    pub fn session(&self) -> Option<&Arc<DeviceSession>> {
        match self {
            Self::Connected(session) => Some(session),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }

    /// Human-readable failure message, if this is a failure.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Failed { error } => Some(error.to_string()),
            _ => None,
        }
    }
}

/// Owns the active [`DeviceSession`].
///
/// Connect and disconnect are expected to be issued by one caller at a time.
pub struct SessionManager {
    catalog: VendorCatalog,
    handlers: HandlerRegistry,
    selector: Arc<dyn DeviceSelector>,
    current: ArcSwapOption<DeviceSession>,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        catalog: VendorCatalog,
        handlers: HandlerRegistry,
        selector: Arc<dyn DeviceSelector>,
    ) -> Self {
        Self { catalog, handlers, selector, current: ArcSwapOption::empty() }
    }

    #[must_use]
    pub fn catalog(&self) -> &VendorCatalog {
        &self.catalog
    }

    /// One vendor filter per known vendor id.
    #[must_use]
    pub fn device_filters(&self) -> Vec<DeviceFilter> {
        self.catalog.vendor_ids().into_iter().map(DeviceFilter::vendor).collect()
    }

    /// The active session, if any.
    #[must_use]
    pub fn current(&self) -> Option<Arc<DeviceSession>> {
        self.current.load_full()
    }

    /// Select a device, resolve its configuration and open it.
    ///
    /// An active session is returned as-is without prompting again.
    /// Cancellation and unknown vendors are reported as outcomes, not errors.
    pub async fn connect(&self) -> ConnectOutcome {
        if let Some(existing) = self.current() {
            debug!(model = %existing.model(), "Session already active");
            return ConnectOutcome::Connected(existing);
        }

        let filters = self.device_filters();
        let transport = match self.selector.request_device(&filters).await {
            Ok(transport) => transport,
            Err(e) if e.is_cancellation() => {
                info!(reason = %e, "No device selected");
                return ConnectOutcome::UserCancelled;
            }
            Err(e) => {
                warn!(error = %e, "Device selection failed");
                return ConnectOutcome::Failed { error: e.into() };
            }
        };

        let shim = Arc::new(HidShim::new(transport));
        let Some(resolved) = self.catalog.resolve(shim.vendor_id(), shim.product_name()) else {
            info!(device = %shim.identity(), "Selected device is not a known PEQ device");
            return ConnectOutcome::NoMatch;
        };

        if let Some(existing) = self.current() {
            return ConnectOutcome::Connected(existing);
        }

        if let Err(e) = shim.open().await {
            warn!(device = %shim.identity(), error = %e, "Failed to open device");
            return ConnectOutcome::Failed { error: e.into() };
        }

        let handler = match resolved.handler.as_deref() {
            Some(tag) => {
                let handler = self.handlers.get(tag);
                if handler.is_none() {
                    warn!(handler = tag, "No handler registered for tag, PEQ disabled");
                }
                handler
            }
            None => None,
        };

        let session = Arc::new(DeviceSession::new(shim, resolved, handler));
        info!(
            manufacturer = %session.manufacturer(),
            model = %session.model(),
            handler = session.handler_tag(),
            "Device connected"
        );
        self.current.store(Some(Arc::clone(&session)));
        ConnectOutcome::Connected(session)
    }

    /// Close the active session's device and forget it. Close errors are
    /// logged and dropped; without a session this does nothing.
    pub async fn disconnect(&self) {
        let Some(session) = self.current.swap(None) else {
            return;
        };

        if let Err(e) = session.shim().close().await {
            warn!(error = %e, "Error while closing device");
        }
        info!(model = %session.model(), "Device disconnected");
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("vendors", &self.catalog.vendors().len())
            .field("handlers", &self.handlers)
            .field("current", &self.current.load_full())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use assert_matches::assert_matches;
    use peqlink_core::{DeviceEntry, Filter, ModelConfig, ModelOverrides, VendorConfig};
    use peqlink_usb::descriptor::{CLASS_HID, CLASS_VENDOR_SPECIFIC};
    use peqlink_usb::mock::{MockSelector, MockTransport};
    use peqlink_usb::{
        ConfigurationInfo, EndpointInfo, InterfaceInfo, SelectionError, UsbError, UsbTransport,
    };

    use super::*;
    use crate::handler::{MockPeqHandler, PeqHandler};

    const FIIO_VID: u16 = 0x2972;

    fn catalog() -> VendorCatalog {
        let mut devices = BTreeMap::new();
        devices.insert(
            "JadeAudio JA11".to_string(),
            DeviceEntry {
                manufacturer: Some("JadeAudio".into()),
                handler: None,
                model_config: Some(ModelOverrides { max_filters: Some(5), ..ModelOverrides::default() }),
            },
        );

        VendorCatalog::new(vec![VendorConfig {
            vendor_ids: vec![FIIO_VID, 0x0a12],
            manufacturer: "FiiO".into(),
            handler: Some("fiio".into()),
            devices,
            default_model_config: ModelConfig {
                max_filters: 10,
                available_slots: Vec::new(),
                default_reset_filters: vec![Filter::peak(1000.0, 1.0, 0.0)],
                freq_range: None,
                q_range: None,
                gain_range: None,
            },
        }])
        .expect("Failed to build catalog")
    }

    fn device(vendor_id: u16, name: &str, class: u8) -> Arc<MockTransport> {
        Arc::new(
            MockTransport::new(vendor_id, 0x0001, Some(name))
                .with_configuration(ConfigurationInfo {
                    value: 1,
                    interfaces: vec![InterfaceInfo::single(
                        2,
                        class,
                        0,
                        vec![EndpointInfo::interrupt_in(3, 64)],
                    )],
                })
                .with_active_configuration(Some(1)),
        )
    }

    fn manager(selector: &Arc<MockSelector>, handlers: HandlerRegistry) -> SessionManager {
        SessionManager::new(catalog(), handlers, Arc::clone(selector) as Arc<dyn DeviceSelector>)
    }

    #[test]
    fn test_device_filters_cover_all_vendor_ids() {
        let selector = Arc::new(MockSelector::new());
        let manager = manager(&selector, HandlerRegistry::new());

        let filters = manager.device_filters();
        assert_eq!(filters, vec![DeviceFilter::vendor(FIIO_VID), DeviceFilter::vendor(0x0a12)]);
    }

    #[tokio::test]
    async fn test_connect_resolves_model_and_handler() {
        let selector = Arc::new(MockSelector::new());
        let transport = device(FIIO_VID, "JadeAudio JA11", CLASS_HID);
        selector.push_device(Arc::clone(&transport) as Arc<dyn UsbTransport>);

        let handler: Arc<dyn PeqHandler> = Arc::new(MockPeqHandler::new());
        let manager = manager(&selector, HandlerRegistry::new().with("fiio", handler));

        let outcome = manager.connect().await;
        assert!(outcome.is_connected());
        let session = outcome.session().expect("Failed to connect").clone();

        assert_eq!(session.manufacturer(), "JadeAudio");
        assert_eq!(session.model(), "JadeAudio JA11");
        assert_eq!(session.model_config().max_filters, 5);
        assert_eq!(session.handler_tag(), Some("fiio"));
        assert!(session.has_handler());
        assert!(session.is_live());
        assert_eq!(transport.claimed(), vec![2]);
        assert_eq!(selector.last_filters().len(), 2);

        manager.disconnect().await;
    }

    #[tokio::test]
    async fn test_connect_twice_returns_same_session_without_prompt() {
        let selector = Arc::new(MockSelector::new());
        let transport = device(FIIO_VID, "FiiO KA17", CLASS_VENDOR_SPECIFIC);
        selector.push_device(Arc::clone(&transport) as Arc<dyn UsbTransport>);
        let manager = manager(&selector, HandlerRegistry::new());

        let first = manager.connect().await;
        let second = manager.connect().await;

        let first = first.session().expect("Failed to connect");
        let second = second.session().expect("Failed to reconnect");
        assert!(Arc::ptr_eq(first, second));
        assert_eq!(selector.prompt_count(), 1);
        assert_eq!(transport.open_count(), 1);

        // Unlisted product falls back to vendor defaults
        assert_eq!(first.manufacturer(), "FiiO");
        assert_eq!(first.model_config().max_filters, 10);

        manager.disconnect().await;
    }

    #[tokio::test]
    async fn test_unknown_vendor_is_no_match() {
        let selector = Arc::new(MockSelector::new());
        let transport = device(0x1234, "Some Mouse", CLASS_HID);
        selector.push_device(Arc::clone(&transport) as Arc<dyn UsbTransport>);
        let manager = manager(&selector, HandlerRegistry::new());

        assert_matches!(manager.connect().await, ConnectOutcome::NoMatch);
        assert!(manager.current().is_none());
        assert_eq!(transport.open_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_selection() {
        for error in [SelectionError::Cancelled, SelectionError::NotFound, SelectionError::NotAllowed] {
            let selector = Arc::new(MockSelector::new());
            selector.push_error(error);
            let manager = manager(&selector, HandlerRegistry::new());

            let outcome = manager.connect().await;
            assert_matches!(outcome, ConnectOutcome::UserCancelled);
            assert!(!outcome.is_connected());
            assert!(outcome.error_message().is_none());
            assert!(manager.current().is_none());
        }
    }

    #[tokio::test]
    async fn test_selection_failure_is_reported() {
        let selector = Arc::new(MockSelector::new());
        selector.push_error(SelectionError::Failed("backend gone".into()));
        let manager = manager(&selector, HandlerRegistry::new());

        let outcome = manager.connect().await;
        assert_matches!(&outcome, ConnectOutcome::Failed { error: PeqError::Selection(_) });
        assert!(outcome.error_message().is_some_and(|m| m.contains("backend gone")));
    }

    #[tokio::test]
    async fn test_open_failure_stores_no_session() {
        let selector = Arc::new(MockSelector::new());
        // Audio class only, nothing to claim
        let transport = device(FIIO_VID, "FiiO BTR13", 0x01);
        selector.push_device(Arc::clone(&transport) as Arc<dyn UsbTransport>);
        let manager = manager(&selector, HandlerRegistry::new());

        let outcome = manager.connect().await;
        assert_matches!(
            &outcome,
            ConnectOutcome::Failed { error: PeqError::Usb(UsbError::NoClaimableInterface { .. }) }
        );
        assert!(outcome.error_message().is_some_and(|m| m.contains("[I2C1S0]")));
        assert!(manager.current().is_none());
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_unregistered_handler_tag_leaves_session_without_handler() {
        let selector = Arc::new(MockSelector::new());
        selector.push_device(device(FIIO_VID, "FiiO KA17", CLASS_HID) as Arc<dyn UsbTransport>);
        let manager = manager(&selector, HandlerRegistry::new());

        let outcome = manager.connect().await;
        let session = outcome.session().expect("Failed to connect");
        assert_eq!(session.handler_tag(), Some("fiio"));
        assert!(!session.has_handler());

        manager.disconnect().await;
    }

    #[tokio::test]
    async fn test_disconnect_closes_and_clears() {
        let selector = Arc::new(MockSelector::new());
        let transport = device(FIIO_VID, "FiiO KA17", CLASS_HID);
        selector.push_device(Arc::clone(&transport) as Arc<dyn UsbTransport>);
        let manager = manager(&selector, HandlerRegistry::new());

        let outcome = manager.connect().await;
        let session = Arc::clone(outcome.session().expect("Failed to connect"));

        manager.disconnect().await;

        assert!(manager.current().is_none());
        assert!(!session.is_live());
        assert!(!transport.is_open());
        assert_eq!(transport.released(), vec![2]);

        // Nothing to do the second time
        manager.disconnect().await;
    }

    #[tokio::test]
    async fn test_connect_after_disconnect_prompts_again() {
        let selector = Arc::new(MockSelector::new());
        selector.push_device(device(FIIO_VID, "FiiO KA17", CLASS_HID) as Arc<dyn UsbTransport>);
        selector.push_device(device(FIIO_VID, "FiiO KA17", CLASS_HID) as Arc<dyn UsbTransport>);
        let manager = manager(&selector, HandlerRegistry::new());

        let first = manager.connect().await;
        manager.disconnect().await;
        let second = manager.connect().await;

        assert!(!Arc::ptr_eq(
            first.session().expect("Failed to connect"),
            second.session().expect("Failed to reconnect")
        ));
        assert_eq!(selector.prompt_count(), 2);

        manager.disconnect().await;
    }

    #[tokio::test]
    async fn test_disconnected_push_keeps_session() {
        let selector = Arc::new(MockSelector::new());
        let transport = device(FIIO_VID, "FiiO KA17", CLASS_HID);
        selector.push_device(Arc::clone(&transport) as Arc<dyn UsbTransport>);
        let manager = manager(&selector, HandlerRegistry::new());

        let outcome = manager.connect().await;
        let session = Arc::clone(outcome.session().expect("Failed to connect"));

        // Device goes away underneath the session
        session.shim().close().await.expect("Failed to close shim");

        let result = session.push(101, 0.0, &[Filter::peak(1000.0, 1.0, 0.0)]).await;
        assert_matches!(result, Err(PeqError::DeviceDisconnected));

        let current = manager.current().expect("Session was cleared");
        assert!(Arc::ptr_eq(&current, &session));
        assert!(!current.is_live());

        manager.disconnect().await;
        assert!(manager.current().is_none());
    }
}
