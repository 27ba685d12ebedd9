//! Scripted in-memory transport and selector for tests.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::descriptor::{ConfigurationInfo, ControlSetup, DeviceFilter, DeviceIdentity, EndpointInfo};
use crate::error::{SelectionError, UsbError, UsbResult};
use crate::selector::DeviceSelector;
use crate::transport::UsbTransport;

#[derive(Default)]
struct MockState {
    configurations: Vec<ConfigurationInfo>,
    active: Option<u8>,
    open: bool,
    open_count: usize,
    claim_failures: HashSet<u8>,
    claimed: Vec<u8>,
    released: Vec<u8>,
    selected: Vec<u8>,
    fail_control: bool,
    control_transfers: Vec<(ControlSetup, Vec<u8>)>,
    input: VecDeque<UsbResult<Vec<u8>>>,
    in_lengths: Vec<usize>,
}

/// A fake USB device with scripted descriptors and input.
pub struct MockTransport {
    identity: DeviceIdentity,
    state: Mutex<MockState>,
    in_transfers: AtomicUsize,
}

impl MockTransport {
    #[must_use]
    pub fn new(vendor_id: u16, product_id: u16, product_name: Option<&str>) -> Self {
        Self {
            identity: DeviceIdentity::new(vendor_id, product_id, product_name.map(str::to_string)),
            state: Mutex::new(MockState::default()),
            in_transfers: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_configuration(self, configuration: ConfigurationInfo) -> Self {
        self.state.lock().configurations.push(configuration);
        self
    }

    #[must_use]
    pub fn with_active_configuration(self, value: Option<u8>) -> Self {
        self.state.lock().active = value;
        self
    }

    /// Make claiming this interface fail.
    #[must_use]
    pub fn fail_claim(self, number: u8) -> Self {
        self.state.lock().claim_failures.insert(number);
        self
    }

    /// Make every control transfer fail (after being recorded).
    #[must_use]
    pub fn fail_control_transfers(self) -> Self {
        self.state.lock().fail_control = true;
        self
    }

    /// Queue a payload for the next IN transfer.
    pub fn queue_input(&self, data: Vec<u8>) {
        self.state.lock().input.push_back(Ok(data));
    }

    /// Queue an error for the next IN transfer.
    pub fn queue_input_error(&self, error: UsbError) {
        self.state.lock().input.push_back(Err(error));
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    #[must_use]
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    #[must_use]
    pub fn claimed(&self) -> Vec<u8> {
        self.state.lock().claimed.clone()
    }

    #[must_use]
    pub fn released(&self) -> Vec<u8> {
        self.state.lock().released.clone()
    }

    #[must_use]
    pub fn selected_configurations(&self) -> Vec<u8> {
        self.state.lock().selected.clone()
    }

    #[must_use]
    pub fn control_transfers(&self) -> Vec<(ControlSetup, Vec<u8>)> {
        self.state.lock().control_transfers.clone()
    }

    /// Requested length of every IN transfer, in order.
    #[must_use]
    pub fn in_transfer_lengths(&self) -> Vec<usize> {
        self.state.lock().in_lengths.clone()
    }

    #[must_use]
    pub fn in_transfer_count(&self) -> usize {
        self.in_transfers.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UsbTransport for MockTransport {
    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    async fn open(&self) -> UsbResult<()> {
        let mut state = self.state.lock();
        state.open = true;
        state.open_count += 1;
        Ok(())
    }

    async fn close(&self) -> UsbResult<()> {
        self.state.lock().open = false;
        Ok(())
    }

    async fn configurations(&self) -> UsbResult<Vec<ConfigurationInfo>> {
        Ok(self.state.lock().configurations.clone())
    }

    async fn active_configuration(&self) -> UsbResult<Option<ConfigurationInfo>> {
        let state = self.state.lock();
        if !state.open {
            return Err(UsbError::NotOpen);
        }
        Ok(state
            .active
            .and_then(|value| state.configurations.iter().find(|c| c.value == value).cloned()))
    }

    async fn select_configuration(&self, value: u8) -> UsbResult<()> {
        let mut state = self.state.lock();
        state.selected.push(value);
        state.active = Some(value);
        Ok(())
    }

    async fn claim_interface(&self, number: u8) -> UsbResult<()> {
        let mut state = self.state.lock();
        if state.claim_failures.contains(&number) {
            return Err(UsbError::Usb(rusb::Error::Busy));
        }
        state.claimed.push(number);
        Ok(())
    }

    async fn release_interface(&self, number: u8) -> UsbResult<()> {
        self.state.lock().released.push(number);
        Ok(())
    }

    async fn control_transfer_out(&self, setup: ControlSetup, data: &[u8]) -> UsbResult<usize> {
        let mut state = self.state.lock();
        state.control_transfers.push((setup, data.to_vec()));
        if state.fail_control {
            return Err(UsbError::Usb(rusb::Error::Pipe));
        }
        Ok(data.len())
    }

    async fn transfer_in(&self, _endpoint: &EndpointInfo, length: usize) -> UsbResult<Vec<u8>> {
        self.in_transfers.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        state.in_lengths.push(length);
        if !state.open {
            return Err(UsbError::NotOpen);
        }
        match state.input.pop_front() {
            Some(Ok(mut data)) => {
                data.truncate(length);
                Ok(data)
            }
            Some(Err(e)) => Err(e),
            None => Ok(Vec::new()),
        }
    }
}

/// Selector returning scripted results, one per prompt.
#[derive(Default)]
pub struct MockSelector {
    results: Mutex<VecDeque<Result<Arc<dyn UsbTransport>, SelectionError>>>,
    prompts: AtomicUsize,
    last_filters: Mutex<Vec<DeviceFilter>>,
}

impl MockSelector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next prompt with this device.
    pub fn push_device(&self, transport: Arc<dyn UsbTransport>) {
        self.results.lock().push_back(Ok(transport));
    }

    /// Answer the next prompt with this error.
    pub fn push_error(&self, error: SelectionError) {
        self.results.lock().push_back(Err(error));
    }

    /// How many times the selector was asked for a device.
    #[must_use]
    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn last_filters(&self) -> Vec<DeviceFilter> {
        self.last_filters.lock().clone()
    }
}

#[async_trait]
impl DeviceSelector for MockSelector {
    async fn request_device(
        &self,
        filters: &[DeviceFilter],
    ) -> Result<Arc<dyn UsbTransport>, SelectionError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        *self.last_filters.lock() = filters.to_vec();
        self.results.lock().pop_front().unwrap_or(Err(SelectionError::Cancelled))
    }
}
