//! Interactive device selection on the terminal.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use peqlink_usb::{
    DeviceFilter, DeviceSelector, RusbTransport, SelectionError, TransportOptions, UsbTransport,
    list_devices,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

/// Lists matching devices and asks which one to use.
///
/// A single match is taken without asking. An empty answer cancels.
#[derive(Debug, Clone)]
pub struct PromptSelector {
    options: TransportOptions,
    product_id: Option<u16>,
}

impl PromptSelector {
    #[must_use]
    pub fn new(options: TransportOptions, product_id: Option<u16>) -> Self {
        Self { options, product_id }
    }

    async fn ask(&self, candidates: &[RusbTransport]) -> Result<Option<usize>, SelectionError> {
        let mut stderr = tokio::io::stderr();
        let mut menu = String::from("Select a device:\n");
        for (i, transport) in candidates.iter().enumerate() {
            let _ = writeln!(menu, "  {}) {}", i + 1, transport.identity());
        }
        menu.push_str("Number (empty to cancel): ");

        let io_failed = |e: std::io::Error| SelectionError::Failed(e.to_string());
        stderr.write_all(menu.as_bytes()).await.map_err(io_failed)?;
        stderr.flush().await.map_err(io_failed)?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await.map_err(io_failed)?;
        parse_choice(&line, candidates.len())
    }
}

/// Parse a 1-based menu answer. Empty input means "cancelled".
///
/// # Errors
/// Returns [`SelectionError::Failed`] for anything but an in-range number.
pub fn parse_choice(input: &str, count: usize) -> Result<Option<usize>, SelectionError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }

    match input.parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Ok(Some(n - 1)),
        _ => Err(SelectionError::Failed(format!(
            "'{input}' is not a device number between 1 and {count}"
        ))),
    }
}

#[async_trait]
impl DeviceSelector for PromptSelector {
    async fn request_device(
        &self,
        filters: &[DeviceFilter],
    ) -> Result<Arc<dyn UsbTransport>, SelectionError> {
        let filters = filters.to_vec();
        let options = self.options;
        let mut candidates = tokio::task::spawn_blocking(move || list_devices(&filters, options))
            .await
            .map_err(|e| SelectionError::Failed(e.to_string()))??;

        candidates.retain(|t| self.product_id.is_none_or(|pid| t.identity().product_id == pid));
        debug!(count = candidates.len(), "Devices offered for selection");

        let index = match candidates.len() {
            0 => return Err(SelectionError::NotFound),
            1 => 0,
            _ => self.ask(&candidates).await?.ok_or(SelectionError::Cancelled)?,
        };

        Ok(Arc::new(candidates.swap_remove(index)))
    }
}
