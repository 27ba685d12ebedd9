//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use peqlink_core::{Filter, SlotId, VendorCatalog};
use peqlink_session::{ConnectOutcome, DeviceSession, NO_HANDLER_SLOT, PeqSnapshot, SessionManager};
use peqlink_usb::{DeviceFilter, TransportOptions, UsbTransport, list_devices};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::signals;

const LIVENESS_INTERVAL: Duration = Duration::from_secs(1);

/// Print attached devices from known vendors with their resolved model.
///
/// # Errors
/// Returns an error if USB enumeration fails.
pub async fn devices(catalog: &VendorCatalog, options: TransportOptions) -> Result<()> {
    let filters: Vec<DeviceFilter> =
        catalog.vendor_ids().into_iter().map(DeviceFilter::vendor).collect();
    let found = tokio::task::spawn_blocking(move || list_devices(&filters, options))
        .await
        .context("Device enumeration task failed")?
        .context("Failed to enumerate USB devices")?;

    if found.is_empty() {
        println!("No supported devices attached");
        return Ok(());
    }

    for transport in &found {
        let identity = transport.identity();
        match catalog.resolve(identity.vendor_id, identity.product_name.as_deref()) {
            Some(model) => println!(
                "{identity}  {} {} (handler: {})",
                model.manufacturer,
                model.model,
                model.handler.as_deref().unwrap_or("none")
            ),
            None => println!("{identity}  unknown"),
        }
    }
    Ok(())
}

/// Connect, turning the non-session outcomes into a message.
///
/// # Errors
/// Returns an error if selection or opening failed.
pub async fn connect(manager: &SessionManager) -> Result<Option<Arc<DeviceSession>>> {
    match manager.connect().await {
        ConnectOutcome::Connected(session) => {
            if !session.has_handler() {
                warn!(
                    model = %session.model(),
                    handler = session.handler_tag(),
                    "No PEQ handler available, filter operations are no-ops"
                );
            }
            Ok(Some(session))
        }
        ConnectOutcome::NoMatch => {
            println!("Selected device is not a supported PEQ device");
            Ok(None)
        }
        ConnectOutcome::UserCancelled => {
            println!("No device selected");
            Ok(None)
        }
        ConnectOutcome::Failed { error } => {
            Err(anyhow::Error::new(error).context("Failed to connect to device"))
        }
    }
}

/// Print input reports as hex until SIGINT/SIGTERM or the device goes away.
///
/// # Errors
/// Returns an error if signal handlers cannot be installed.
pub async fn monitor(session: &DeviceSession) -> Result<()> {
    let mut reports = session.shim().subscribe();
    let shutdown = signals::shutdown_signal()?;
    tokio::pin!(shutdown);
    let mut liveness = tokio::time::interval(LIVENESS_INTERVAL);

    info!(device = %session.shim().identity(), "Monitoring input reports");
    loop {
        tokio::select! {
            report = reports.recv() => match report {
                Ok(report) => println!("{}", hex(&report.data)),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Monitor fell behind, reports dropped"),
                Err(RecvError::Closed) => break,
            },
            _ = liveness.tick() => {
                if !session.is_live() {
                    warn!("Device disconnected");
                    break;
                }
            }
            () = &mut shutdown => break,
        }
    }
    Ok(())
}

/// Print the model's slots and the active one.
///
/// # Errors
/// Returns the handler's error.
pub async fn slots(session: &DeviceSession) -> Result<()> {
    let current = session.current_slot().await.context("Failed to read current slot")?;

    println!("{} {}", session.manufacturer(), session.model());
    println!("max filters: {}", session.model_config().max_filters);
    for slot in session.available_slots() {
        let marker = if slot.id == current { '*' } else { ' ' };
        println!("{marker} {:>4}  {}", slot.id, slot.name);
    }
    if current == NO_HANDLER_SLOT {
        println!("current slot: unknown (no handler)");
    }
    Ok(())
}

/// # Errors
/// Returns an error if the device is disconnected or the handler fails.
pub async fn pull(session: &DeviceSession, slot: Option<SlotId>) -> Result<()> {
    require_handler(session, "nothing read")?;
    let slot = resolve_slot(session, slot).await?;
    let snapshot = session.pull(slot).await.with_context(|| format!("Failed to read slot {slot}"))?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// # Errors
/// Returns an error if no handler is bound, the file is unreadable, the
/// device is disconnected or the handler fails.
pub async fn push(
    session: &DeviceSession,
    file: &Path,
    slot: Option<SlotId>,
    preamp: Option<f64>,
) -> Result<()> {
    require_handler(session, "nothing written")?;

    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read filter file: {file:?}"))?;
    let snapshot = parse_filter_file(&content)
        .with_context(|| format!("Failed to parse filter file: {file:?}"))?;

    let slot = resolve_slot(session, slot).await?;
    let preamp_db = preamp.or(snapshot.preamp_db).unwrap_or(0.0);
    session
        .push(slot, preamp_db, &snapshot.filters)
        .await
        .with_context(|| format!("Failed to write slot {slot}"))?;

    println!("Filters written to slot {slot}");
    Ok(())
}

/// # Errors
/// Returns an error if no handler is bound, otherwise the handler's error.
pub async fn set_enabled(session: &DeviceSession, enabled: bool, slot: Option<SlotId>) -> Result<()> {
    require_handler(session, "PEQ state unchanged")?;
    let slot = resolve_slot(session, slot).await?;
    session.enable_peq(enabled, slot).await.context("Failed to change PEQ state")?;
    println!("PEQ {}", if enabled { "enabled" } else { "disabled" });
    Ok(())
}

/// Fail PEQ commands that the session would skip for lack of a handler.
fn require_handler(session: &DeviceSession, consequence: &str) -> Result<()> {
    if session.has_handler() {
        return Ok(());
    }
    match session.handler_tag() {
        Some(tag) => bail!(
            "No PEQ handler bound for {} (catalog handler '{tag}' is not available); {consequence}",
            session.model()
        ),
        None => bail!("No PEQ handler bound for {}; {consequence}", session.model()),
    }
}

/// Explicit slot, else the device's current slot, else the model's first slot.
async fn resolve_slot(session: &DeviceSession, slot: Option<SlotId>) -> Result<SlotId> {
    if let Some(slot) = slot {
        return Ok(slot);
    }

    let current = session.current_slot().await.context("Failed to read current slot")?;
    if current != NO_HANDLER_SLOT {
        return Ok(current);
    }
    match session.available_slots().first() {
        Some(slot) => Ok(slot.id),
        None => bail!("{} has no slots, pass --slot", session.model()),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FilterFile {
    Filters(Vec<Filter>),
    Snapshot(PeqSnapshot),
}

/// Accepts the output of `pull` or a bare filter array.
fn parse_filter_file(content: &str) -> serde_json::Result<PeqSnapshot> {
    Ok(match serde_json::from_str(content)? {
        FilterFile::Filters(filters) => PeqSnapshot { filters, preamp_db: None },
        FilterFile::Snapshot(snapshot) => snapshot,
    })
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" ")
}
