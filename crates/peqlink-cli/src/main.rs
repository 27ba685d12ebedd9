//! peqlink - parametric EQ control for USB audio devices.
//!
//! Devices are reached through libusb with an emulated HID layer, matched
//! against a vendor catalog and driven through per-vendor PEQ handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use peqlink_core::VendorCatalog;
use peqlink_session::{HandlerRegistry, SessionManager};
use peqlink_usb::{DeviceSelector, RusbSelector};
use tracing::info;

mod cli;
mod commands;
mod config;
mod logging;
mod prompt;
mod signals;

use cli::{Cli, Commands};
use prompt::PromptSelector;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;

    logging::init(&config.logging.level)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting peqlink");

    let catalog_path = match cli.catalog {
        Some(path) => path,
        None => config.catalog_path()?,
    };
    let catalog = VendorCatalog::load(&catalog_path)
        .with_context(|| format!("Failed to load vendor catalog: {catalog_path:?}"))?;
    info!(vendors = catalog.vendors().len(), path = ?catalog_path, "Vendor catalog loaded");

    let options = config.usb.transport_options();
    let product_id = match cli.product_id {
        Some(pid) => Some(pid),
        None => config.selection.product_id()?,
    };

    if matches!(cli.command, Commands::Devices) {
        return commands::devices(&catalog, options).await;
    }

    let selector: Arc<dyn DeviceSelector> = if config.selection.interactive && !cli.no_prompt {
        Arc::new(PromptSelector::new(options, product_id))
    } else {
        Arc::new(RusbSelector::new(options).with_product_id(product_id))
    };

    // Vendor protocol handlers are linked in by builds that ship them
    let manager = SessionManager::new(catalog, HandlerRegistry::new(), selector);

    let Some(session) = commands::connect(&manager).await? else {
        return Ok(());
    };

    let result = match cli.command {
        Commands::Devices => Ok(()),
        Commands::Monitor => commands::monitor(&session).await,
        Commands::Slots => commands::slots(&session).await,
        Commands::Pull { slot } => commands::pull(&session, slot).await,
        Commands::Push { file, slot, preamp } => {
            commands::push(&session, &file, slot, preamp).await
        }
        Commands::Enable { slot } => commands::set_enabled(&session, true, slot).await,
        Commands::Disable => commands::set_enabled(&session, false, None).await,
    };

    manager.disconnect().await;
    result
}
