//! Command line definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use peqlink_core::SlotId;

use crate::config::parse_hex_u16;

#[derive(Debug, Parser)]
#[command(name = "peqlink")]
#[command(author, version, about = "Parametric EQ control for USB audio devices")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Vendor catalog, overrides `catalog.path`
    #[arg(long, global = true, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Only consider devices with this USB product id (hex)
    #[arg(long, global = true, value_parser = parse_product_id)]
    pub product_id: Option<u16>,

    /// Take the first matching device without asking
    #[arg(long, global = true)]
    pub no_prompt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List attached devices from known vendors
    #[command(visible_aliases = ["list", "ls"])]
    Devices,

    /// Print input reports until interrupted
    #[command(visible_alias = "mon")]
    Monitor,

    /// Show the model's slots and the one in use
    Slots,

    /// Read the filters stored in a slot as JSON
    Pull {
        /// Slot id (defaults to the current slot)
        #[arg(long, allow_hyphen_values = true)]
        slot: Option<SlotId>,
    },

    /// Write filters from a JSON file to a slot
    Push {
        /// JSON file with `filters` and optional `preamp_db`, or a bare filter array
        file: PathBuf,
        /// Slot id (defaults to the current slot)
        #[arg(long, allow_hyphen_values = true)]
        slot: Option<SlotId>,
        /// Preamp gain in dB, overrides the file
        #[arg(long, allow_hyphen_values = true)]
        preamp: Option<f64>,
    },

    /// Turn PEQ processing on
    Enable {
        /// Slot to select (defaults to the current slot)
        #[arg(long, allow_hyphen_values = true)]
        slot: Option<SlotId>,
    },

    /// Turn PEQ processing off
    Disable,
}

fn parse_product_id(raw: &str) -> Result<u16, String> {
    parse_hex_u16(raw).map_err(|e| format!("{e:#}"))
}
