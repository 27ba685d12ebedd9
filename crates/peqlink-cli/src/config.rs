//! peqlink configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use peqlink_usb::TransportOptions;
use serde::{Deserialize, Serialize};
use tracing::info;

/// peqlink configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub usb: UsbConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Vendor catalog location.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CatalogConfig {
    /// Catalog path (optional, uses `vendors.toml` next to the config if not set)
    pub path: Option<PathBuf>,
}

/// libusb transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbConfig {
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_control_timeout_ms")]
    pub control_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub auto_detach_kernel_driver: bool,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: default_read_timeout_ms(),
            control_timeout_ms: default_control_timeout_ms(),
            auto_detach_kernel_driver: true,
        }
    }
}

impl UsbConfig {
    #[must_use]
    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            control_timeout: Duration::from_millis(self.control_timeout_ms),
            auto_detach_kernel_driver: self.auto_detach_kernel_driver,
        }
    }
}

fn default_read_timeout_ms() -> u64 {
    100
}

fn default_control_timeout_ms() -> u64 {
    1000
}

/// Device selection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Only offer devices with this USB product id (hex, e.g. "43e8")
    pub product_id: Option<String>,
    /// Ask which device to use instead of taking the first match
    #[serde(default = "default_true")]
    pub interactive: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self { product_id: None, interactive: true }
    }
}

impl SelectionConfig {
    /// The configured product id filter.
    ///
    /// # Errors
    /// Returns an error if the value is not a 16-bit hex number.
    pub fn product_id(&self) -> Result<Option<u16>> {
        self.product_id
            .as_deref()
            .map(|raw| parse_hex_u16(raw).with_context(|| format!("Invalid selection.product_id: {raw}")))
            .transpose()
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Vendor catalog path, falling back to `vendors.toml` in the config
    /// directory.
    ///
    /// # Errors
    /// Returns an error if no path is configured and the config directory
    /// cannot be determined.
    pub fn catalog_path(&self) -> Result<PathBuf> {
        match &self.catalog.path {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join("vendors.toml")),
        }
    }
}

/// Parse a USB id written as hex, with or without a `0x` prefix.
///
/// # Errors
/// Returns an error if `raw` is not a 16-bit hex number.
pub fn parse_hex_u16(raw: &str) -> Result<u16> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        bail!("empty USB id");
    }
    u16::from_str_radix(digits, 16).with_context(|| format!("'{raw}' is not a hex USB id"))
}

/// Load configuration from `path`, or from the default location when `None`.
///
/// A missing file at the default location yields the defaults; an explicitly
/// given path must exist.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let (config_path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (config_dir()?.join("config.toml"), false),
    };

    if !explicit && !config_path.exists() {
        info!(?config_path, "Config file not found, using defaults");
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config file: {config_path:?}"))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {config_path:?}"))?;
    Ok(config)
}

fn config_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("org", "peqlink", "peqlink")
        .context("Could not determine config directory")?;
    Ok(dirs.config_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert!(config.catalog.path.is_none());
        assert!(config.selection.interactive);

        let options = config.usb.transport_options();
        assert_eq!(options.read_timeout, Duration::from_millis(100));
        assert_eq!(options.control_timeout, Duration::from_secs(1));
        assert!(options.auto_detach_kernel_driver);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        writeln!(
            file,
            r#"
[logging]
level = "debug"

[catalog]
path = "/etc/peqlink/vendors.json"

[usb]
read_timeout_ms = 50

[selection]
product_id = "0x43E8"
interactive = false
"#
        )
        .expect("Failed to write config");

        let config = load_config(Some(file.path())).expect("Failed to load config");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.catalog_path().expect("Failed to resolve catalog path"),
            PathBuf::from("/etc/peqlink/vendors.json")
        );
        assert_eq!(config.usb.read_timeout_ms, 50);
        assert_eq!(config.usb.control_timeout_ms, 1000);
        assert_eq!(config.selection.product_id().expect("Failed to parse product id"), Some(0x43e8));
        assert!(!config.selection.interactive);
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        assert!(load_config(Some(dir.path().join("absent.toml").as_path())).is_err());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        writeln!(file, "[usb]\nread_timeout_ms = \"soon\"").expect("Failed to write config");

        let error = load_config(Some(file.path())).expect_err("Malformed config accepted");
        assert!(error.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_parse_hex_u16() {
        assert_eq!(parse_hex_u16("43e8").expect("Failed to parse"), 0x43e8);
        assert_eq!(parse_hex_u16("0x2972").expect("Failed to parse"), 0x2972);
        assert_eq!(parse_hex_u16(" 0XFF ").expect("Failed to parse"), 0xff);
        assert!(parse_hex_u16("").is_err());
        assert!(parse_hex_u16("0x").is_err());
        assert!(parse_hex_u16("12345").is_err());
        assert!(parse_hex_u16("zz").is_err());
    }

    #[test]
    fn test_invalid_product_id_setting() {
        let selection = SelectionConfig { product_id: Some("nope".into()), interactive: true };
        assert!(selection.product_id().is_err());
    }
}
