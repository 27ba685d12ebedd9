//! Tracing subscriber setup.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Crates whose level `logging.level` controls.
const TARGETS: &[&str] = &["peqlink", "peqlink_core", "peqlink_usb", "peqlink_session"];

/// `RUST_LOG` when set and valid, else `level` for our crates.
///
/// # Errors
/// Returns an error if `level` is not a valid level.
pub fn env_filter(rust_log: Option<&str>, level: &str) -> Result<EnvFilter> {
    if let Some(directives) = rust_log.filter(|d| !d.trim().is_empty()) {
        match EnvFilter::try_new(directives) {
            Ok(filter) => return Ok(filter),
            // No subscriber yet, so this can only go to stderr
            Err(e) => eprintln!("Ignoring invalid RUST_LOG ({e}), using logging.level"),
        }
    }

    let directives = TARGETS.iter().map(|t| format!("{t}={level}")).collect::<Vec<_>>().join(",");
    EnvFilter::try_new(directives).with_context(|| format!("Invalid logging.level: {level}"))
}

/// Install the global subscriber, writing to stderr.
///
/// # Errors
/// Returns an error if `level` is not a valid level.
pub fn init(level: &str) -> Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = env_filter(rust_log.as_deref(), level)?;
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_log_wins_over_config_level() {
        let filter = env_filter(Some("peqlink_usb=trace"), "info").expect("Failed to build filter");
        let rendered = filter.to_string();
        assert!(rendered.contains("peqlink_usb=trace"));
        assert!(!rendered.contains("peqlink_usb=info"));
    }

    #[test]
    fn test_config_level_without_rust_log() {
        for rust_log in [None, Some(""), Some("  ")] {
            let rendered = env_filter(rust_log, "debug").expect("Failed to build filter").to_string();
            assert!(rendered.contains("peqlink_usb=debug"));
            assert!(rendered.contains("peqlink_session=debug"));
        }
    }

    #[test]
    fn test_invalid_rust_log_falls_back() {
        let rendered =
            env_filter(Some("peqlink_usb=loud"), "warn").expect("Failed to build filter").to_string();
        assert!(rendered.contains("peqlink_core=warn"));
    }

    #[test]
    fn test_invalid_level_is_an_error() {
        assert!(env_filter(None, "chatty").is_err());
    }
}
