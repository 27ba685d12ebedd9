//! Vendor catalog: which USB vendors we know and how their models behave.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreResult, Error};
use crate::model::{ModelConfig, ModelOverrides};

/// Model name used when a device does not report a product string.
pub const UNKNOWN_MODEL: &str = "Unknown USB Device";

/// Device-specific entry inside a vendor config, keyed by product name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Manufacturer shown for this model (falls back to the vendor's)
    #[serde(default)]
    pub manufacturer: Option<String>,
    /// Handler tag for this model (falls back to the vendor's)
    #[serde(default)]
    pub handler: Option<String>,
    /// Keys that replace the vendor's default model config
    #[serde(default, alias = "modelConfig")]
    pub model_config: Option<ModelOverrides>,
}

/// Static configuration for one manufacturer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorConfig {
    /// USB vendor ids belonging to this manufacturer
    #[serde(alias = "vendorIds")]
    pub vendor_ids: Vec<u16>,
    /// Manufacturer name
    pub manufacturer: String,
    /// Default handler tag
    #[serde(default)]
    pub handler: Option<String>,
    /// Per-product overrides keyed by USB product name
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceEntry>,
    /// Model config applied to every product of this vendor
    #[serde(alias = "defaultModelConfig")]
    pub default_model_config: ModelConfig,
}

/// Configuration resolved for a concrete device.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModel {
    pub manufacturer: String,
    pub model: String,
    pub handler: Option<String>,
    pub model_config: ModelConfig,
}

impl VendorConfig {
    /// Resolve the configuration for a product of this vendor.
    ///
    /// Model-specific keys win over vendor defaults; a missing product name
    /// resolves as [`UNKNOWN_MODEL`].
    #[must_use]
    pub fn resolve(&self, product_name: Option<&str>) -> ResolvedModel {
        let model = product_name.filter(|name| !name.is_empty()).unwrap_or(UNKNOWN_MODEL);
        let details = self.devices.get(model);

        let model_config = match details.and_then(|d| d.model_config.as_ref()) {
            Some(overrides) => self.default_model_config.with_overrides(overrides),
            None => self.default_model_config.clone(),
        };

        ResolvedModel {
            manufacturer: details
                .and_then(|d| d.manufacturer.clone())
                .unwrap_or_else(|| self.manufacturer.clone()),
            model: model.to_string(),
            handler: details.and_then(|d| d.handler.clone()).or_else(|| self.handler.clone()),
            model_config,
        }
    }
}

/// The full set of known vendors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VendorCatalog {
    #[serde(default, rename = "vendor", alias = "vendors")]
    vendors: Vec<VendorConfig>,
}

impl VendorCatalog {
    /// Build a catalog from already-parsed vendor configs.
    ///
    /// # Errors
    /// Returns an error if any model config declares zero filters.
    pub fn new(vendors: Vec<VendorConfig>) -> CoreResult<Self> {
        let catalog = Self { vendors };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Parse a catalog from TOML (`[[vendor]]` tables).
    ///
    /// # Errors
    /// Returns an error if the document is malformed or fails validation.
    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        let catalog: Self = toml::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Parse a catalog from JSON (`{"vendors": [...]}` or a bare array).
    ///
    /// # Errors
    /// Returns an error if the document is malformed or fails validation.
    pub fn from_json_str(content: &str) -> CoreResult<Self> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        let catalog = if value.is_array() {
            Self { vendors: serde_json::from_value(value)? }
        } else {
            serde_json::from_value(value)?
        };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog file; `.json` files are parsed as JSON, anything else as TOML.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog = if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) {
            Self::from_json_str(&content)?
        } else {
            Self::from_toml_str(&content)?
        };
        debug!(?path, vendors = catalog.vendors.len(), "Vendor catalog loaded");
        Ok(catalog)
    }

    /// All known vendor configs.
    #[must_use]
    pub fn vendors(&self) -> &[VendorConfig] {
        &self.vendors
    }

    /// Every known vendor id, in catalog order without duplicates.
    #[must_use]
    pub fn vendor_ids(&self) -> Vec<u16> {
        let mut ids = Vec::new();
        for id in self.vendors.iter().flat_map(|v| v.vendor_ids.iter().copied()) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// Find the first vendor config claiming `vendor_id`.
    #[must_use]
    pub fn find_vendor(&self, vendor_id: u16) -> Option<&VendorConfig> {
        self.vendors.iter().find(|v| v.vendor_ids.contains(&vendor_id))
    }

    /// Resolve vendor and model configuration for a device.
    #[must_use]
    pub fn resolve(&self, vendor_id: u16, product_name: Option<&str>) -> Option<ResolvedModel> {
        self.find_vendor(vendor_id).map(|vendor| vendor.resolve(product_name))
    }

    fn validate(&self) -> CoreResult<()> {
        for vendor in &self.vendors {
            if vendor.vendor_ids.is_empty() {
                return Err(Error::InvalidCatalog(format!(
                    "{} declares no vendor ids",
                    vendor.manufacturer
                )));
            }
            if vendor.default_model_config.max_filters == 0 {
                return Err(Error::InvalidCatalog(format!(
                    "{} default model config has max_filters = 0",
                    vendor.manufacturer
                )));
            }
            for (name, entry) in &vendor.devices {
                if entry.model_config.as_ref().and_then(|c| c.max_filters) == Some(0) {
                    return Err(Error::InvalidCatalog(format!(
                        "{name} model config has max_filters = 0"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
[[vendor]]
vendor_ids = [0x3302]
manufacturer = "FiiO"
handler = "fiio"

[vendor.default_model_config]
max_filters = 5
available_slots = [{ id = 0, name = "Jazz" }, { id = 1, name = "Pop" }]
default_reset_filters = [{ type = "PK", freq = 1000, q = 1, gain = 0 }]

[vendor.devices."JA11"]
handler = "fiio-ja11"

[vendor.devices."JA11".model_config]
max_filters = 10

[vendor.devices."KA17"]
manufacturer = "FiiO Electronics"

[[vendor]]
vendor_ids = [0x0d8c, 0x3302]
manufacturer = "Generic"

[vendor.default_model_config]
max_filters = 8
"#;

    fn catalog() -> VendorCatalog {
        VendorCatalog::from_toml_str(CATALOG).expect("Failed to parse catalog")
    }

    #[test]
    fn test_vendor_ids_are_deduplicated() {
        assert_eq!(catalog().vendor_ids(), vec![0x3302, 0x0d8c]);
    }

    #[test]
    fn test_first_vendor_wins() {
        let catalog = catalog();
        assert_eq!(catalog.find_vendor(0x3302).map(|v| v.manufacturer.as_str()), Some("FiiO"));
        assert_eq!(catalog.find_vendor(0x0d8c).map(|v| v.manufacturer.as_str()), Some("Generic"));
        assert!(catalog.find_vendor(0x1234).is_none());
    }

    #[test]
    fn test_model_overrides_are_merged() {
        let resolved = catalog().resolve(0x3302, Some("JA11")).expect("Vendor not found");

        assert_eq!(resolved.model, "JA11");
        assert_eq!(resolved.handler.as_deref(), Some("fiio-ja11"));
        assert_eq!(resolved.manufacturer, "FiiO");
        assert_eq!(resolved.model_config.max_filters, 10);
        // Slots come from the vendor default
        assert_eq!(resolved.model_config.available_slots.len(), 2);
    }

    #[test]
    fn test_model_manufacturer_wins() {
        let resolved = catalog().resolve(0x3302, Some("KA17")).expect("Vendor not found");
        assert_eq!(resolved.manufacturer, "FiiO Electronics");
        assert_eq!(resolved.handler.as_deref(), Some("fiio"));
        assert_eq!(resolved.model_config.max_filters, 5);
    }

    #[test]
    fn test_missing_product_name_is_unknown_model() {
        let resolved = catalog().resolve(0x0d8c, None).expect("Vendor not found");
        assert_eq!(resolved.model, UNKNOWN_MODEL);
        assert!(resolved.handler.is_none());
    }

    #[test]
    fn test_zero_max_filters_rejected() {
        let result = VendorCatalog::from_toml_str(
            r#"
[[vendor]]
vendor_ids = [1]
manufacturer = "Broken"
[vendor.default_model_config]
max_filters = 0
"#,
        );
        assert!(matches!(result, Err(Error::InvalidCatalog(_))));
    }

    #[test]
    fn test_json_catalog() {
        let catalog = VendorCatalog::from_json_str(
            r#"[{"vendorIds":[12],"manufacturer":"Json Audio","handler":"ja",
                 "devices":{"DAC":{"modelConfig":{"maxFilters":3}}},
                 "defaultModelConfig":{"maxFilters":6,"availableSlots":[],
                   "defaultResetFiltersValues":[{"type":"PK","freq":100,"q":1,"gain":0}]}}]"#,
        )
        .expect("Failed to parse JSON catalog");

        let resolved = catalog.resolve(12, Some("DAC")).expect("Vendor not found");
        assert_eq!(resolved.model_config.max_filters, 3);
        assert_eq!(resolved.handler.as_deref(), Some("ja"));
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("vendors.toml");
        std::fs::write(&path, CATALOG).expect("Failed to write catalog");

        let catalog = VendorCatalog::load(&path).expect("Failed to load catalog");
        assert_eq!(catalog.vendors().len(), 2);
    }
}
