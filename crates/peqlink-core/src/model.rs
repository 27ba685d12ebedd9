//! Per-model device capabilities.

use serde::{Deserialize, Serialize};

use crate::filter::Filter;

/// Identifier of an on-device preset slot.
pub type SlotId = i32;

/// Fallback frequency range handed to optimizers (Hz).
pub const DEFAULT_FREQ_RANGE: (f64, f64) = (20.0, 20_000.0);
/// Fallback Q range handed to optimizers.
pub const DEFAULT_Q_RANGE: (f64, f64) = (0.4, 4.0);
/// Fallback gain range handed to optimizers (dB).
pub const DEFAULT_GAIN_RANGE: (f64, f64) = (-12.0, 12.0);

/// A named storage location for one PEQ filter set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Device-side slot identifier
    pub id: SlotId,
    /// Name shown to the user
    pub name: String,
}

/// Capabilities and defaults of one device model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of filter bands the device stores per slot
    #[serde(alias = "maxFilters")]
    pub max_filters: usize,
    /// Slots the device exposes, in display order
    #[serde(default, alias = "availableSlots")]
    pub available_slots: Vec<Slot>,
    /// Filters written to reset a band; the first entry pads short pushes
    #[serde(default, alias = "defaultResetFiltersValues")]
    pub default_reset_filters: Vec<Filter>,
    /// Supported frequency range (Hz)
    #[serde(default, alias = "freqRange", skip_serializing_if = "Option::is_none")]
    pub freq_range: Option<(f64, f64)>,
    /// Supported Q range
    #[serde(default, alias = "qRange", skip_serializing_if = "Option::is_none")]
    pub q_range: Option<(f64, f64)>,
    /// Supported gain range (dB)
    #[serde(default, alias = "gainRange", skip_serializing_if = "Option::is_none")]
    pub gain_range: Option<(f64, f64)>,
}

/// Per-model keys that replace the vendor's default model config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelOverrides {
    #[serde(default, alias = "maxFilters")]
    pub max_filters: Option<usize>,
    #[serde(default, alias = "availableSlots")]
    pub available_slots: Option<Vec<Slot>>,
    #[serde(default, alias = "defaultResetFiltersValues")]
    pub default_reset_filters: Option<Vec<Filter>>,
    #[serde(default, alias = "freqRange")]
    pub freq_range: Option<(f64, f64)>,
    #[serde(default, alias = "qRange")]
    pub q_range: Option<(f64, f64)>,
    #[serde(default, alias = "gainRange")]
    pub gain_range: Option<(f64, f64)>,
}

/// Parameter limits an external optimizer should respect for a model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterBounds {
    pub freq: (f64, f64),
    pub q: (f64, f64),
    pub gain: (f64, f64),
}

impl ModelConfig {
    /// Apply per-model overrides on top of this config.
    ///
    /// Every key present in `overrides` wins; absent keys keep the default.
    #[must_use]
    pub fn with_overrides(&self, overrides: &ModelOverrides) -> Self {
        Self {
            max_filters: overrides.max_filters.unwrap_or(self.max_filters),
            available_slots: overrides
                .available_slots
                .clone()
                .unwrap_or_else(|| self.available_slots.clone()),
            default_reset_filters: overrides
                .default_reset_filters
                .clone()
                .unwrap_or_else(|| self.default_reset_filters.clone()),
            freq_range: overrides.freq_range.or(self.freq_range),
            q_range: overrides.q_range.or(self.q_range),
            gain_range: overrides.gain_range.or(self.gain_range),
        }
    }

    /// Template used to pad pushes shorter than `max_filters`.
    #[must_use]
    pub fn reset_template(&self) -> Option<&Filter> {
        self.default_reset_filters.first()
    }

    /// Parameter limits with the documented fallbacks filled in.
    #[must_use]
    pub fn filter_bounds(&self) -> FilterBounds {
        FilterBounds {
            freq: self.freq_range.unwrap_or(DEFAULT_FREQ_RANGE),
            q: self.q_range.unwrap_or(DEFAULT_Q_RANGE),
            gain: self.gain_range.unwrap_or(DEFAULT_GAIN_RANGE),
        }
    }
}
