//! Parametric EQ filter definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Shape of a single PEQ band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FilterType {
    /// Peaking (bell) filter
    #[default]
    #[serde(rename = "PK", alias = "Peak", alias = "peak")]
    Peak,
    /// Low shelf
    #[serde(rename = "LSQ", alias = "LowShelf", alias = "low_shelf")]
    LowShelf,
    /// High shelf
    #[serde(rename = "HSQ", alias = "HighShelf", alias = "high_shelf")]
    HighShelf,
}

impl FilterType {
    /// Short tag used in filter files.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Peak => "PK",
            Self::LowShelf => "LSQ",
            Self::HighShelf => "HSQ",
        }
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One PEQ band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Band shape
    #[serde(rename = "type", default)]
    pub filter_type: FilterType,
    /// Centre/corner frequency in Hz
    pub freq: f64,
    /// Quality factor
    pub q: f64,
    /// Gain in dB
    pub gain: f64,
}

impl Filter {
    /// Create a peaking filter.
    #[must_use]
    pub fn peak(freq: f64, q: f64, gain: f64) -> Self {
        Self { filter_type: FilterType::Peak, freq, q, gain }
    }

    /// Create a filter of the given type.
    #[must_use]
    pub fn new(filter_type: FilterType, freq: f64, q: f64, gain: f64) -> Self {
        Self { filter_type, freq, q, gain }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.1} Hz Q {:.2} {:+.1} dB", self.filter_type, self.freq, self.q, self.gain)
    }
}
