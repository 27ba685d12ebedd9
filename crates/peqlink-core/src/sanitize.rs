//! Filter sanitizing applied before any filter set reaches a device.
//!
//! Device protocols store exactly `max_filters` bands per slot and misbehave
//! on out-of-range frequency or Q, so every push goes through here first.

use std::ops::RangeInclusive;

use tracing::debug;

use crate::filter::Filter;
use crate::model::ModelConfig;

/// Frequencies outside this range are replaced with [`FALLBACK_FREQ`].
pub const FREQ_LIMITS: RangeInclusive<f64> = 20.0..=20_000.0;
/// Replacement for an out-of-range frequency (Hz).
pub const FALLBACK_FREQ: f64 = 100.0;
/// Q values outside this range are replaced with [`FALLBACK_Q`].
pub const Q_LIMITS: RangeInclusive<f64> = 0.01..=100.0;
/// Replacement for an out-of-range Q.
pub const FALLBACK_Q: f64 = 1.0;

/// Fit `filters` to a model's fixed-width filter table.
///
/// The result always holds `config.max_filters` entries when the model has a
/// reset template; without one, short input is returned unpadded. Extra
/// filters are dropped from the end, out-of-range frequency and Q are replaced
/// with their fallbacks, and gain passes through untouched.
#[must_use]
pub fn sanitize_filters(filters: &[Filter], config: &ModelConfig) -> Vec<Filter> {
    let max = config.max_filters;
    if filters.len() > max {
        debug!(given = filters.len(), max, "Truncating filter list");
    }

    let mut sanitized: Vec<Filter> = filters.iter().take(max).map(clamp_filter).collect();

    if sanitized.len() < max
        && let Some(template) = config.reset_template()
    {
        debug!(given = sanitized.len(), max, "Padding filter list with reset filter");
        sanitized.resize(max, *template);
    }

    sanitized
}

fn clamp_filter(filter: &Filter) -> Filter {
    let mut clamped = *filter;
    // NaN fails `contains`, so it is replaced as well
    if !FREQ_LIMITS.contains(&clamped.freq) {
        clamped.freq = FALLBACK_FREQ;
    }
    if !Q_LIMITS.contains(&clamped.q) {
        clamped.q = FALLBACK_Q;
    }
    clamped
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::filter::FilterType;

    fn config(max_filters: usize) -> ModelConfig {
        ModelConfig {
            max_filters,
            available_slots: Vec::new(),
            default_reset_filters: vec![Filter::peak(1000.0, 1.0, 0.0)],
            freq_range: None,
            q_range: None,
            gain_range: None,
        }
    }

    fn numbered(count: usize) -> Vec<Filter> {
        (0..count).map(|i| Filter::peak(100.0 * (i + 1) as f64, 1.0, i as f64)).collect()
    }

    #[test]
    fn test_long_input_is_truncated_in_order() {
        let input = numbered(7);
        let output = sanitize_filters(&input, &config(5));

        assert_eq!(output.len(), 5);
        assert_eq!(output, input[..5]);
    }

    #[test]
    fn test_short_input_is_padded_with_template() {
        let input = numbered(2);
        let output = sanitize_filters(&input, &config(5));

        assert_eq!(output.len(), 5);
        assert_eq!(output[..2], input[..]);
        for filter in &output[2..] {
            assert_eq!(*filter, Filter::peak(1000.0, 1.0, 0.0));
        }
    }

    #[test]
    fn test_padding_uses_template_not_caller_data() {
        let mut cfg = config(3);
        cfg.default_reset_filters = vec![
            Filter::new(FilterType::LowShelf, 50.0, 0.7, 0.0),
            Filter::peak(2000.0, 2.0, 0.0),
        ];
        let output = sanitize_filters(&[Filter::peak(500.0, 3.0, 6.0)], &cfg);

        assert_eq!(output[1], Filter::new(FilterType::LowShelf, 50.0, 0.7, 0.0));
        assert_eq!(output[2], Filter::new(FilterType::LowShelf, 50.0, 0.7, 0.0));
    }

    #[test]
    fn test_no_template_means_no_padding() {
        let mut cfg = config(5);
        cfg.default_reset_filters.clear();

        assert_eq!(sanitize_filters(&numbered(2), &cfg).len(), 2);
    }

    #[test]
    fn test_out_of_range_values_replaced() {
        let input = [
            Filter::peak(10.0, 0.001, -30.0),
            Filter::peak(25_000.0, 150.0, 30.0),
            Filter::peak(f64::NAN, f64::NAN, 1.0),
        ];
        let output = sanitize_filters(&input, &config(3));

        for filter in &output {
            assert!((filter.freq - FALLBACK_FREQ).abs() < f64::EPSILON);
            assert!((filter.q - FALLBACK_Q).abs() < f64::EPSILON);
        }
        // Gain is never touched
        assert!((output[0].gain + 30.0).abs() < f64::EPSILON);
        assert!((output[1].gain - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        let input = [Filter::peak(20.0, 0.01, 0.0), Filter::peak(20_000.0, 100.0, 0.0)];
        assert_eq!(sanitize_filters(&input, &config(2)), input);
    }

    #[test]
    fn test_input_is_not_modified() {
        let input = vec![Filter::peak(5.0, 500.0, 0.0)];
        let _ = sanitize_filters(&input, &config(4));
        assert!((input[0].freq - 5.0).abs() < f64::EPSILON);
    }

    proptest! {
        #[test]
        fn test_sanitized_values_within_limits(
            bands in prop::collection::vec((-1.0e5f64..1.0e5, -10.0f64..500.0, -40.0f64..40.0), 0..20),
            max in 1usize..12,
        ) {
            let input: Vec<Filter> = bands.iter().map(|&(f, q, g)| Filter::peak(f, q, g)).collect();
            let output = sanitize_filters(&input, &config(max));

            prop_assert_eq!(output.len(), max);
            for (i, filter) in output.iter().enumerate() {
                prop_assert!(FREQ_LIMITS.contains(&filter.freq));
                prop_assert!(Q_LIMITS.contains(&filter.q));
                if let Some(original) = input.get(i) {
                    prop_assert_eq!(filter.gain.to_bits(), original.gain.to_bits());
                    if !FREQ_LIMITS.contains(&original.freq) {
                        prop_assert_eq!(filter.freq.to_bits(), FALLBACK_FREQ.to_bits());
                    }
                    if !Q_LIMITS.contains(&original.q) {
                        prop_assert_eq!(filter.q.to_bits(), FALLBACK_Q.to_bits());
                    }
                }
            }
        }
    }
}
