//! Harmonic distortion of the current waveform.

use crate::config::HarmonicsConfig;
use crate::detect::spectrum::{dominant_peaks, find_peaks, power_spectrum, total_harmonic_distortion};
use crate::detect::stats::mean;
use crate::detect::{finite_or_zero, Severity};
use crate::telemetry::TelemetrySeries;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A bin must exceed this multiple of the mean spectral power to be a peak.
const PEAK_HEIGHT_FACTOR: f64 = 1.5;
const PEAK_MIN_DISTANCE: usize = 2;
const MAX_DOMINANT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmonicResult {
    pub machine_id: String,
    pub thd_percent: f64,
    /// Mean power factor over the whole series.
    #[serde(rename = "power_factor")]
    pub average_power_factor: f64,
    pub severity: Severity,
    /// `(bin, magnitude)`, largest first.
    pub dominant_harmonics: Vec<(usize, f64)>,
}

/// `count` indices spread evenly over `0..len` (first and last included).
pub fn evenly_spaced(len: usize, count: usize) -> Vec<usize> {
    let count = count.min(len);
    match count {
        0 => Vec::new(),
        1 => vec![0],
        _ => {
            let step = (len - 1) as f64 / (count - 1) as f64;
            let mut indices: Vec<usize> = (0..count).map(|i| ((i as f64 * step) as usize).min(len - 1)).collect();
            // Rounding can leave the endpoint one short.
            indices[count - 1] = len - 1;
            indices
        }
    }
}

pub struct HarmonicDetector {
    config: HarmonicsConfig,
}

impl HarmonicDetector {
    pub fn new(config: HarmonicsConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, thd_percent: f64) -> Severity {
        if thd_percent > self.config.critical_thd_pct {
            Severity::Critical
        } else if thd_percent > self.config.warning_thd_pct {
            Severity::Warning
        } else {
            Severity::Normal
        }
    }

    pub fn analyze(&self, series: &TelemetrySeries) -> HarmonicResult {
        info!(machine = series.machine_id(), "Analyzing harmonics");

        let currents = series.currents();
        let samples: Vec<f64> = evenly_spaced(currents.len(), self.config.sample_size)
            .into_iter()
            .map(|i| currents[i])
            .collect();

        let power = power_spectrum(&samples);
        let peaks = find_peaks(&power, mean(&power) * PEAK_HEIGHT_FACTOR, PEAK_MIN_DISTANCE);
        let dominant_harmonics = dominant_peaks(&power, &peaks, MAX_DOMINANT)
            .into_iter()
            .map(|(bin, magnitude)| (bin, finite_or_zero(magnitude)))
            .collect();

        let thd_percent = finite_or_zero(total_harmonic_distortion(&power));
        let average_power_factor = finite_or_zero(mean(&series.power_factors()));
        let severity = self.classify(thd_percent);

        info!(
            machine = series.machine_id(),
            thd = %format_args!("{:.2}%", thd_percent),
            pf = %format_args!("{:.3}", average_power_factor),
            %severity,
            "Harmonic distortion"
        );

        HarmonicResult {
            machine_id: series.machine_id().to_string(),
            thd_percent,
            average_power_factor,
            severity,
            dominant_harmonics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::fixtures;
    use std::f64::consts::PI;

    fn detector() -> HarmonicDetector {
        HarmonicDetector::new(HarmonicsConfig::default())
    }

    #[test]
    fn test_evenly_spaced() {
        assert_eq!(evenly_spaced(10, 4), vec![0, 3, 6, 9]);
        assert_eq!(evenly_spaced(3, 10), vec![0, 1, 2]);
        assert_eq!(evenly_spaced(5, 1), vec![0]);
        assert!(evenly_spaced(0, 10).is_empty());
    }

    #[test]
    fn test_evenly_spaced_keeps_last_sample() {
        for len in (10_001..40_000).step_by(7) {
            let idx = evenly_spaced(len, 10_000);
            assert_eq!(idx.len(), 10_000);
            assert_eq!(idx[0], 0);
            assert_eq!(idx[9_999], len - 1, "len {}", len);
            assert!(idx.windows(2).all(|w| w[0] < w[1]), "len {}", len);
        }
    }

    #[test]
    fn test_pure_sine_has_no_distortion() {
        let n = 4000;
        let samples = fixtures::series(
            "M",
            n,
            |_| 400.0,
            |i| 10.0 + 2.0 * (2.0 * PI * i as f64 / n as f64).sin(),
            |_| 0.9,
        );
        let result = detector().analyze(&TelemetrySeries::new("M", samples));
        assert!(result.thd_percent < 1.0);
        assert_eq!(result.severity, Severity::Normal);
        assert!((result.average_power_factor - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_third_harmonic_is_critical() {
        let n = 4000;
        let samples = fixtures::series(
            "M",
            n,
            |_| 400.0,
            |i| {
                let t = 2.0 * PI * i as f64 / n as f64;
                10.0 + 5.0 * t.sin() + 1.0 * (3.0 * t).sin()
            },
            |_| 0.85,
        );
        let result = detector().analyze(&TelemetrySeries::new("M", samples));
        assert!((result.thd_percent - 20.0).abs() < 1e-6);
        assert_eq!(result.severity, Severity::Critical);
        // Bin 1 sits on the DC slope, so only the third harmonic is a local peak.
        assert_eq!(result.dominant_harmonics.len(), 1);
        assert_eq!(result.dominant_harmonics[0].0, 3);
        assert!((result.dominant_harmonics[0].1 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_downsamples_long_series() {
        let d = HarmonicDetector::new(HarmonicsConfig {
            sample_size: 500,
            ..HarmonicsConfig::default()
        });
        let samples = fixtures::series("M", 5000, |_| 400.0, |_| 10.0, |_| 0.9);
        let result = d.analyze(&TelemetrySeries::new("M", samples));
        assert_eq!(result.thd_percent, 0.0);
        assert!(result.dominant_harmonics.is_empty());
    }

    #[test]
    fn test_classification_thresholds() {
        let d = detector();
        assert_eq!(d.classify(15.1), Severity::Critical);
        assert_eq!(d.classify(15.0), Severity::Warning);
        assert_eq!(d.classify(10.0), Severity::Normal);
    }

    #[test]
    fn test_empty_series_is_neutral() {
        let result = detector().analyze(&TelemetrySeries::empty("M"));
        assert_eq!(result.thd_percent, 0.0);
        assert_eq!(result.average_power_factor, 0.0);
        assert_eq!(result.severity, Severity::Normal);
    }
}
