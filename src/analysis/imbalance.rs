//! Phase imbalance: dispersion and periodicity of the current draw.

use crate::config::ImbalanceConfig;
use crate::detect::stats::TimeSeries;
use crate::detect::{finite_or_zero, Severity};
use crate::telemetry::TelemetrySeries;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseImbalanceResult {
    pub machine_id: String,
    #[serde(rename = "coefficient_of_variation")]
    pub cv: f64,
    pub current_range: f64,
    pub severity: Severity,
    /// Lag (samples) -> autocorrelation. Lags not shorter than the series are
    /// left out.
    pub autocorrelations: BTreeMap<usize, f64>,
}

pub struct PhaseImbalanceDetector {
    config: ImbalanceConfig,
}

impl PhaseImbalanceDetector {
    pub fn new(config: ImbalanceConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, cv: f64) -> Severity {
        if cv > self.config.critical_cv {
            Severity::Critical
        } else if cv > self.config.warning_cv {
            Severity::Warning
        } else {
            Severity::Normal
        }
    }

    pub fn analyze(&self, series: &TelemetrySeries) -> PhaseImbalanceResult {
        info!(machine = series.machine_id(), "Analyzing phase imbalance");

        let currents = series.currents();
        let ts = TimeSeries::new(&currents);

        let cv = finite_or_zero(ts.coefficient_of_variation());
        let current_range = finite_or_zero(ts.range());
        let autocorrelations = self
            .config
            .lags
            .iter()
            .filter_map(|&lag| ts.autocorrelation(lag).map(|r| (lag, finite_or_zero(r))))
            .collect();
        let severity = self.classify(cv);

        info!(
            machine = series.machine_id(),
            cv = %format_args!("{:.3}", cv),
            range = %format_args!("{:.2}A", current_range),
            %severity,
            "Phase imbalance"
        );

        PhaseImbalanceResult {
            machine_id: series.machine_id().to_string(),
            cv,
            current_range,
            severity,
            autocorrelations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::fixtures;

    fn detector() -> PhaseImbalanceDetector {
        PhaseImbalanceDetector::new(ImbalanceConfig::default())
    }

    #[test]
    fn test_constant_current_has_zero_cv() {
        let samples = fixtures::series("M", 2000, |_| 400.0, |_| 10.0, |_| 0.9);
        let result = detector().analyze(&TelemetrySeries::new("M", samples));
        assert_eq!(result.cv, 0.0);
        assert_eq!(result.current_range, 0.0);
        assert_eq!(result.severity, Severity::Normal);
        // Zero variance makes every autocorrelation undefined.
        assert_eq!(result.autocorrelations.len(), 4);
        assert!(result.autocorrelations.values().all(|&r| r == 0.0));
    }

    #[test]
    fn test_alternating_load_is_critical() {
        // Two load levels switching every 250 samples.
        let samples = fixtures::series(
            "M",
            2000,
            |_| 400.0,
            |i| if (i / 250) % 2 == 0 { 8.0 } else { 12.0 },
            |_| 0.9,
        );
        let result = detector().analyze(&TelemetrySeries::new("M", samples));
        assert!(result.cv > 0.15);
        assert_eq!(result.severity, Severity::Critical);
        assert_eq!(result.current_range, 4.0);
        assert!((result.autocorrelations[&500] - 1.0).abs() < 1e-9);
        assert!((result.autocorrelations[&250] + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_series_omits_long_lags() {
        let samples = fixtures::series("M", 300, |_| 400.0, |i| 10.0 + (i % 7) as f64 * 0.1, |_| 0.9);
        let result = detector().analyze(&TelemetrySeries::new("M", samples));
        assert_eq!(result.autocorrelations.keys().copied().collect::<Vec<_>>(), vec![100, 250]);
    }

    #[test]
    fn test_classification_thresholds() {
        let d = detector();
        assert_eq!(d.classify(0.16), Severity::Critical);
        assert_eq!(d.classify(0.15), Severity::Warning);
        assert_eq!(d.classify(0.11), Severity::Warning);
        assert_eq!(d.classify(0.10), Severity::Normal);
    }

    #[test]
    fn test_autocorrelations_serialize_with_string_keys() {
        let samples = fixtures::series("M", 300, |_| 400.0, |i| 10.0 + (i % 7) as f64 * 0.1, |_| 0.9);
        let result = detector().analyze(&TelemetrySeries::new("M", samples));
        let json = serde_json::to_value(&result).unwrap();
        assert!(json["autocorrelations"]["100"].is_number());
        assert!(json["coefficient_of_variation"].is_number());
    }
}
