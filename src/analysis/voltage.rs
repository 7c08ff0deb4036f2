//! Voltage anomaly detection.
//!
//! Per sample we derive `[voltage, |voltage - rolling mean|, rolling std,
//! current / voltage]` and let a seeded isolation forest flag the expected
//! contamination fraction of the machine's samples.

use crate::config::VoltageConfig;
use crate::detect::forest::{self, ForestParams};
use crate::detect::finite_or_zero;
use crate::detect::rolling::rolling_mean_std;
use crate::telemetry::TelemetrySeries;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One flagged sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoltageAnomaly {
    pub timestamp: DateTime<Utc>,
    pub voltage: f64,
    pub current: f64,
    pub anomaly_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoltageAnomalyResult {
    pub machine_id: String,
    pub total_anomalies: usize,
    /// Flagged share of the series, in percent.
    #[serde(rename = "anomaly_rate")]
    pub anomaly_rate_percent: f64,
    /// First flagged samples in series order.
    #[serde(rename = "anomalies")]
    pub sample_anomalies: Vec<VoltageAnomaly>,
}

pub struct VoltageAnomalyDetector {
    config: VoltageConfig,
}

impl VoltageAnomalyDetector {
    pub fn new(config: VoltageConfig) -> Self {
        Self { config }
    }

    /// Feature vector per sample, in series order.
    pub fn features(&self, series: &TelemetrySeries) -> Vec<[f64; 4]> {
        let voltages = series.voltages();
        let rolling = rolling_mean_std(&voltages, self.config.rolling_window);

        series
            .samples()
            .iter()
            .zip(rolling)
            .map(|(s, (mean, std))| {
                let ratio = if s.voltage == 0.0 { 0.0 } else { s.current / s.voltage };
                [
                    finite_or_zero(s.voltage),
                    finite_or_zero((s.voltage - mean).abs()),
                    finite_or_zero(std),
                    finite_or_zero(ratio),
                ]
            })
            .collect()
    }

    pub fn analyze(&self, series: &TelemetrySeries) -> VoltageAnomalyResult {
        info!(machine = series.machine_id(), "Analyzing voltage anomalies");

        let features = self.features(series);
        let flags = forest::detect_outliers(
            &features,
            self.config.contamination,
            ForestParams {
                trees: self.config.trees,
                seed: self.config.seed,
            },
        );

        let flagged: Vec<usize> = flags
            .flagged
            .iter()
            .enumerate()
            .filter_map(|(i, &f)| f.then_some(i))
            .collect();
        let total_anomalies = flagged.len();
        let anomaly_rate_percent = if series.is_empty() {
            0.0
        } else {
            total_anomalies as f64 / series.len() as f64 * 100.0
        };

        let samples = series.samples();
        let sample_anomalies = flagged
            .iter()
            .take(self.config.max_reported)
            .map(|&i| VoltageAnomaly {
                timestamp: samples[i].timestamp,
                voltage: finite_or_zero(samples[i].voltage),
                current: finite_or_zero(samples[i].current),
                anomaly_score: finite_or_zero(flags.scores[i]),
            })
            .collect();

        info!(
            machine = series.machine_id(),
            total_anomalies,
            rate_pct = %format_args!("{:.3}", anomaly_rate_percent),
            "Voltage anomalies found"
        );

        VoltageAnomalyResult {
            machine_id: series.machine_id().to_string(),
            total_anomalies,
            anomaly_rate_percent,
            sample_anomalies,
        }
    }
}
