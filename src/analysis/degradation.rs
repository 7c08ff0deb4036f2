//! Load degradation: a worn machine draws more current at a lower power
//! factor. Both are smoothed with a trailing moving average, then compared
//! between the start and the end of the series.

use crate::config::DegradationConfig;
use crate::detect::rolling::rolling_mean;
use crate::detect::stats::{least_squares_slope, mean, percent_change};
use crate::detect::{finite_or_zero, Severity};
use crate::telemetry::TelemetrySeries;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationResult {
    pub machine_id: String,
    pub current_change_percent: f64,
    #[serde(rename = "power_factor_change_percent")]
    pub pf_change_percent: f64,
    pub severity: Severity,
    #[serde(rename = "current_trend_slope")]
    pub current_slope: f64,
    #[serde(rename = "pf_trend_slope")]
    pub pf_slope: f64,
}

/// Smoothed trend of one signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trend {
    pub slope: f64,
    pub change_percent: f64,
}

pub struct DegradationTrendDetector {
    config: DegradationConfig,
}

impl DegradationTrendDetector {
    pub fn new(config: DegradationConfig) -> Self {
        Self { config }
    }

    /// Slope of the moving average against sample index, and the percent
    /// change between the slice right after the first full window and the
    /// last slice. Short series use whatever is available.
    pub fn trend(&self, values: &[f64]) -> Trend {
        let window = self.config.window_size;
        let slice = self.config.slice_len;
        let ma = rolling_mean(values, window);
        let n = ma.len();

        let start = window.min(n);
        let end = (window + slice).min(n);
        let initial = if start < end {
            mean(&ma[start..end])
        } else {
            mean(&ma[..slice.min(n)])
        };
        let last = mean(&ma[n - slice.min(n)..]);

        Trend {
            slope: finite_or_zero(least_squares_slope(&ma)),
            change_percent: finite_or_zero(percent_change(initial, last)),
        }
    }

    pub fn classify(&self, current_change: f64, pf_change: f64) -> Severity {
        let c = &self.config;
        if current_change > c.critical_current_pct && pf_change < c.critical_pf_pct {
            Severity::Critical
        } else if current_change > c.warning_current_pct || pf_change < c.warning_pf_pct {
            Severity::Warning
        } else {
            Severity::Normal
        }
    }

    pub fn analyze(&self, series: &TelemetrySeries) -> DegradationResult {
        info!(machine = series.machine_id(), "Analyzing degradation");

        let current = self.trend(&series.currents());
        let pf = self.trend(&series.power_factors());
        let severity = self.classify(current.change_percent, pf.change_percent);

        info!(
            machine = series.machine_id(),
            current_change = %format_args!("{:+.2}%", current.change_percent),
            pf_change = %format_args!("{:+.2}%", pf.change_percent),
            %severity,
            "Degradation trend"
        );

        DegradationResult {
            machine_id: series.machine_id().to_string(),
            current_change_percent: current.change_percent,
            pf_change_percent: pf.change_percent,
            severity,
            current_slope: current.slope,
            pf_slope: pf.slope,
        }
    }
}
