//! Cross-machine load correlation and peak-load optimisation potential.
//!
//! Machines whose power draw rises and falls together stack up into the
//! site's peak. The more correlated the fleet, the more there is to gain from
//! staggering loads.

use crate::config::PeakLoadConfig;
use crate::detect::finite_or_zero;
use crate::detect::stats::pearson;
use crate::telemetry::TelemetryStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptimizationPotential {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for OptimizationPotential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizationPotential::Low => write!(f, "LOW"),
            OptimizationPotential::Medium => write!(f, "MEDIUM"),
            OptimizationPotential::High => write!(f, "HIGH"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakLoadResult {
    pub peak_load_kw: f64,
    pub average_load_kw: f64,
    #[serde(rename = "peak_average_ratio")]
    pub peak_to_average_ratio: f64,
    pub average_correlation: f64,
    #[serde(rename = "highly_correlated_pairs")]
    pub highly_correlated_pair_count: usize,
    #[serde(rename = "optimization_potential")]
    pub potential: OptimizationPotential,
}

/// Pairwise Pearson correlation of per-machine power curves. `NaN` marks a
/// pair without enough shared, non-constant data.
#[derive(Debug, Clone)]
pub struct CorrelationMatrix {
    pub machines: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    /// Strict upper-triangle entries with their machine indices.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let n = self.machines.len();
        (0..n).flat_map(move |i| (i + 1..n).map(move |j| (i, j, self.values[i][j])))
    }
}

/// System-wide load: total power per timestamp across all machines.
pub fn total_load_curve(store: &TelemetryStore) -> BTreeMap<DateTime<Utc>, f64> {
    let mut totals: BTreeMap<DateTime<Utc>, f64> = BTreeMap::new();
    for series in store.all_series().values() {
        for s in series.samples() {
            *totals.entry(s.timestamp).or_insert(0.0) += s.power;
        }
    }
    totals
}

/// Machine x timestamp matrix of mean power, `None` where a machine has no
/// sample at that timestamp.
fn power_matrix(store: &TelemetryStore) -> (Vec<String>, Vec<Vec<Option<f64>>>) {
    let timestamps: Vec<DateTime<Utc>> = total_load_curve(store).into_keys().collect();
    let column: BTreeMap<DateTime<Utc>, usize> =
        timestamps.iter().enumerate().map(|(i, ts)| (*ts, i)).collect();

    let mut machines = Vec::with_capacity(store.machine_count());
    let mut rows = Vec::with_capacity(store.machine_count());
    for (id, series) in store.all_series() {
        let mut sums = vec![(0.0, 0usize); timestamps.len()];
        for s in series.samples() {
            let cell = &mut sums[column[&s.timestamp]];
            cell.0 += s.power;
            cell.1 += 1;
        }
        machines.push(id.clone());
        rows.push(
            sums.into_iter()
                .map(|(sum, count)| (count > 0).then(|| sum / count as f64))
                .collect(),
        );
    }
    (machines, rows)
}

/// Pearson correlation between every pair of machines over the timestamps
/// both have data for.
pub fn correlation_matrix(store: &TelemetryStore) -> CorrelationMatrix {
    let (machines, rows) = power_matrix(store);
    let n = machines.len();
    let mut values = vec![vec![f64::NAN; n]; n];

    for i in 0..n {
        for j in i..n {
            let (xs, ys): (Vec<f64>, Vec<f64>) = rows[i]
                .iter()
                .zip(&rows[j])
                .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
                .unzip();
            let r = pearson(&xs, &ys);
            values[i][j] = r;
            values[j][i] = r;
        }
    }

    CorrelationMatrix { machines, values }
}

pub struct PeakLoadCorrelationAnalyzer {
    config: PeakLoadConfig,
}

impl PeakLoadCorrelationAnalyzer {
    pub fn new(config: PeakLoadConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, average_correlation: f64) -> OptimizationPotential {
        if average_correlation < self.config.medium_correlation {
            OptimizationPotential::Low
        } else if average_correlation < self.config.high_correlation {
            OptimizationPotential::Medium
        } else {
            OptimizationPotential::High
        }
    }

    pub fn analyze(&self, store: &TelemetryStore) -> PeakLoadResult {
        info!(machines = store.machine_count(), "Analyzing peak load optimization");

        let load = total_load_curve(store);
        let peak_load_kw = load.values().cloned().fold(f64::NEG_INFINITY, f64::max);
        let peak_load_kw = if load.is_empty() { 0.0 } else { finite_or_zero(peak_load_kw) };
        let average_load_kw = if load.is_empty() {
            0.0
        } else {
            finite_or_zero(load.values().sum::<f64>() / load.len() as f64)
        };
        let peak_to_average_ratio = if average_load_kw == 0.0 {
            0.0
        } else {
            finite_or_zero(peak_load_kw / average_load_kw)
        };

        let matrix = correlation_matrix(store);
        let defined: Vec<f64> = matrix.pairs().map(|(_, _, r)| r).filter(|r| r.is_finite()).collect();
        let highly_correlated_pair_count = defined
            .iter()
            .filter(|r| r.abs() > self.config.pair_threshold)
            .count();
        let average_correlation = if defined.is_empty() {
            0.0
        } else {
            defined.iter().sum::<f64>() / defined.len() as f64
        };
        debug!(
            pairs = defined.len(),
            undefined = matrix.pairs().count() - defined.len(),
            "correlation matrix computed"
        );

        let potential = self.classify(average_correlation);
        info!(
            peak_kw = %format_args!("{:.2}", peak_load_kw),
            avg_corr = %format_args!("{:.3}", average_correlation),
            %potential,
            "Peak load optimization"
        );

        PeakLoadResult {
            peak_load_kw,
            average_load_kw,
            peak_to_average_ratio,
            average_correlation,
            highly_correlated_pair_count,
            potential,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::fixtures;

    fn analyzer() -> PeakLoadCorrelationAnalyzer {
        PeakLoadCorrelationAnalyzer::new(PeakLoadConfig::default())
    }

    fn wave(i: usize) -> f64 {
        10.0 + 3.0 * (i as f64 * 0.05).sin()
    }

    #[test]
    fn test_identical_curves_are_fully_correlated() {
        let mut samples = fixtures::series("A", 500, |_| 400.0, wave, |_| 0.9);
        samples.extend(fixtures::series("B", 500, |_| 400.0, wave, |_| 0.9));
        let result = analyzer().analyze(&TelemetryStore::from_samples(samples));

        assert!((result.average_correlation - 1.0).abs() < 1e-9);
        assert_eq!(result.highly_correlated_pair_count, 1);
        assert_eq!(result.potential, OptimizationPotential::High);
        assert!(result.peak_to_average_ratio > 1.0);
    }

    #[test]
    fn test_orthogonal_curves_are_uncorrelated() {
        // sin and cos over whole periods have zero covariance.
        let n = 1000;
        let step = 2.0 * std::f64::consts::PI * 5.0 / n as f64;
        let mut samples = fixtures::series("A", n, |_| 400.0, |i| 10.0 + (i as f64 * step).sin(), |_| 0.9);
        samples.extend(fixtures::series("B", n, |_| 400.0, |i| 10.0 + (i as f64 * step).cos(), |_| 0.9));
        let result = analyzer().analyze(&TelemetryStore::from_samples(samples));

        assert!(result.average_correlation.abs() < 1e-6);
        assert_eq!(result.highly_correlated_pair_count, 0);
        assert_eq!(result.potential, OptimizationPotential::Low);
    }

    #[test]
    fn test_load_curve_sums_machines_per_timestamp() {
        let mut samples = fixtures::series("A", 3, |_| 1000.0, |i| [1.0, 2.0, 3.0][i], |_| 1.0);
        samples.extend(fixtures::series("B", 2, |_| 1000.0, |_| 4.0, |_| 1.0));
        let store = TelemetryStore::from_samples(samples);

        let curve: Vec<f64> = total_load_curve(&store).into_values().collect();
        assert_eq!(curve, vec![5.0, 6.0, 3.0]);

        let result = analyzer().analyze(&store);
        assert_eq!(result.peak_load_kw, 6.0);
        assert!((result.average_load_kw - 14.0 / 3.0).abs() < 1e-12);
        assert!((result.peak_to_average_ratio - 6.0 / (14.0 / 3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_duplicate_timestamps_are_averaged() {
        let mut samples = fixtures::series("A", 4, |_| 1000.0, |i| i as f64, |_| 1.0);
        let dup = samples[1].clone();
        samples.insert(2, crate::telemetry::TelemetrySample { power: 3.0, ..dup });
        samples.extend(fixtures::series("B", 4, |_| 1000.0, |i| [0.0, 2.0, 2.0, 3.0][i], |_| 1.0));
        let matrix = correlation_matrix(&TelemetryStore::from_samples(samples));
        // A at t1 averages (1 + 3) / 2 = 2, matching B exactly.
        assert!((matrix.values[0][1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_machine_and_empty_store() {
        let samples = fixtures::series("A", 100, |_| 400.0, wave, |_| 0.9);
        let result = analyzer().analyze(&TelemetryStore::from_samples(samples));
        assert_eq!(result.average_correlation, 0.0);
        assert_eq!(result.highly_correlated_pair_count, 0);

        let result = analyzer().analyze(&TelemetryStore::default());
        assert_eq!(result.peak_load_kw, 0.0);
        assert_eq!(result.peak_to_average_ratio, 0.0);
        assert_eq!(result.potential, OptimizationPotential::Low);
    }

    #[test]
    fn test_potential_thresholds() {
        let a = analyzer();
        assert_eq!(a.classify(0.29), OptimizationPotential::Low);
        assert_eq!(a.classify(0.3), OptimizationPotential::Medium);
        assert_eq!(a.classify(0.59), OptimizationPotential::Medium);
        assert_eq!(a.classify(0.6), OptimizationPotential::High);
    }
}
