//! Telemetry samples and the immutable per-machine store the detectors read.

pub mod ingest;

use crate::detect::AnalysisError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One electrical reading from one machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySample {
    pub machine_id: String,
    pub timestamp: DateTime<Utc>,
    pub voltage: f64,
    pub current: f64,
    /// kW
    pub power: f64,
    pub power_factor: f64,
}

/// Time-ordered samples of a single machine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySeries {
    machine_id: String,
    samples: Vec<TelemetrySample>,
}

impl TelemetrySeries {
    pub fn new(machine_id: impl Into<String>, samples: Vec<TelemetrySample>) -> Self {
        Self {
            machine_id: machine_id.into(),
            samples,
        }
    }

    /// A series with no samples, analysed as neutral input.
    pub fn empty(machine_id: impl Into<String>) -> Self {
        Self::new(machine_id, Vec::new())
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    pub fn samples(&self) -> &[TelemetrySample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn voltages(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.voltage).collect()
    }

    pub fn currents(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.current).collect()
    }

    pub fn power_factors(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.power_factor).collect()
    }
}

/// All loaded telemetry, grouped by machine. Samples keep their load order,
/// which the ingestion side guarantees is sorted by timestamp; the store never
/// re-sorts and exposes no mutation after construction.
#[derive(Debug, Clone, Default)]
pub struct TelemetryStore {
    series: BTreeMap<String, TelemetrySeries>,
    total: usize,
}

impl TelemetryStore {
    pub fn from_samples(samples: Vec<TelemetrySample>) -> Self {
        let total = samples.len();
        let mut grouped: BTreeMap<String, Vec<TelemetrySample>> = BTreeMap::new();
        for sample in samples {
            grouped.entry(sample.machine_id.clone()).or_default().push(sample);
        }
        let series = grouped
            .into_iter()
            .map(|(id, samples)| (id.clone(), TelemetrySeries::new(id, samples)))
            .collect();
        Self { series, total }
    }

    /// Samples of one machine, or `NotFound` if it has none.
    pub fn series_for(&self, machine_id: &str) -> Result<&TelemetrySeries, AnalysisError> {
        self.series.get(machine_id).ok_or_else(|| AnalysisError::NotFound {
            machine_id: machine_id.to_string(),
        })
    }

    /// Every machine's series, keyed by machine id.
    pub fn all_series(&self) -> &BTreeMap<String, TelemetrySeries> {
        &self.series
    }

    pub fn machine_ids(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn machine_count(&self) -> usize {
        self.series.len()
    }

    /// Total number of samples across machines.
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::TelemetrySample;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    pub fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    /// Build one machine's samples at 1s spacing from per-index closures.
    pub fn series(
        machine_id: &str,
        n: usize,
        voltage: impl Fn(usize) -> f64,
        current: impl Fn(usize) -> f64,
        power_factor: impl Fn(usize) -> f64,
    ) -> Vec<TelemetrySample> {
        (0..n)
            .map(|i| {
                let (v, c, pf) = (voltage(i), current(i), power_factor(i));
                TelemetrySample {
                    machine_id: machine_id.to_string(),
                    timestamp: start() + Duration::seconds(i as i64),
                    voltage: v,
                    current: c,
                    power: v * c * pf / 1000.0,
                    power_factor: pf,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_by_machine_in_load_order() {
        let mut samples = fixtures::series("Machine_01", 3, |_| 400.0, |i| i as f64, |_| 0.9);
        samples.extend(fixtures::series("Machine_02", 2, |_| 230.0, |_| 5.0, |_| 0.8));
        let store = TelemetryStore::from_samples(samples);

        assert_eq!(store.len(), 5);
        assert_eq!(store.machine_count(), 2);
        let m1 = store.series_for("Machine_01").unwrap();
        assert_eq!(m1.machine_id(), "Machine_01");
        assert_eq!(m1.currents(), vec![0.0, 1.0, 2.0]);
        assert_eq!(store.machine_ids().collect::<Vec<_>>(), vec!["Machine_01", "Machine_02"]);
    }

    #[test]
    fn test_missing_machine_is_not_found() {
        let store = TelemetryStore::from_samples(Vec::new());
        assert!(store.is_empty());
        match store.series_for("Machine_99") {
            Err(AnalysisError::NotFound { machine_id }) => assert_eq!(machine_id, "Machine_99"),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }
}
