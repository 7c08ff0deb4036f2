//! Runs the detectors and folds their results into the health report.

use crate::analysis::correlation::{PeakLoadCorrelationAnalyzer, PeakLoadResult};
use crate::analysis::degradation::{DegradationResult, DegradationTrendDetector};
use crate::analysis::harmonics::{HarmonicDetector, HarmonicResult};
use crate::analysis::imbalance::{PhaseImbalanceDetector, PhaseImbalanceResult};
use crate::analysis::voltage::{VoltageAnomalyDetector, VoltageAnomalyResult};
use crate::config::AnalysisConfig;
use crate::detect::{AnalysisError, Severity};
use crate::telemetry::{TelemetrySeries, TelemetryStore};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// The five analyses, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    VoltageAnomalies,
    Degradation,
    Harmonics,
    PhaseImbalance,
    PeakLoadOptimization,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 5] = [
        AnalysisKind::VoltageAnomalies,
        AnalysisKind::Degradation,
        AnalysisKind::Harmonics,
        AnalysisKind::PhaseImbalance,
        AnalysisKind::PeakLoadOptimization,
    ];

    /// Report key.
    pub fn key(&self) -> &'static str {
        match self {
            AnalysisKind::VoltageAnomalies => "voltage_anomalies",
            AnalysisKind::Degradation => "degradation",
            AnalysisKind::Harmonics => "harmonics",
            AnalysisKind::PhaseImbalance => "phase_imbalance",
            AnalysisKind::PeakLoadOptimization => "peak_load_optimization",
        }
    }
}

impl std::fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Output of one detector run.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisResult {
    VoltageAnomalies(VoltageAnomalyResult),
    Degradation(DegradationResult),
    Harmonics(HarmonicResult),
    PhaseImbalance(PhaseImbalanceResult),
    PeakLoad(PeakLoadResult),
}

impl AnalysisResult {
    pub fn kind(&self) -> AnalysisKind {
        match self {
            AnalysisResult::VoltageAnomalies(_) => AnalysisKind::VoltageAnomalies,
            AnalysisResult::Degradation(_) => AnalysisKind::Degradation,
            AnalysisResult::Harmonics(_) => AnalysisKind::Harmonics,
            AnalysisResult::PhaseImbalance(_) => AnalysisKind::PhaseImbalance,
            AnalysisResult::PeakLoad(_) => AnalysisKind::PeakLoadOptimization,
        }
    }

    /// Severity for the analyses that classify one. Voltage anomalies report
    /// a rate and peak load reports an optimisation potential instead.
    pub fn severity(&self) -> Option<Severity> {
        match self {
            AnalysisResult::Degradation(r) => Some(r.severity),
            AnalysisResult::Harmonics(r) => Some(r.severity),
            AnalysisResult::PhaseImbalance(r) => Some(r.severity),
            AnalysisResult::VoltageAnomalies(_) | AnalysisResult::PeakLoad(_) => None,
        }
    }

    pub fn machine_id(&self) -> Option<&str> {
        match self {
            AnalysisResult::VoltageAnomalies(r) => Some(&r.machine_id),
            AnalysisResult::Degradation(r) => Some(&r.machine_id),
            AnalysisResult::Harmonics(r) => Some(&r.machine_id),
            AnalysisResult::PhaseImbalance(r) => Some(&r.machine_id),
            AnalysisResult::PeakLoad(_) => None,
        }
    }
}

/// Severity counts over the results that carry one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeveritySummary {
    pub critical: usize,
    pub warning: usize,
    pub normal: usize,
}

impl SeveritySummary {
    pub fn from_severities(severities: impl IntoIterator<Item = Severity>) -> Self {
        let mut summary = Self::default();
        for s in severities {
            match s {
                Severity::Critical => summary.critical += 1,
                Severity::Warning => summary.warning += 1,
                Severity::Normal => summary.normal += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.critical + self.warning + self.normal
    }

    /// `round((normal * 100 + warning * 50) / classified)`, 100 when nothing
    /// was classified.
    pub fn health_score(&self) -> u8 {
        let total = self.total();
        if total == 0 {
            return 100;
        }
        let score = (self.normal as f64 * 100.0 + self.warning as f64 * 50.0) / total as f64;
        score.round().clamp(0.0, 100.0) as u8
    }
}

/// The persisted health report: one entry per completed analysis plus the
/// derived health score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltage_anomalies: Option<VoltageAnomalyResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degradation: Option<DegradationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub harmonics: Option<HarmonicResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_imbalance: Option<PhaseImbalanceResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_load_optimization: Option<PeakLoadResult>,
    /// Selected machines that have no telemetry. Their results are neutral
    /// placeholders and do not count toward the summary.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_machines: Vec<String>,
    pub summary: SeveritySummary,
    pub health_score: u8,
}

impl AnalysisReport {
    pub fn from_results(results: impl IntoIterator<Item = AnalysisResult>) -> Self {
        let mut report = Self::default();
        for result in results {
            report.insert(result);
        }
        report.refresh_score();
        report
    }

    fn insert(&mut self, result: AnalysisResult) {
        match result {
            AnalysisResult::VoltageAnomalies(r) => self.voltage_anomalies = Some(r),
            AnalysisResult::Degradation(r) => self.degradation = Some(r),
            AnalysisResult::Harmonics(r) => self.harmonics = Some(r),
            AnalysisResult::PhaseImbalance(r) => self.phase_imbalance = Some(r),
            AnalysisResult::PeakLoad(r) => self.peak_load_optimization = Some(r),
        }
    }

    /// Record machines that were selected but absent from the data, and
    /// drop their results from the summary.
    pub fn with_missing_machines(mut self, machines: impl IntoIterator<Item = String>) -> Self {
        self.missing_machines.extend(machines);
        self.missing_machines.sort();
        self.missing_machines.dedup();
        self.refresh_score();
        self
    }

    fn refresh_score(&mut self) {
        let missing = &self.missing_machines;
        self.summary = SeveritySummary::from_severities(
            self.results()
                .iter()
                .filter(|r| r.machine_id().map_or(true, |id| !missing.iter().any(|m| m == id)))
                .filter_map(|r| r.severity()),
        );
        self.health_score = self.summary.health_score();
    }

    /// Completed results in report order.
    pub fn results(&self) -> Vec<AnalysisResult> {
        let mut out = Vec::with_capacity(AnalysisKind::ALL.len());
        if let Some(r) = &self.voltage_anomalies {
            out.push(AnalysisResult::VoltageAnomalies(r.clone()));
        }
        if let Some(r) = &self.degradation {
            out.push(AnalysisResult::Degradation(r.clone()));
        }
        if let Some(r) = &self.harmonics {
            out.push(AnalysisResult::Harmonics(r.clone()));
        }
        if let Some(r) = &self.phase_imbalance {
            out.push(AnalysisResult::PhaseImbalance(r.clone()));
        }
        if let Some(r) = &self.peak_load_optimization {
            out.push(AnalysisResult::PeakLoad(r.clone()));
        }
        out
    }

    pub fn get(&self, kind: AnalysisKind) -> Option<AnalysisResult> {
        self.results().into_iter().find(|r| r.kind() == kind)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize analysis report")
    }

    /// Write the report as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json_pretty()?;
        std::fs::write(path, json).with_context(|| format!("failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "Results saved");
        Ok(())
    }
}

/// Look up a machine, falling back to an empty series so a missing machine
/// yields a neutral result instead of aborting the run.
fn machine_series<'a>(store: &'a TelemetryStore, machine_id: &str) -> Cow<'a, TelemetrySeries> {
    match store.series_for(machine_id) {
        Ok(series) => Cow::Borrowed(series),
        Err(e @ AnalysisError::NotFound { .. }) => {
            warn!(error = %e, "Analysing missing machine as empty series");
            Cow::Owned(TelemetrySeries::empty(machine_id))
        }
        Err(e) => {
            warn!(error = %e, "Machine lookup failed, analysing as empty series");
            Cow::Owned(TelemetrySeries::empty(machine_id))
        }
    }
}

/// Run a single analysis against the store.
pub fn run_analysis(kind: AnalysisKind, store: &TelemetryStore, config: &AnalysisConfig) -> AnalysisResult {
    let machines = &config.machines;
    match kind {
        AnalysisKind::VoltageAnomalies => {
            let series = machine_series(store, &machines.voltage);
            AnalysisResult::VoltageAnomalies(VoltageAnomalyDetector::new(config.voltage.clone()).analyze(&series))
        }
        AnalysisKind::Degradation => {
            let series = machine_series(store, &machines.degradation);
            AnalysisResult::Degradation(DegradationTrendDetector::new(config.degradation.clone()).analyze(&series))
        }
        AnalysisKind::Harmonics => {
            let series = machine_series(store, &machines.harmonics);
            AnalysisResult::Harmonics(HarmonicDetector::new(config.harmonics.clone()).analyze(&series))
        }
        AnalysisKind::PhaseImbalance => {
            let series = machine_series(store, &machines.imbalance);
            AnalysisResult::PhaseImbalance(PhaseImbalanceDetector::new(config.imbalance.clone()).analyze(&series))
        }
        AnalysisKind::PeakLoadOptimization => {
            AnalysisResult::PeakLoad(PeakLoadCorrelationAnalyzer::new(config.peak_load.clone()).analyze(store))
        }
    }
}

/// Signature of a single analysis run; [`run_analysis`] unless replaced.
pub type AnalysisFn = fn(AnalysisKind, &TelemetryStore, &AnalysisConfig) -> AnalysisResult;

/// Runs every detector and folds the results into one report.
pub struct ReportAggregator {
    config: AnalysisConfig,
    analysis: AnalysisFn,
}

impl ReportAggregator {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            analysis: run_analysis,
        }
    }

    /// Replace the per-kind analysis function.
    pub fn with_analysis(mut self, analysis: AnalysisFn) -> Self {
        self.analysis = analysis;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run the five detectors concurrently, one blocking task each. A
    /// detector that panics is logged and left out of the report.
    pub async fn run(&self, store: Arc<TelemetryStore>) -> Result<AnalysisReport> {
        if store.is_empty() {
            return Err(AnalysisError::EmptyDataset.into());
        }

        let handles: Vec<_> = AnalysisKind::ALL
            .iter()
            .map(|&kind| {
                let store = Arc::clone(&store);
                let config = self.config.clone();
                let analysis = self.analysis;
                (kind, tokio::task::spawn_blocking(move || analysis(kind, &store, &config)))
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (kind, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => warn!(%kind, error = %e, "Analysis task failed; omitted from report"),
            }
        }

        Ok(self.finish(&store, results))
    }

    /// Same analyses, one after another on the calling thread.
    pub fn run_blocking(&self, store: &TelemetryStore) -> Result<AnalysisReport> {
        if store.is_empty() {
            return Err(AnalysisError::EmptyDataset.into());
        }

        let mut results = Vec::with_capacity(AnalysisKind::ALL.len());
        for kind in AnalysisKind::ALL {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                (self.analysis)(kind, store, &self.config)
            }));
            match outcome {
                Ok(result) => results.push(result),
                Err(_) => warn!(%kind, "Analysis panicked; omitted from report"),
            }
        }

        Ok(self.finish(store, results))
    }

    fn finish(&self, store: &TelemetryStore, results: Vec<AnalysisResult>) -> AnalysisReport {
        let missing: Vec<String> = results
            .iter()
            .filter_map(|r| r.machine_id())
            .filter(|id| store.series_for(id).is_err())
            .map(str::to_string)
            .collect();
        let report = AnalysisReport::from_results(results).with_missing_machines(missing);
        if !report.missing_machines.is_empty() {
            warn!(machines = ?report.missing_machines, "Selected machines have no telemetry");
        }
        info!(
            critical = report.summary.critical,
            warnings = report.summary.warning,
            health_score = report.health_score,
            "Analysis complete"
        );
        report
    }
}
