//! The five detectors and the aggregator that turns their output into a
//! health report.
//!
//! Every detector only reads from the telemetry store, so they can run in
//! any order or all at once.

pub mod aggregator;
pub mod correlation;
pub mod degradation;
pub mod harmonics;
pub mod imbalance;
pub mod voltage;

pub use aggregator::{AnalysisKind, AnalysisReport, AnalysisResult, ReportAggregator, SeveritySummary};
pub use correlation::{OptimizationPotential, PeakLoadCorrelationAnalyzer, PeakLoadResult};
pub use degradation::{DegradationResult, DegradationTrendDetector};
pub use harmonics::{HarmonicDetector, HarmonicResult};
pub use imbalance::{PhaseImbalanceDetector, PhaseImbalanceResult};
pub use voltage::{VoltageAnomaly, VoltageAnomalyDetector, VoltageAnomalyResult};
