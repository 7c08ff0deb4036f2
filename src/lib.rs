//! machine-health -- Electrical health diagnostics for shop-floor machine telemetry.
//!
//! This crate provides the analysis pipeline: five independent detectors
//! (voltage anomalies, degradation trend, harmonics, phase imbalance and
//! peak-load correlation) and the aggregator that folds their results into a
//! single JSON health report.

pub mod analysis;
pub mod config;
pub mod detect;
pub mod telemetry;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Load a telemetry CSV, run every detector and return the aggregated report.
pub async fn analyze_file(
    data_file: &Path,
    config: &config::AnalysisConfig,
) -> Result<analysis::AnalysisReport> {
    tracing::info!(path = %data_file.display(), "Loading telemetry");
    let store = telemetry::ingest::load_csv(data_file, &config.ingest)
        .with_context(|| format!("failed to load telemetry from {}", data_file.display()))?;
    tracing::info!(records = store.len(), machines = store.machine_count(), "Telemetry loaded");

    let aggregator = analysis::ReportAggregator::new(config.clone());
    let report = aggregator.run(Arc::new(store)).await?;
    Ok(report)
}
