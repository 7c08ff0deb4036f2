//! TOML configuration for the analysis pipeline.
//!
//! Every section has compiled-in defaults equal to the thresholds the
//! detectors were calibrated with, so an empty file (or no file at all) gives
//! the standard analysis. The config file path can be overridden with the
//! `MACHINE_HEALTH_CONFIG` environment variable.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Environment variable naming a config file to load.
pub const CONFIG_ENV: &str = "MACHINE_HEALTH_CONFIG";

/// Config file picked up from the working directory when present.
pub const LOCAL_CONFIG: &str = "machine-health.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub machines: MachineSelection,
    #[serde(default)]
    pub voltage: VoltageConfig,
    #[serde(default)]
    pub degradation: DegradationConfig,
    #[serde(default)]
    pub harmonics: HarmonicsConfig,
    #[serde(default)]
    pub imbalance: ImbalanceConfig,
    #[serde(default)]
    pub peak_load: PeakLoadConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

impl AnalysisConfig {
    /// Load and validate configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded analysis configuration");
        Ok(config)
    }

    /// Try to load configuration from, in order:
    /// 1. The path in `MACHINE_HEALTH_CONFIG`.
    /// 2. `./machine-health.toml`.
    /// 3. Compiled-in defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "MACHINE_HEALTH_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new(LOCAL_CONFIG);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %local.display(),
                        error = %e,
                        "local config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    /// Reject values the detectors cannot work with.
    pub fn validate(&self) -> Result<()> {
        let c = self.voltage.contamination;
        if !(c > 0.0 && c <= 0.5) {
            anyhow::bail!("voltage.contamination must be in (0, 0.5], got {}", c);
        }
        if self.voltage.rolling_window == 0 {
            anyhow::bail!("voltage.rolling_window must be at least 1");
        }
        if self.voltage.trees == 0 {
            anyhow::bail!("voltage.trees must be at least 1");
        }
        if self.degradation.window_size == 0 || self.degradation.slice_len == 0 {
            anyhow::bail!("degradation.window_size and degradation.slice_len must be at least 1");
        }
        if self.harmonics.sample_size == 0 {
            anyhow::bail!("harmonics.sample_size must be at least 1");
        }
        let f = self.ingest.sample_fraction;
        if !(f > 0.0 && f <= 1.0) {
            anyhow::bail!("ingest.sample_fraction must be in (0, 1], got {}", f);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Machine selection
// ---------------------------------------------------------------------------

/// Which machine each single-machine detector analyses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineSelection {
    pub voltage: String,
    pub degradation: String,
    pub harmonics: String,
    pub imbalance: String,
}

impl Default for MachineSelection {
    fn default() -> Self {
        Self {
            voltage: "Machine_05".to_string(),
            degradation: "Machine_12".to_string(),
            harmonics: "Machine_08".to_string(),
            imbalance: "Machine_15".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Detectors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoltageConfig {
    /// Expected fraction of anomalous samples.
    pub contamination: f64,
    /// Trailing window (samples) for rolling voltage mean/std.
    pub rolling_window: usize,
    /// Isolation trees in the ensemble.
    pub trees: usize,
    pub seed: u64,
    /// Anomalous samples listed in the report.
    pub max_reported: usize,
}

impl Default for VoltageConfig {
    fn default() -> Self {
        Self {
            contamination: 0.005,
            rolling_window: 10,
            trees: 100,
            seed: 42,
            max_reported: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradationConfig {
    /// Moving-average window (samples).
    pub window_size: usize,
    /// Samples averaged at the start and the end of the trend.
    pub slice_len: usize,
    pub critical_current_pct: f64,
    pub critical_pf_pct: f64,
    pub warning_current_pct: f64,
    pub warning_pf_pct: f64,
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            window_size: 1000,
            slice_len: 100,
            critical_current_pct: 10.0,
            critical_pf_pct: -5.0,
            warning_current_pct: 7.0,
            warning_pf_pct: -4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonicsConfig {
    /// Maximum evenly spaced current samples fed to the FFT.
    pub sample_size: usize,
    pub critical_thd_pct: f64,
    pub warning_thd_pct: f64,
}

impl Default for HarmonicsConfig {
    fn default() -> Self {
        Self {
            sample_size: 10_000,
            critical_thd_pct: 15.0,
            warning_thd_pct: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImbalanceConfig {
    /// Autocorrelation lags (samples).
    pub lags: Vec<usize>,
    pub critical_cv: f64,
    pub warning_cv: f64,
}

impl Default for ImbalanceConfig {
    fn default() -> Self {
        Self {
            lags: vec![100, 250, 500, 1000],
            critical_cv: 0.15,
            warning_cv: 0.10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakLoadConfig {
    /// `|r|` above which a machine pair counts as highly correlated.
    pub pair_threshold: f64,
    /// Average correlation at which potential becomes MEDIUM.
    pub medium_correlation: f64,
    /// Average correlation at which potential becomes HIGH.
    pub high_correlation: f64,
}

impl Default for PeakLoadConfig {
    fn default() -> Self {
        Self {
            pair_threshold: 0.5,
            medium_correlation: 0.3,
            high_correlation: 0.6,
        }
    }
}

// ---------------------------------------------------------------------------
// Ingest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Datasets with more data rows than this are downsampled.
    pub sample_above_rows: usize,
    /// Fraction of rows kept when downsampling.
    pub sample_fraction: f64,
    pub seed: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            sample_above_rows: 5_000_000,
            sample_fraction: 0.1,
            seed: 42,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AnalysisConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.voltage.contamination, 0.005);
        assert_eq!(cfg.degradation.window_size, 1000);
        assert_eq!(cfg.harmonics.sample_size, 10_000);
        assert_eq!(cfg.imbalance.lags, vec![100, 250, 500, 1000]);
        assert_eq!(cfg.machines.harmonics, "Machine_08");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg: AnalysisConfig = toml::from_str(
            r#"
            [machines]
            voltage = "Press_01"

            [harmonics]
            critical_thd_pct = 20.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.machines.voltage, "Press_01");
        assert_eq!(cfg.machines.degradation, "Machine_12");
        assert_eq!(cfg.harmonics.critical_thd_pct, 20.0);
        assert_eq!(cfg.harmonics.warning_thd_pct, 10.0);
        assert_eq!(cfg.voltage, VoltageConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machine-health.toml");
        std::fs::write(&path, "[voltage]\ncontamination = 0.01\nseed = 7\n").unwrap();
        let cfg = AnalysisConfig::load(&path).unwrap();
        assert_eq!(cfg.voltage.contamination, 0.01);
        assert_eq!(cfg.voltage.seed, 7);
        assert_eq!(cfg.voltage.trees, 100);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = AnalysisConfig::default();
        cfg.voltage.contamination = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = AnalysisConfig::default();
        cfg.ingest.sample_fraction = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = AnalysisConfig::default();
        cfg.degradation.window_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_config_roundtrips_through_toml() {
        let cfg = AnalysisConfig::default();
        let text = toml::to_string(&cfg).unwrap();
        let back: AnalysisConfig = toml::from_str(&text).unwrap();
        assert_eq!(cfg, back);
    }
}
