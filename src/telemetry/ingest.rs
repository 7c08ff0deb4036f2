//! CSV ingestion for telemetry tables.
//!
//! Columns are located by header name (`timestamp`, `machineId`, `voltage`,
//! `current`, `power`, `powerFactor`); any other column is ignored. Very large
//! files are downsampled with a seeded RNG so repeated runs see the same rows.

use super::{TelemetrySample, TelemetryStore};
use crate::config::IngestConfig;
use crate::detect::AnalysisError;
use chrono::{DateTime, NaiveDateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

const REQUIRED_COLUMNS: [&str; 6] = ["timestamp", "machineId", "voltage", "current", "power", "powerFactor"];

/// Malformed rows logged individually before switching to a summary.
const MAX_ROW_WARNINGS: usize = 10;

/// Row downsampling applied while reading.
#[derive(Debug, Clone, Copy)]
pub struct Sampling {
    pub fraction: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, Copy)]
struct ColumnIndex {
    timestamp: usize,
    machine_id: usize,
    voltage: usize,
    current: usize,
    power: usize,
    power_factor: usize,
}

impl ColumnIndex {
    fn from_header(header: &str) -> Result<Self, AnalysisError> {
        let names: Vec<&str> = header.split(',').map(clean_field).collect();
        let find = |name: &str| {
            names.iter().position(|n| *n == name).ok_or_else(|| AnalysisError::MalformedRecord {
                line: 1,
                reason: format!("missing required column '{}'", name),
            })
        };
        Ok(Self {
            timestamp: find(REQUIRED_COLUMNS[0])?,
            machine_id: find(REQUIRED_COLUMNS[1])?,
            voltage: find(REQUIRED_COLUMNS[2])?,
            current: find(REQUIRED_COLUMNS[3])?,
            power: find(REQUIRED_COLUMNS[4])?,
            power_factor: find(REQUIRED_COLUMNS[5])?,
        })
    }
}

fn clean_field(raw: &str) -> &str {
    raw.trim().trim_matches('"')
}

/// Parse a timestamp as RFC 3339, or as a naive `YYYY-MM-DD HH:MM:SS[.fff]`
/// (space or `T` separated) taken to be UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn parse_row(fields: &[&str], cols: ColumnIndex, line: usize) -> Result<TelemetrySample, AnalysisError> {
    let field = |idx: usize, name: &str| {
        fields.get(idx).copied().filter(|f| !f.is_empty()).ok_or_else(|| AnalysisError::MalformedRecord {
            line,
            reason: format!("missing {}", name),
        })
    };
    let number = |idx: usize, name: &str| -> Result<f64, AnalysisError> {
        let raw = field(idx, name)?;
        // `parse` accepts "NaN" and "inf"; neither is a reading.
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| AnalysisError::MalformedRecord {
                line,
                reason: format!("{} is not a finite number: '{}'", name, raw),
            })
    };

    let raw_ts = field(cols.timestamp, "timestamp")?;
    let timestamp = parse_timestamp(raw_ts).ok_or_else(|| AnalysisError::MalformedRecord {
        line,
        reason: format!("unparseable timestamp '{}'", raw_ts),
    })?;

    Ok(TelemetrySample {
        machine_id: field(cols.machine_id, "machineId")?.to_string(),
        timestamp,
        voltage: number(cols.voltage, "voltage")?,
        current: number(cols.current, "current")?,
        power: number(cols.power, "power")?,
        power_factor: number(cols.power_factor, "powerFactor")?,
    })
}

/// Read telemetry rows from CSV text. Malformed rows are skipped and logged;
/// a missing header or required column is an error.
pub fn read_samples<R: BufRead>(reader: R, sampling: Option<Sampling>) -> Result<Vec<TelemetrySample>, AnalysisError> {
    let mut lines = reader.lines();
    let header = match lines.next() {
        Some(h) => h?,
        None => return Ok(Vec::new()),
    };
    let cols = ColumnIndex::from_header(&header)?;

    let mut rng = sampling.map(|s| (StdRng::seed_from_u64(s.seed), s.fraction));
    let mut samples = Vec::new();
    let mut skipped = 0usize;

    for (i, line) in lines.enumerate() {
        let line_no = i + 2;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Some((rng, fraction)) = rng.as_mut() {
            if !rng.gen_bool(*fraction) {
                continue;
            }
        }

        let fields: Vec<&str> = line.split(',').map(clean_field).collect();
        match parse_row(&fields, cols, line_no) {
            Ok(sample) => samples.push(sample),
            Err(e) => {
                skipped += 1;
                if skipped <= MAX_ROW_WARNINGS {
                    warn!(error = %e, "Skipping malformed telemetry row");
                }
            }
        }
    }

    if skipped > 0 {
        warn!(skipped, "Malformed telemetry rows were skipped");
    }
    Ok(samples)
}

fn count_data_rows(path: &Path) -> Result<usize, AnalysisError> {
    let reader = BufReader::new(File::open(path)?);
    let mut count = 0usize;
    for line in reader.lines() {
        if !line?.trim().is_empty() {
            count += 1;
        }
    }
    Ok(count.saturating_sub(1))
}

/// Load a telemetry CSV into a store, sorted by timestamp.
pub fn load_csv(path: &Path, config: &IngestConfig) -> Result<TelemetryStore, AnalysisError> {
    let rows = count_data_rows(path)?;
    let sampling = if rows > config.sample_above_rows {
        warn!(
            rows,
            fraction = config.sample_fraction,
            "Large dataset, sampling rows"
        );
        Some(Sampling {
            fraction: config.sample_fraction,
            seed: config.seed,
        })
    } else {
        None
    };

    let reader = BufReader::new(File::open(path)?);
    let mut samples = read_samples(reader, sampling)?;
    // Stable, so ties keep file order.
    samples.sort_by_key(|s| s.timestamp);
    info!(rows, loaded = samples.len(), "Telemetry rows read");

    Ok(TelemetryStore::from_samples(samples))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const CSV: &str = "machineId,machineType,timestamp,voltage,current,power,powerFactor\n\
Machine_01,Press,2024-01-01 00:00:01,400.5,10.2,3.67,0.9\n\
Machine_02,Lathe,2024-01-01 00:00:00,230.0,5.0,0.98,0.85\n\
Machine_01,Press,2024-01-01 00:00:00,401.0,10.0,3.61,0.9\n";

    #[test]
    fn test_reads_by_header_name() {
        let samples = read_samples(Cursor::new(CSV), None).unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].machine_id, "Machine_01");
        assert_eq!(samples[0].voltage, 400.5);
        assert_eq!(samples[1].power_factor, 0.85);
    }

    #[test]
    fn test_skips_malformed_rows() {
        let csv = format!("{}Machine_01,Press,2024-01-01 00:00:02,abc,10.0,3.6,0.9\nMachine_01,Press,not-a-time,400,10,3.6,0.9\n", CSV);
        let samples = read_samples(Cursor::new(csv), None).unwrap();
        assert_eq!(samples.len(), 3);
    }

    #[test]
    fn test_skips_non_finite_readings() {
        let csv = format!(
            "{}Machine_01,Press,2024-01-01 00:00:02,NaN,10.0,3.6,0.9\n\
Machine_01,Press,2024-01-01 00:00:03,inf,10.0,3.6,0.9\n\
Machine_01,Press,2024-01-01 00:00:04,400.0,-inf,3.6,0.9\n",
            CSV
        );
        let samples = read_samples(Cursor::new(csv), None).unwrap();
        assert_eq!(samples.len(), 3);
        assert!(samples.iter().all(|s| s.voltage.is_finite() && s.current.is_finite()));

        let fields = ["Machine_01", "Press", "2024-01-01 00:00:02", "NaN", "10.0", "3.6", "0.9"];
        let cols = ColumnIndex::from_header("machineId,machineType,timestamp,voltage,current,power,powerFactor").unwrap();
        let err = parse_row(&fields, cols, 5).unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedRecord { line: 5, .. }));
    }

    #[test]
    fn test_missing_column_is_error() {
        let err = read_samples(Cursor::new("timestamp,machineId,voltage\n"), None).unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedRecord { line: 1, .. }));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let a = parse_timestamp("2024-01-01 00:00:05").unwrap();
        let b = parse_timestamp("2024-01-01T00:00:05Z").unwrap();
        let c = parse_timestamp("2024-01-01 00:00:05.250").unwrap();
        assert_eq!(a, b);
        assert_eq!((c - a).num_milliseconds(), 250);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_sampling_is_seeded() {
        let mut csv = String::from("timestamp,machineId,voltage,current,power,powerFactor\n");
        for i in 0..1000 {
            csv.push_str(&format!("2024-01-01 00:{:02}:{:02},M,400,10,3.6,0.9\n", i / 60 % 60, i % 60));
        }
        let s = Some(Sampling { fraction: 0.1, seed: 42 });
        let a = read_samples(Cursor::new(csv.clone()), s).unwrap();
        let b = read_samples(Cursor::new(csv), s).unwrap();
        assert_eq!(a, b);
        assert!(a.len() > 50 && a.len() < 150);
    }

    #[test]
    fn test_load_csv_sorts_by_timestamp() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, CSV.as_bytes()).unwrap();
        let store = load_csv(file.path(), &IngestConfig::default()).unwrap();
        assert_eq!(store.len(), 3);
        let m1 = store.series_for("Machine_01").unwrap();
        assert_eq!(m1.voltages(), vec![401.0, 400.5]);
    }
}
