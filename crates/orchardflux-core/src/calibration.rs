// crates/orchardflux-core/src/calibration.rs

use std::fs;
use std::path::{Path, PathBuf};

use orchardflux_parser::sniff_delimiter;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("no {which} readings to average")]
    EmptyReadings { which: &'static str },

    #[error("wet and dry readings have the same mean ({mean}); the sensor cannot be calibrated")]
    Degenerate { mean: f64 },

    #[error("failed to read calibration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed calibration file {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("calibration file {path}: {message}")]
    Format { path: PathBuf, message: String },

    #[error("invalid calibration pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// Linear map from raw moisture readings to percent: `a * value + b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoistureCalibration {
    pub a: f64,
    pub b: f64,
}

impl MoistureCalibration {
    pub fn new(a: f64, b: f64) -> Self {
        Self { a, b }
    }

    /// Fits the line through (mean wet, 100) and (mean dry, 0).
    pub fn from_readings(wet: &[f64], dry: &[f64]) -> Result<Self, CalibrationError> {
        let wet_mean = mean(wet).ok_or(CalibrationError::EmptyReadings { which: "wet" })?;
        let dry_mean = mean(dry).ok_or(CalibrationError::EmptyReadings { which: "dry" })?;
        if wet_mean == dry_mean {
            return Err(CalibrationError::Degenerate { mean: wet_mean });
        }
        let a = 100.0 / (wet_mean - dry_mean);
        Ok(Self { a, b: -a * dry_mean })
    }

    /// Unclamped percentage for a raw reading.
    pub fn apply(&self, value: f64) -> f64 {
        self.a * value + self.b
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Reads a calibration file: one header row, then a row of wet readings,
/// then a row of dry readings.
pub fn calibration_from_file(path: &Path) -> Result<MoistureCalibration, CalibrationError> {
    let content = fs::read_to_string(path).map_err(|source| CalibrationError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let format_error = |message: String| CalibrationError::Format {
        path: path.to_path_buf(),
        message,
    };

    // Single-column files carry no delimiter to sniff.
    let delimiter = sniff_delimiter(&content).unwrap_or(b',');
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate().skip(1) {
        let record = record.map_err(|source| CalibrationError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let values = record
            .iter()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| {
                value.parse::<i64>().map(|reading| reading as f64).map_err(|_| {
                    format_error(format!("row {index}: '{value}' is not an integer reading"))
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;
        if !values.is_empty() {
            rows.push(values);
        }
    }

    match rows.as_slice() {
        [wet, dry, ..] => MoistureCalibration::from_readings(wet, dry),
        _ => Err(format_error(format!(
            "expected a wet row and a dry row after the header, found {} data rows",
            rows.len()
        ))),
    }
}

/// Finds `Calibration_TREWid{n}_{site}.csv` files in `dir`, sorted by id.
pub fn discover_calibration_files(
    dir: &Path,
    site: &str,
) -> Result<Vec<(u32, PathBuf)>, CalibrationError> {
    let pattern = Path::new(&glob::Pattern::escape(&dir.to_string_lossy()))
        .join(format!("Calibration_TREWid*_{}.csv", glob::Pattern::escape(site)));
    let prefix = "Calibration_TREWid";
    let suffix = format!("_{site}.csv");

    let mut found = Vec::new();
    for path in glob::glob(&pattern.to_string_lossy())?.flatten() {
        let id = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_prefix(prefix))
            .and_then(|rest| rest.strip_suffix(suffix.as_str()))
            .and_then(|id| id.parse::<u32>().ok());
        match id {
            Some(id) => found.push((id, path)),
            None => debug!(path = %path.display(), "ignoring calibration file without a numeric id"),
        }
    }
    found.sort_by_key(|(id, _)| *id);
    Ok(found)
}
