// crates/orchardflux-core/src/error.rs

use std::path::PathBuf;

use orchardflux_parser::{SampleError, SourceError};
use thiserror::Error;

use crate::analyzer::AnalysisError;
use crate::collection::{CollectionError, SmoothingError};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown preset '{name}' (available: {})", available.join(", "))]
    UnknownPreset {
        name: String,
        available: Vec<String>,
    },

    #[error("sensor '{sensor}' requires a sensor id and none was given")]
    MissingSensorId { sensor: String },

    #[error("sensor id {id} is outside the valid range {min}-{max} for '{sensor}'")]
    SensorIdOutOfRange {
        sensor: String,
        id: u32,
        min: u32,
        max: u32,
    },

    #[error("invalid filename template '{template}': {message}")]
    InvalidTemplate { template: String, message: String },

    #[error("no moisture calibration configured for sensor {id} of '{sensor}'")]
    MissingCalibration { sensor: String, id: u32 },

    #[error("failed to read presets file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse presets from {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid preset configuration: {0}")]
    Invalid(String),
}

/// Everything that can stop one sensor from producing panels.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("'{location}' row {row_index}: {source}")]
    Row {
        location: String,
        row_index: usize,
        #[source]
        source: SampleError,
    },

    #[error("smoothing failed: {0}")]
    Smoothing(#[from] SmoothingError),

    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error("analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("no data available: {0}")]
    NoData(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
