use thiserror::Error;

use crate::model::FieldType;

/// Failures raised while turning a location into raw rows.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to fetch '{location}': {message}")]
    Fetch { location: String, message: String },

    #[error("could not parse content of '{location}': {message}")]
    Content { location: String, message: String },

    #[error("'{location}' CSV error: {source}")]
    Csv {
        location: String,
        #[source]
        source: csv::Error,
    },

    #[error("'{location}' has {found} fields per sample but {expected} field names were supplied")]
    FieldCountMismatch {
        location: String,
        expected: usize,
        found: usize,
    },
}

impl SourceError {
    /// True when the location itself could not be reached, as opposed to
    /// content that was fetched but could not be understood.
    pub fn is_fetch(&self) -> bool {
        matches!(self, SourceError::Fetch { .. })
    }
}

/// Failures raised while building a typed sample from one raw row.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SampleError {
    #[error("timestamp field '{field}' not found in row")]
    MissingTimestampField { field: String },

    #[error("important field(s) {fields:?} missing from row")]
    MissingFields { fields: Vec<String> },

    #[error("{fields} important fields declared but {types} field types")]
    FieldTypeCountMismatch { fields: usize, types: usize },

    #[error("timestamp '{value}' does not match format '{format}'")]
    TimestampFormat { value: String, format: String },

    #[error("field '{field}' value '{value}' could not be cast to {expected}")]
    TypeCast {
        field: String,
        value: String,
        expected: FieldType,
    },
}
