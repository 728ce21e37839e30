use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One raw row as produced by a row source: field name to untyped text.
pub type RawRow = HashMap<String, String>;

pub const DEFAULT_TIMESTAMP_FIELD: &str = "Date and Time";
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[serde(alias = "int")]
    Integer,
    Float,
    #[serde(alias = "str", alias = "string")]
    Text,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Text => "text",
        }
    }

    /// Parses `raw` under this type's own rules. Integers reject anything
    /// with a fractional part or exponent, e.g. `"2569.0"`.
    pub fn cast(&self, raw: &str) -> Option<FieldValue> {
        let trimmed = raw.trim();
        match self {
            FieldType::Integer => trimmed.parse::<i64>().ok().map(FieldValue::Integer),
            FieldType::Float => trimmed.parse::<f64>().ok().map(FieldValue::Float),
            FieldType::Text => Some(FieldValue::Text(trimmed.to_string())),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// Numeric view of the value; `None` for text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(value) => Some(*value as f64),
            FieldValue::Float(value) => Some(*value),
            FieldValue::Text(_) => None,
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Integer(_) => FieldType::Integer,
            FieldValue::Float(_) => FieldType::Float,
            FieldValue::Text(_) => FieldType::Text,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(value) => write!(f, "{value}"),
            FieldValue::Float(value) => write!(f, "{value}"),
            FieldValue::Text(value) => f.write_str(value),
        }
    }
}

/// A single timestamped, typed reading.
///
/// The set of keys in the datapoint map always equals `important_fields`;
/// both are fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    timestamp: NaiveDateTime,
    important_fields: Vec<String>,
    datapoints: HashMap<String, FieldValue>,
}

impl Sample {
    /// Builds a sample from ordered `(field, value)` pairs. A repeated field
    /// name keeps its first position and its last value.
    pub fn from_ordered<I, S>(timestamp: NaiveDateTime, values: I) -> Self
    where
        I: IntoIterator<Item = (S, FieldValue)>,
        S: Into<String>,
    {
        let mut important_fields = Vec::new();
        let mut datapoints = HashMap::new();
        for (name, value) in values {
            let name = name.into();
            if datapoints.insert(name.clone(), value).is_none() {
                important_fields.push(name);
            }
        }
        Self {
            timestamp,
            important_fields,
            datapoints,
        }
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn important_fields(&self) -> &[String] {
        &self.important_fields
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.datapoints.get(field)
    }

    /// Values in declared field order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &FieldValue)> + '_ {
        self.important_fields
            .iter()
            .filter_map(move |name| self.datapoints.get(name).map(|v| (name.as_str(), v)))
    }
}

/// Describes how a raw row becomes a [`Sample`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleSpec {
    pub timestamp_field: String,
    pub timestamp_format: String,
    pub important_fields: Vec<String>,
    pub field_types: Vec<FieldType>,
}

impl SampleSpec {
    pub fn new(important_fields: Vec<String>, field_types: Vec<FieldType>) -> Self {
        Self {
            timestamp_field: DEFAULT_TIMESTAMP_FIELD.to_string(),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            important_fields,
            field_types,
        }
    }

    pub fn with_timestamp(mut self, field: impl Into<String>, format: impl Into<String>) -> Self {
        self.timestamp_field = field.into();
        self.timestamp_format = format.into();
        self
    }
}
