use chrono::NaiveDateTime;

use crate::errors::SampleError;
use crate::model::{RawRow, Sample, SampleSpec};

/// Converts one raw row into a typed sample.
///
/// Checks run in a fixed order so a malformed row always surfaces the same
/// error: timestamp field presence, important field presence, field/type
/// count, timestamp format, then per-field casts.
pub fn build_sample(row: &RawRow, spec: &SampleSpec) -> Result<Sample, SampleError> {
    let raw_timestamp =
        row.get(&spec.timestamp_field)
            .ok_or_else(|| SampleError::MissingTimestampField {
                field: spec.timestamp_field.clone(),
            })?;

    let missing: Vec<String> = spec
        .important_fields
        .iter()
        .filter(|field| !row.contains_key(field.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(SampleError::MissingFields { fields: missing });
    }

    if spec.important_fields.len() != spec.field_types.len() {
        return Err(SampleError::FieldTypeCountMismatch {
            fields: spec.important_fields.len(),
            types: spec.field_types.len(),
        });
    }

    let trimmed = raw_timestamp.trim();
    let timestamp =
        NaiveDateTime::parse_from_str(trimmed, &spec.timestamp_format).map_err(|_| {
            SampleError::TimestampFormat {
                value: trimmed.to_string(),
                format: spec.timestamp_format.clone(),
            }
        })?;

    let mut values = Vec::with_capacity(spec.important_fields.len());
    for (field, field_type) in spec.important_fields.iter().zip(&spec.field_types) {
        let raw = &row[field.as_str()];
        let value = field_type.cast(raw).ok_or_else(|| SampleError::TypeCast {
            field: field.clone(),
            value: raw.clone(),
            expected: *field_type,
        })?;
        values.push((field.clone(), value));
    }

    Ok(Sample::from_ordered(timestamp, values))
}
