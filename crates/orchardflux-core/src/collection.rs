// crates/orchardflux-core/src/collection.rs

use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime};
use orchardflux_parser::{FieldValue, Sample};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SmoothingError {
    #[error("smoothing interval must be positive, got {interval}")]
    InvalidInterval { interval: Duration },

    #[error("field '{field}' of the sample at {timestamp} is not numeric and cannot be averaged")]
    NonNumericField {
        field: String,
        timestamp: NaiveDateTime,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollectionError {
    #[error("sample at {timestamp} has no field '{field}'")]
    MissingField {
        field: String,
        timestamp: NaiveDateTime,
    },

    #[error("field '{field}' of the sample at {timestamp} is not numeric")]
    NonNumericField {
        field: String,
        timestamp: NaiveDateTime,
    },
}

/// Running sums for one smoothing bucket, fields in first-seen order.
struct BucketAccumulator {
    timestamp: NaiveDateTime,
    field_order: Vec<String>,
    sums: HashMap<String, (f64, usize)>,
}

impl BucketAccumulator {
    fn new(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            field_order: Vec::new(),
            sums: HashMap::new(),
        }
    }

    fn add(&mut self, field: &str, value: f64) {
        let entry = self.sums.entry(field.to_string()).or_insert_with(|| {
            self.field_order.push(field.to_string());
            (0.0, 0)
        });
        entry.0 += value;
        entry.1 += 1;
    }

    fn finish(self) -> Sample {
        let BucketAccumulator {
            timestamp,
            field_order,
            sums,
        } = self;
        let values = field_order.into_iter().map(|field| {
            let (sum, count) = sums[&field];
            (field, FieldValue::Float(sum / count as f64))
        });
        Sample::from_ordered(timestamp, values)
    }
}

/// An ordered set of samples. Order starts as parse order and only changes
/// through [`SampleCollection::sort`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleCollection {
    samples: Vec<Sample>,
}

impl SampleCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    /// Stable sort by timestamp; ties keep their current order.
    pub fn sort(&mut self) {
        self.samples.sort_by_key(Sample::timestamp);
    }

    /// Keeps samples with `start <= timestamp <= end`.
    pub fn trim_to_range(&mut self, start: NaiveDateTime, end: NaiveDateTime) {
        self.samples
            .retain(|sample| sample.timestamp() >= start && sample.timestamp() <= end);
    }

    /// Averages samples into fixed buckets anchored at `start`.
    ///
    /// Bucket `k` covers `[start + k*interval, start + (k+1)*interval)` and is
    /// stamped with its opening instant. Only populated buckets are emitted,
    /// in the order each bucket is first reached while walking the samples.
    /// Each field is averaged over the samples in the bucket that carry it.
    pub fn smooth(
        &self,
        start: NaiveDateTime,
        interval: Duration,
    ) -> Result<SampleCollection, SmoothingError> {
        let interval_ms = interval.num_milliseconds();
        if interval_ms <= 0 {
            return Err(SmoothingError::InvalidInterval { interval });
        }

        let mut order: Vec<i64> = Vec::new();
        let mut buckets: HashMap<i64, BucketAccumulator> = HashMap::new();

        for sample in &self.samples {
            let offset_ms = (sample.timestamp() - start).num_milliseconds();
            let index = offset_ms.div_euclid(interval_ms);
            let bucket = buckets.entry(index).or_insert_with(|| {
                order.push(index);
                BucketAccumulator::new(start + Duration::milliseconds(index * interval_ms))
            });

            for (field, value) in sample.values() {
                let numeric = value.as_f64().ok_or_else(|| SmoothingError::NonNumericField {
                    field: field.to_string(),
                    timestamp: sample.timestamp(),
                })?;
                bucket.add(field, numeric);
            }
        }

        Ok(order
            .into_iter()
            .filter_map(|index| buckets.remove(&index))
            .map(BucketAccumulator::finish)
            .collect())
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.samples.iter().map(Sample::timestamp).collect()
    }

    /// Numeric values of `field`, one per sample.
    pub fn field_values(&self, field: &str) -> Result<Vec<f64>, CollectionError> {
        self.samples
            .iter()
            .map(|sample| {
                let value = sample.get(field).ok_or_else(|| CollectionError::MissingField {
                    field: field.to_string(),
                    timestamp: sample.timestamp(),
                })?;
                value.as_f64().ok_or_else(|| CollectionError::NonNumericField {
                    field: field.to_string(),
                    timestamp: sample.timestamp(),
                })
            })
            .collect()
    }
}

impl From<Vec<Sample>> for SampleCollection {
    fn from(samples: Vec<Sample>) -> Self {
        Self { samples }
    }
}

impl FromIterator<Sample> for SampleCollection {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}

impl Extend<Sample> for SampleCollection {
    fn extend<I: IntoIterator<Item = Sample>>(&mut self, iter: I) {
        self.samples.extend(iter);
    }
}

impl IntoIterator for SampleCollection {
    type Item = Sample;
    type IntoIter = std::vec::IntoIter<Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.into_iter()
    }
}

impl<'a> IntoIterator for &'a SampleCollection {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
