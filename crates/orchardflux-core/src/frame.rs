// crates/orchardflux-core/src/frame.rs

use chrono::NaiveDateTime;
use polars::prelude::*;

use crate::config::SensorKind;

pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// Naive timestamps as a microsecond `Datetime` column without a zone.
pub fn timestamp_series(name: &str, timestamps: &[NaiveDateTime]) -> PolarsResult<Series> {
    let micros: Vec<i64> = timestamps
        .iter()
        .map(|ts| ts.and_utc().timestamp_micros())
        .collect();
    Series::new(name.into(), micros).cast(&DataType::Datetime(TimeUnit::Microseconds, None))
}

/// One plotted series: a labelled y value per timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    pub kind: SensorKind,
    pub sensor_title: String,
    pub sensor_id: Option<u32>,
    pub label: String,
    pub x: Vec<NaiveDateTime>,
    pub y: Vec<f64>,
}

impl Panel {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Display name, including the sensor id when there is one.
    pub fn heading(&self) -> String {
        match self.sensor_id {
            Some(id) => format!("{} #{id}: {}", self.sensor_title, self.label),
            None => format!("{}: {}", self.sensor_title, self.label),
        }
    }

    pub fn min(&self) -> Option<f64> {
        self.y.iter().copied().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.y.iter().copied().reduce(f64::max)
    }

    pub fn mean(&self) -> Option<f64> {
        (!self.y.is_empty()).then(|| self.y.iter().sum::<f64>() / self.y.len() as f64)
    }

    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let columns: Vec<Column> = vec![
            timestamp_series(TIMESTAMP_COLUMN, &self.x)?.into(),
            Series::new(self.label.as_str().into(), self.y.clone()).into(),
        ];
        DataFrame::new(columns)
    }
}
