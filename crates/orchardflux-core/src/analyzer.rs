// crates/orchardflux-core/src/analyzer.rs

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use polars::prelude::*;
use thiserror::Error;

use crate::calibration::MoistureCalibration;
use crate::collection::{CollectionError, SampleCollection};
use crate::frame::{timestamp_series, TIMESTAMP_COLUMN};

pub const VALUE_1_FIELD: &str = "Value 1";
pub const VALUE_2_FIELD: &str = "Value 2";

const DELTA_T_OFFSET: f64 = 1000.0;
const DELTA_T_SCALE: f64 = 20.0;
const SAP_FLUX_COEFFICIENT: f64 = 118.99e-6;
const NIGHT_HOURS: RangeInclusive<u32> = 0..=7;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("{timestamps} timestamps but {values} values for {series}")]
    LengthMismatch {
        series: &'static str,
        timestamps: usize,
        values: usize,
    },

    #[error(transparent)]
    Collection(#[from] CollectionError),
}

/// Why a single reading has no derived sap flow value.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedValueError {
    #[error("no readings between 00:00 and 07:59 on {day}")]
    NoNightReadings { day: NaiveDate },

    #[error("temperature difference is zero at {timestamp}")]
    ZeroDeltaT { timestamp: NaiveDateTime },
}

pub fn delta_t(value1: f64) -> f64 {
    (value1 - DELTA_T_OFFSET) / DELTA_T_SCALE
}

/// Mean ΔT over the 00:00-07:59 readings of each calendar day. Days with no
/// readings in that window have no entry.
pub fn nightly_baselines(
    timestamps: &[NaiveDateTime],
    delta_t: &[f64],
) -> Result<BTreeMap<NaiveDate, f64>, AnalysisError> {
    check_lengths("ΔT", timestamps.len(), delta_t.len())?;

    let mut sums: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for (ts, dt) in timestamps.iter().zip(delta_t) {
        if NIGHT_HOURS.contains(&ts.hour()) {
            let entry = sums.entry(ts.date()).or_insert((0.0, 0));
            entry.0 += dt;
            entry.1 += 1;
        }
    }

    Ok(sums
        .into_iter()
        .map(|(day, (sum, count))| (day, sum / count as f64))
        .collect())
}

/// `K = -(minT - ΔT) / ΔT`; `None` when ΔT is zero.
pub fn k_value(min_t: f64, delta_t: f64) -> Option<f64> {
    (delta_t != 0.0).then(|| -(min_t - delta_t) / delta_t)
}

/// Sap flux density from K, floored at zero.
pub fn sap_flux_density(k: f64) -> f64 {
    (SAP_FLUX_COEFFICIENT * k).max(0.0)
}

/// Calibrated moisture clamped to `[0, 100]`.
pub fn relative_moisture(value2: f64, calibration: &MoistureCalibration) -> f64 {
    calibration.apply(value2).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SapFlowRow {
    pub timestamp: NaiveDateTime,
    pub value1: f64,
    pub value2: f64,
    pub delta_t: f64,
    pub min_t: Option<f64>,
    pub k: Result<f64, DerivedValueError>,
    pub sap_flux_density: Result<f64, DerivedValueError>,
    pub relative_moisture: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SapFlowAnalysis {
    pub rows: Vec<SapFlowRow>,
}

impl SapFlowAnalysis {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Timestamps and densities of the rows that have one.
    pub fn sap_flux_series(&self) -> (Vec<NaiveDateTime>, Vec<f64>) {
        self.rows
            .iter()
            .filter_map(|row| row.sap_flux_density.ok().map(|value| (row.timestamp, value)))
            .unzip()
    }

    pub fn moisture_series(&self) -> (Vec<NaiveDateTime>, Vec<f64>) {
        self.rows
            .iter()
            .map(|row| (row.timestamp, row.relative_moisture))
            .unzip()
    }

    pub fn failures(&self) -> Vec<DerivedValueError> {
        self.rows
            .iter()
            .filter_map(|row| row.sap_flux_density.err())
            .collect()
    }

    pub fn failure_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| row.sap_flux_density.is_err())
            .count()
    }

    /// All derived columns; rows without a value carry nulls.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let timestamps: Vec<NaiveDateTime> = self.rows.iter().map(|row| row.timestamp).collect();
        let value1: Vec<f64> = self.rows.iter().map(|row| row.value1).collect();
        let value2: Vec<f64> = self.rows.iter().map(|row| row.value2).collect();
        let delta_t: Vec<f64> = self.rows.iter().map(|row| row.delta_t).collect();
        let min_t: Vec<Option<f64>> = self.rows.iter().map(|row| row.min_t).collect();
        let k: Vec<Option<f64>> = self.rows.iter().map(|row| row.k.ok()).collect();
        let sap_flux: Vec<Option<f64>> = self
            .rows
            .iter()
            .map(|row| row.sap_flux_density.ok())
            .collect();
        let moisture: Vec<f64> = self.rows.iter().map(|row| row.relative_moisture).collect();

        let columns: Vec<Column> = vec![
            timestamp_series(TIMESTAMP_COLUMN, &timestamps)?.into(),
            Series::new("value_1".into(), value1).into(),
            Series::new("value_2".into(), value2).into(),
            Series::new("delta_t".into(), delta_t).into(),
            Series::new("min_t".into(), min_t).into(),
            Series::new("k".into(), k).into(),
            Series::new("sap_flux_density".into(), sap_flux).into(),
            Series::new("relative_moisture_pct".into(), moisture).into(),
        ];
        DataFrame::new(columns)
    }
}

fn check_lengths(series: &'static str, timestamps: usize, values: usize) -> Result<(), AnalysisError> {
    if timestamps != values {
        return Err(AnalysisError::LengthMismatch {
            series,
            timestamps,
            values,
        });
    }
    Ok(())
}

/// Derives ΔT, minT, K, sap flux density and relative moisture for a
/// chronologically sorted series.
pub fn analyze_sap_flow(
    timestamps: &[NaiveDateTime],
    value1: &[f64],
    value2: &[f64],
    calibration: &MoistureCalibration,
) -> Result<SapFlowAnalysis, AnalysisError> {
    check_lengths(VALUE_1_FIELD, timestamps.len(), value1.len())?;
    check_lengths(VALUE_2_FIELD, timestamps.len(), value2.len())?;

    let delta_ts: Vec<f64> = value1.iter().copied().map(delta_t).collect();
    let baselines = nightly_baselines(timestamps, &delta_ts)?;

    let rows = timestamps
        .iter()
        .zip(value1)
        .zip(value2)
        .zip(&delta_ts)
        .map(|(((&timestamp, &v1), &v2), &dt)| {
            let day = timestamp.date();
            let min_t = baselines.get(&day).copied();
            let k = min_t
                .ok_or(DerivedValueError::NoNightReadings { day })
                .and_then(|mt| k_value(mt, dt).ok_or(DerivedValueError::ZeroDeltaT { timestamp }));
            SapFlowRow {
                timestamp,
                value1: v1,
                value2: v2,
                delta_t: dt,
                min_t,
                k,
                sap_flux_density: k.map(sap_flux_density),
                relative_moisture: relative_moisture(v2, calibration),
            }
        })
        .collect();

    Ok(SapFlowAnalysis { rows })
}

/// Runs [`analyze_sap_flow`] over the `Value 1` and `Value 2` fields.
pub fn analyze_collection(
    collection: &SampleCollection,
    calibration: &MoistureCalibration,
) -> Result<SapFlowAnalysis, AnalysisError> {
    let timestamps = collection.timestamps();
    let value1 = collection.field_values(VALUE_1_FIELD)?;
    let value2 = collection.field_values(VALUE_2_FIELD)?;
    analyze_sap_flow(&timestamps, &value1, &value2, calibration)
}
