// crates/orchardflux-core/src/pipeline.rs

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use orchardflux_parser::{build_sample, DelimitedFileSource, RowSource, WebSource};
use tracing::{debug, info, warn};

use crate::analyzer::{analyze_collection, SapFlowAnalysis};
use crate::collection::SampleCollection;
use crate::config::{Preset, SensorConfig, SensorKind, SourceSettings};
use crate::error::{PipelineError, Result};
use crate::frame::Panel;
use crate::resolver::resolve_locations;

pub const SAP_FLUX_LABEL: &str = "Sap Flux Density";
pub const MOISTURE_LABEL: &str = "Relative Moisture %";

/// What to draw: a time window plus the sensor id chosen for each kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRequest {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub sensor_ids: BTreeMap<SensorKind, u32>,
    pub kinds: Vec<SensorKind>,
}

impl ReportRequest {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start,
            end,
            sensor_ids: BTreeMap::new(),
            kinds: SensorKind::ALL.to_vec(),
        }
    }

    pub fn with_sensor_id(mut self, kind: SensorKind, id: u32) -> Self {
        self.sensor_ids.insert(kind, id);
        self
    }

    pub fn only(mut self, kinds: &[SensorKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSegment {
    pub location: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct SensorReport {
    pub kind: SensorKind,
    pub title: String,
    pub sensor_id: Option<u32>,
    pub locations: Vec<String>,
    pub skipped_segments: Vec<SkippedSegment>,
    /// Samples after sorting, trimming and smoothing.
    pub samples: SampleCollection,
    pub analysis: Option<SapFlowAnalysis>,
}

impl SensorReport {
    pub fn derived_failures(&self) -> usize {
        self.analysis
            .as_ref()
            .map(SapFlowAnalysis::failure_count)
            .unwrap_or(0)
    }
}

#[derive(Debug)]
pub struct SkippedSensor {
    pub kind: SensorKind,
    pub title: String,
    pub error: PipelineError,
}

#[derive(Debug, Default)]
pub struct Report {
    pub panels: Vec<Panel>,
    pub sensors: Vec<SensorReport>,
    pub skipped: Vec<SkippedSensor>,
}

/// The row source a preset reads from.
pub fn build_row_source(preset: &Preset) -> Result<Box<dyn RowSource>> {
    let source: Box<dyn RowSource> = match &preset.source {
        SourceSettings::File { data_dir } => Box::new(DelimitedFileSource::new(data_dir.clone())),
        SourceSettings::Web { base_url, .. } => {
            let options = preset.source.web_options().unwrap_or_default();
            Box::new(WebSource::new(base_url.clone(), options)?)
        }
    };
    Ok(source)
}

/// Reads every location, building samples per segment. A segment that
/// cannot be fetched or contains a bad row is dropped whole and recorded.
pub fn collect_samples(
    source: &dyn RowSource,
    sensor: &SensorConfig,
    locations: &[String],
) -> (SampleCollection, Vec<SkippedSegment>) {
    let spec = sensor.sample_spec();
    let mut collection = SampleCollection::new();
    let mut skipped = Vec::new();

    for location in locations {
        let segment = source
            .rows(location, &sensor.fields)
            .map_err(PipelineError::from)
            .and_then(|rows| {
                rows.iter()
                    .enumerate()
                    .map(|(row_index, row)| {
                        build_sample(row, &spec).map_err(|source| PipelineError::Row {
                            location: location.clone(),
                            row_index,
                            source,
                        })
                    })
                    .collect::<Result<Vec<_>>>()
            });

        match segment {
            Ok(samples) => {
                debug!(source = source.name(), %location, count = samples.len(), "segment loaded");
                collection.extend(samples);
            }
            Err(err) => {
                warn!(source = source.name(), %location, error = %err, "skipping segment");
                skipped.push(SkippedSegment {
                    location: location.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    (collection, skipped)
}

/// Runs one sensor from resolution through analysis.
pub fn process_sensor(
    sensor: &SensorConfig,
    source: &dyn RowSource,
    request: &ReportRequest,
) -> Result<(SensorReport, Vec<Panel>)> {
    let sensor_id = sensor.check_id(request.sensor_ids.get(&sensor.kind).copied())?;
    let locations = resolve_locations(
        request.start.date(),
        request.end.date(),
        sensor_id,
        |date, id| sensor.location_for(date, id),
    )?;
    info!(sensor = %sensor.title, id = ?sensor_id, locations = locations.len(), "processing sensor");

    let (mut samples, skipped_segments) = collect_samples(source, sensor, &locations);
    if !locations.is_empty() && skipped_segments.len() == locations.len() {
        return Err(PipelineError::NoData(format!(
            "all {} locations for '{}' were skipped",
            locations.len(),
            sensor.title
        )));
    }

    samples.sort();
    samples.trim_to_range(request.start, request.end);
    if let Some(interval) = sensor.smoothing_interval() {
        samples = samples.smooth(request.start, interval)?;
        samples.sort();
    }
    if samples.is_empty() {
        warn!(sensor = %sensor.title, "no samples inside the requested window");
    }

    let panel = |label: &str, (x, y): (Vec<NaiveDateTime>, Vec<f64>)| Panel {
        kind: sensor.kind,
        sensor_title: sensor.title.clone(),
        sensor_id,
        label: label.to_string(),
        x,
        y,
    };

    let mut panels = Vec::new();
    let mut analysis = None;
    if sensor.kind == SensorKind::SapMoisture {
        let calibration = sensor.calibration_for(sensor_id)?;
        let result = analyze_collection(&samples, &calibration)?;
        let failures = result.failure_count();
        if failures > 0 {
            warn!(sensor = %sensor.title, failures, "readings without a sap flux value");
        }
        panels.push(panel(SAP_FLUX_LABEL, result.sap_flux_series()));
        panels.push(panel(MOISTURE_LABEL, result.moisture_series()));
        analysis = Some(result);
    } else {
        let timestamps = samples.timestamps();
        for field in sensor.plotted_fields() {
            let values = samples.field_values(field)?;
            panels.push(panel(field.as_str(), (timestamps.clone(), values)));
        }
    }

    let report = SensorReport {
        kind: sensor.kind,
        title: sensor.title.clone(),
        sensor_id,
        locations,
        skipped_segments,
        samples,
        analysis,
    };
    Ok((report, panels))
}

/// Processes every requested sensor of `preset`. A failing sensor is
/// recorded in [`Report::skipped`] and the rest still run.
pub fn run_report(preset: &Preset, source: &dyn RowSource, request: &ReportRequest) -> Report {
    let mut report = Report::default();

    for kind in &request.kinds {
        let Some(sensor) = preset.sensor(*kind) else {
            debug!(preset = %preset.name, %kind, "preset has no sensor of this kind");
            continue;
        };
        match process_sensor(sensor, source, request) {
            Ok((sensor_report, panels)) => {
                report.panels.extend(panels);
                report.sensors.push(sensor_report);
            }
            Err(error) => {
                warn!(sensor = %sensor.title, %error, "skipping sensor");
                report.skipped.push(SkippedSensor {
                    kind: *kind,
                    title: sensor.title.clone(),
                    error,
                });
            }
        }
    }

    info!(
        preset = %preset.name,
        panels = report.panels.len(),
        skipped = report.skipped.len(),
        "report complete"
    );
    report
}

/// Builds the preset's row source and runs the report against it.
pub fn run_preset(preset: &Preset, request: &ReportRequest) -> Result<Report> {
    let source = build_row_source(preset)?;
    info!(preset = %preset.name, source = %preset.describe_source(), "starting report");
    Ok(run_report(preset, source.as_ref(), request))
}
