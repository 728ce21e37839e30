// crates/orchardflux/src/sinks.rs

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use orchardflux_core::calibration::MoistureCalibration;
use orchardflux_core::config::{PresetCatalog, SensorKind};
use orchardflux_core::frame::Panel;
use orchardflux_core::pipeline::Report;
use polars::prelude::*;
use serde::Serialize;

fn format_stat(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.4}")).unwrap_or_else(|| "-".to_string())
}

pub fn print_summary(report: &Report) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Panel", "Points", "From", "To", "Min", "Max", "Mean",
    ]);
    for panel in &report.panels {
        let bound = |ts: Option<&NaiveDateTime>| {
            ts.map(|ts| ts.to_string()).unwrap_or_else(|| "-".to_string())
        };
        table.add_row(vec![
            panel.heading(),
            panel.len().to_string(),
            bound(panel.x.first()),
            bound(panel.x.last()),
            format_stat(panel.min()),
            format_stat(panel.max()),
            format_stat(panel.mean()),
        ]);
    }
    println!("{table}");

    for sensor in &report.sensors {
        for segment in &sensor.skipped_segments {
            println!("skipped {} ({}): {}", segment.location, sensor.title, segment.reason);
        }
        let failures = sensor.derived_failures();
        if failures > 0 {
            println!("{}: {failures} readings had no sap flux value", sensor.title);
        }
    }

    if !report.skipped.is_empty() {
        let mut skipped = Table::new();
        skipped
            .load_preset(UTF8_FULL)
            .set_header(vec!["Skipped sensor", "Kind", "Reason"]);
        for sensor in &report.skipped {
            skipped.add_row(vec![
                sensor.title.clone(),
                sensor.kind.to_string(),
                sensor.error.to_string(),
            ]);
        }
        println!("{skipped}");
    }
}

fn file_stem(panel: &Panel) -> String {
    let raw = match panel.sensor_id {
        Some(id) => format!("{}_{id}_{}", panel.kind, panel.label),
        None => format!("{}_{}", panel.kind, panel.label),
    };
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Writes one CSV per panel and returns how many files were written.
pub fn write_csv(panels: &[Panel], dir: &Path) -> Result<usize> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    for panel in panels {
        let path = dir.join(format!("{}.csv", file_stem(panel)));
        let mut df = panel
            .to_dataframe()
            .with_context(|| format!("failed to build frame for {}", panel.heading()))?;
        let mut file =
            File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(panels.len())
}

#[derive(Serialize)]
struct PointExport {
    timestamp: NaiveDateTime,
    value: f64,
}

#[derive(Serialize)]
struct PanelExport<'a> {
    kind: SensorKind,
    sensor: &'a str,
    sensor_id: Option<u32>,
    label: &'a str,
    points: Vec<PointExport>,
}

#[derive(Serialize)]
struct ReportExport<'a> {
    preset: &'a str,
    panels: Vec<PanelExport<'a>>,
    skipped: Vec<String>,
}

fn report_export<'a>(preset: &'a str, report: &'a Report) -> ReportExport<'a> {
    ReportExport {
        preset,
        panels: report
            .panels
            .iter()
            .map(|panel| PanelExport {
                kind: panel.kind,
                sensor: &panel.sensor_title,
                sensor_id: panel.sensor_id,
                label: &panel.label,
                points: panel
                    .x
                    .iter()
                    .zip(&panel.y)
                    .map(|(timestamp, value)| PointExport {
                        timestamp: *timestamp,
                        value: *value,
                    })
                    .collect(),
            })
            .collect(),
        skipped: report
            .skipped
            .iter()
            .map(|sensor| format!("{}: {}", sensor.title, sensor.error))
            .collect(),
    }
}

pub fn write_json(preset: &str, report: &Report, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &report_export(preset, report))
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn print_presets(catalog: &PresetCatalog) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Preset", "Source", "Sensor", "Template", "Ids", "Smoothing"]);
    for preset in catalog.presets() {
        for sensor in &preset.sensors {
            let ids = sensor
                .ids
                .map(|range| format!("{}-{}", range.min, range.max))
                .unwrap_or_else(|| "-".to_string());
            let smoothing = match sensor.smoothing_minutes {
                0 => "off".to_string(),
                minutes => format!("{minutes} min"),
            };
            table.add_row(vec![
                format!("{} ({})", preset.name, preset.title),
                preset.describe_source(),
                sensor.title.clone(),
                sensor.template.to_string(),
                ids,
                smoothing,
            ]);
        }
    }
    println!("{table}");
}

pub fn print_calibrations(site: &str, results: &[(u32, MoistureCalibration)]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Site", "Sensor", "a", "b"]);
    for (id, calibration) in results {
        table.add_row(vec![
            site.to_string(),
            id.to_string(),
            calibration.a.to_string(),
            calibration.b.to_string(),
        ]);
    }
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn panel() -> Panel {
        let ts = NaiveDate::from_ymd_opt(2022, 4, 30)
            .unwrap()
            .and_hms_opt(1, 0, 0)
            .unwrap();
        Panel {
            kind: SensorKind::SapMoisture,
            sensor_title: "Almond sap and moisture".to_string(),
            sensor_id: Some(6),
            label: "Relative Moisture %".to_string(),
            x: vec![ts],
            y: vec![83.1],
        }
    }

    #[test]
    fn csv_file_names_are_slugged() {
        assert_eq!(file_stem(&panel()), "sap_moisture_6_relative_moisture");
    }

    #[test]
    fn writes_one_csv_per_panel() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_csv(&[panel()], dir.path()).unwrap();
        assert_eq!(written, 1);

        let text = fs::read_to_string(dir.path().join("sap_moisture_6_relative_moisture.csv")).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("timestamp,Relative Moisture %"));
        assert!(lines.next().unwrap().starts_with("2022-04-30"));
    }

    #[test]
    fn json_export_lists_points() {
        let report = Report {
            panels: vec![panel()],
            ..Report::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_json("almond", &report, &path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["preset"], "almond");
        assert_eq!(value["panels"][0]["kind"], "sap_moisture");
        assert_eq!(value["panels"][0]["points"][0]["value"], 83.1);
        assert_eq!(value["panels"][0]["points"][0]["timestamp"], "2022-04-30T01:00:00");
    }
}
