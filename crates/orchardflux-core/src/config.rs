// crates/orchardflux-core/src/config.rs

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use chrono::{Datelike, Duration, NaiveDate};
use once_cell::sync::Lazy;
use orchardflux_parser::model::{DEFAULT_TIMESTAMP_FIELD, DEFAULT_TIMESTAMP_FORMAT};
use orchardflux_parser::{FieldType, SampleSpec, WebSourceOptions};
use serde::{Deserialize, Serialize};

use crate::calibration::MoistureCalibration;
use crate::error::ConfigError;

const BUILTIN_PRESETS: &str = include_str!("../presets.toml");

static BUILTIN: Lazy<PresetCatalog> = Lazy::new(|| {
    PresetCatalog::from_toml_str(BUILTIN_PRESETS, "built-in presets", None)
        .expect("built-in presets must be valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    SapMoisture,
    Weather,
    Lux,
}

impl SensorKind {
    pub const ALL: [SensorKind; 3] = [SensorKind::SapMoisture, SensorKind::Weather, SensorKind::Lux];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::SapMoisture => "sap_moisture",
            SensorKind::Weather => "weather",
            SensorKind::Lux => "lux",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplatePart {
    Literal(String),
    Id,
    Year,
    ShortYear,
    Month,
    PaddedMonth,
}

/// A location pattern such as `Data_TREWid{id}_{yy}_{mm}_almond.csv`.
///
/// Supported placeholders: `{id}`, `{yyyy}`, `{yy}`, `{mm}` and `{m}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct FilenameTemplate {
    raw: String,
    parts: Vec<TemplatePart>,
}

impl FilenameTemplate {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidTemplate {
            template: raw.to_string(),
            message,
        };

        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = raw;
        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| invalid(format!("unclosed '{{' at byte {}", raw.len() - rest.len() + open)))?;
            let part = match &after[..close] {
                "id" => TemplatePart::Id,
                "yyyy" => TemplatePart::Year,
                "yy" => TemplatePart::ShortYear,
                "mm" => TemplatePart::PaddedMonth,
                "m" => TemplatePart::Month,
                other => return Err(invalid(format!("unknown placeholder '{{{other}}}'"))),
            };
            if !literal.is_empty() {
                parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
            }
            parts.push(part);
            rest = &after[close + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            parts.push(TemplatePart::Literal(literal));
        }

        if parts
            .iter()
            .any(|part| matches!(part, TemplatePart::Literal(text) if text.contains('}')))
        {
            return Err(invalid("unmatched '}'".to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn uses_id(&self) -> bool {
        self.parts.iter().any(|part| *part == TemplatePart::Id)
    }

    /// Renders the template for the month containing `date`.
    pub fn render(&self, date: NaiveDate, id: Option<u32>) -> Result<String, ConfigError> {
        let mut out = String::with_capacity(self.raw.len());
        for part in &self.parts {
            match part {
                TemplatePart::Literal(text) => out.push_str(text),
                TemplatePart::Id => {
                    let id = id.ok_or_else(|| ConfigError::InvalidTemplate {
                        template: self.raw.clone(),
                        message: "template needs a sensor id".to_string(),
                    })?;
                    out.push_str(&id.to_string());
                }
                TemplatePart::Year => out.push_str(&format!("{:04}", date.year())),
                TemplatePart::ShortYear => {
                    out.push_str(&format!("{:02}", date.year().rem_euclid(100)))
                }
                TemplatePart::Month => out.push_str(&date.month().to_string()),
                TemplatePart::PaddedMonth => out.push_str(&format!("{:02}", date.month())),
            }
        }
        Ok(out)
    }
}

impl TryFrom<String> for FilenameTemplate {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl fmt::Display for FilenameTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct IdRange {
    pub min: u32,
    pub max: u32,
}

impl IdRange {
    pub fn contains(&self, id: u32) -> bool {
        (self.min..=self.max).contains(&id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CalibrationEntry {
    pub id: u32,
    pub a: f64,
    pub b: f64,
}

fn default_timestamp_field() -> String {
    DEFAULT_TIMESTAMP_FIELD.to_string()
}

fn default_timestamp_format() -> String {
    DEFAULT_TIMESTAMP_FORMAT.to_string()
}

fn default_smoothing_minutes() -> u32 {
    60
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_sample_separator() -> String {
    ";".to_string()
}

fn default_field_separator() -> String {
    ",".to_string()
}

/// Where a preset's rows come from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSettings {
    File {
        data_dir: PathBuf,
    },
    Web {
        base_url: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
        #[serde(default = "default_sample_separator")]
        sample_separator: String,
        #[serde(default = "default_field_separator")]
        field_separator: String,
    },
}

impl SourceSettings {
    pub fn web_options(&self) -> Option<WebSourceOptions> {
        match self {
            SourceSettings::File { .. } => None,
            SourceSettings::Web {
                timeout_secs,
                sample_separator,
                field_separator,
                ..
            } => Some(WebSourceOptions {
                sample_separator: sample_separator.clone(),
                field_separator: field_separator.clone(),
                timeout: StdDuration::from_secs(*timeout_secs),
                ..WebSourceOptions::default()
            }),
        }
    }

    fn describe(&self) -> String {
        match self {
            SourceSettings::File { data_dir } => format!("files in {}", data_dir.display()),
            SourceSettings::Web { base_url, .. } => format!("web at {base_url}"),
        }
    }

    fn validate(&self, preset: &str) -> Result<(), ConfigError> {
        let SourceSettings::Web {
            base_url,
            timeout_secs,
            sample_separator,
            field_separator,
        } = self
        else {
            return Ok(());
        };
        let problem = if base_url.trim().is_empty() {
            Some("base_url is empty".to_string())
        } else if *timeout_secs == 0 {
            Some("timeout_secs must be at least 1".to_string())
        } else if sample_separator.is_empty() || field_separator.is_empty() {
            Some("separators must not be empty".to_string())
        } else if sample_separator == field_separator {
            Some(format!(
                "sample and field separators are both '{sample_separator}'"
            ))
        } else {
            None
        };
        match problem {
            Some(problem) => Err(ConfigError::Invalid(format!(
                "preset '{preset}' web source: {problem}"
            ))),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SensorConfig {
    pub kind: SensorKind,
    pub title: String,
    pub template: FilenameTemplate,
    #[serde(default)]
    pub ids: Option<IdRange>,
    pub fields: Vec<String>,
    pub important_fields: Vec<String>,
    pub field_types: Vec<FieldType>,
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
    /// Bucket width for smoothing; `0` keeps raw samples.
    #[serde(default = "default_smoothing_minutes")]
    pub smoothing_minutes: u32,
    #[serde(default)]
    pub plot_fields: Vec<String>,
    #[serde(default)]
    pub calibration: Vec<CalibrationEntry>,
}

impl SensorConfig {
    pub fn sample_spec(&self) -> SampleSpec {
        SampleSpec::new(self.important_fields.clone(), self.field_types.clone())
            .with_timestamp(self.timestamp_field.clone(), self.timestamp_format.clone())
    }

    pub fn smoothing_interval(&self) -> Option<Duration> {
        (self.smoothing_minutes > 0).then(|| Duration::minutes(i64::from(self.smoothing_minutes)))
    }

    /// Fields drawn as panels for non-sap sensors.
    pub fn plotted_fields(&self) -> &[String] {
        if self.plot_fields.is_empty() {
            &self.important_fields
        } else {
            &self.plot_fields
        }
    }

    /// Validates a requested id against the configured range. Sensors
    /// without ids ignore whatever was requested.
    pub fn check_id(&self, id: Option<u32>) -> Result<Option<u32>, ConfigError> {
        let Some(range) = self.ids else {
            return Ok(None);
        };
        let id = id.ok_or_else(|| ConfigError::MissingSensorId {
            sensor: self.title.clone(),
        })?;
        if !range.contains(id) {
            return Err(ConfigError::SensorIdOutOfRange {
                sensor: self.title.clone(),
                id,
                min: range.min,
                max: range.max,
            });
        }
        Ok(Some(id))
    }

    pub fn location_for(&self, date: NaiveDate, id: Option<u32>) -> Result<String, ConfigError> {
        let id = self.check_id(id)?;
        self.template.render(date, id)
    }

    pub fn calibration_for(&self, id: Option<u32>) -> Result<MoistureCalibration, ConfigError> {
        let id = id.ok_or_else(|| ConfigError::MissingSensorId {
            sensor: self.title.clone(),
        })?;
        self.calibration
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| MoistureCalibration::new(entry.a, entry.b))
            .ok_or_else(|| ConfigError::MissingCalibration {
                sensor: self.title.clone(),
                id,
            })
    }

    fn validate(&self, preset: &str) -> Result<(), ConfigError> {
        let context = format!("preset '{preset}', sensor '{}'", self.title);
        if self.important_fields.len() != self.field_types.len() {
            return Err(ConfigError::Invalid(format!(
                "{context}: {} important fields but {} field types",
                self.important_fields.len(),
                self.field_types.len()
            )));
        }
        if let Some(missing) = self
            .important_fields
            .iter()
            .chain(std::iter::once(&self.timestamp_field))
            .find(|field| !self.fields.contains(field))
        {
            return Err(ConfigError::Invalid(format!(
                "{context}: field '{missing}' is not one of the source fields"
            )));
        }
        if let Some(missing) = self
            .plot_fields
            .iter()
            .find(|field| !self.important_fields.contains(field))
        {
            return Err(ConfigError::Invalid(format!(
                "{context}: plot field '{missing}' is not an important field"
            )));
        }
        match self.ids {
            Some(range) if range.min > range.max => {
                return Err(ConfigError::Invalid(format!(
                    "{context}: id range {}-{} is empty",
                    range.min, range.max
                )));
            }
            None if self.template.uses_id() => {
                return Err(ConfigError::Invalid(format!(
                    "{context}: template '{}' uses {{id}} but no ids are configured",
                    self.template
                )));
            }
            _ => {}
        }
        if self.kind == SensorKind::SapMoisture {
            for required in [crate::analyzer::VALUE_1_FIELD, crate::analyzer::VALUE_2_FIELD] {
                if !self.important_fields.iter().any(|field| field == required) {
                    return Err(ConfigError::Invalid(format!(
                        "{context}: sap sensors need the '{required}' field"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Preset {
    pub name: String,
    pub title: String,
    pub source: SourceSettings,
    #[serde(rename = "sensor", default)]
    pub sensors: Vec<SensorConfig>,
}

impl Preset {
    pub fn sensor(&self, kind: SensorKind) -> Option<&SensorConfig> {
        self.sensors.iter().find(|sensor| sensor.kind == kind)
    }

    pub fn describe_source(&self) -> String {
        self.source.describe()
    }

    /// Points a file preset at another data directory. Web presets are left alone.
    pub fn override_data_dir(&mut self, dir: PathBuf) {
        if let SourceSettings::File { data_dir } = &mut self.source {
            *data_dir = dir;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.source.validate(&self.name)?;
        let mut seen = HashSet::new();
        for sensor in &self.sensors {
            if !seen.insert(sensor.kind) {
                return Err(ConfigError::Invalid(format!(
                    "preset '{}' declares more than one {} sensor",
                    self.name, sensor.kind
                )));
            }
            sensor.validate(&self.name)?;
        }
        Ok(())
    }
}

/// The set of presets a run can choose from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PresetCatalog {
    #[serde(rename = "preset", default)]
    presets: Vec<Preset>,
}

impl PresetCatalog {
    /// Presets compiled into the binary.
    pub fn builtin() -> &'static PresetCatalog {
        &BUILTIN
    }

    /// Parses a catalog. Relative file data directories are resolved
    /// against `base_dir` when one is given.
    pub fn from_toml_str(
        text: &str,
        origin: &str,
        base_dir: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut catalog: PresetCatalog = toml::from_str(text).map_err(|source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        })?;

        let mut names = HashSet::new();
        for preset in &mut catalog.presets {
            if !names.insert(preset.name.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "preset '{}' is defined more than once",
                    preset.name
                )));
            }
            preset.validate()?;
            if let (Some(base), SourceSettings::File { data_dir }) = (base_dir, &mut preset.source) {
                if data_dir.is_relative() {
                    *data_dir = base.join(&*data_dir);
                }
            }
        }
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, &path.display().to_string(), path.parent())
    }

    pub fn get(&self, name: &str) -> Result<&Preset, ConfigError> {
        self.presets
            .iter()
            .find(|preset| preset.name == name)
            .ok_or_else(|| ConfigError::UnknownPreset {
                name: name.to_string(),
                available: self.names(),
            })
    }

    pub fn names(&self) -> Vec<String> {
        self.presets.iter().map(|preset| preset.name.clone()).collect()
    }

    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }
}
