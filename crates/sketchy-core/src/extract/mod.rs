//! Raw record -> `DataPoint` extraction
//!
//! A record is decoded into named fields by the value converter, then every
//! configured measurement picks its timestamp, value, source and metadata
//! out of those fields. One record can therefore yield several points.
//! Records that cannot be decoded yield nothing; they never raise.

pub mod delimited;
pub mod timestamp;

pub use delimited::{CsvConverter, CsvConverterConfig};
pub use timestamp::{TimestampConverter, TimestampConverterConfig, TimestampConverterKind};

use crate::error::{ConfigError, Result};
use crate::metrics;
use crate::point::DataPoint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Separator between field values when a source is built from several fields
pub const SOURCE_FIELD_SEPARATOR: &str = ".";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ValueConverterKind {
    #[default]
    #[serde(rename = "CSVConverter")]
    Csv,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementConfig {
    /// Fixed source name
    #[serde(default)]
    pub source: Option<String>,
    /// Build the source from these fields instead, joined with `.`
    #[serde(default)]
    pub source_fields: Vec<String>,
    pub timestamp_field: String,
    #[serde(default)]
    pub timestamp_converter: TimestampConverterKind,
    #[serde(default)]
    pub timestamp_converter_config: TimestampConverterConfig,
    pub measurement_field: String,
    #[serde(default)]
    pub metadata_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPointExtractorConfig {
    #[serde(default)]
    pub value_converter: ValueConverterKind,
    pub value_converter_config: CsvConverterConfig,
    pub measurements: Vec<MeasurementConfig>,
}

impl DataPointExtractorConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[derive(Debug, Clone)]
enum SourceName {
    Fixed(String),
    Fields(Vec<String>),
}

#[derive(Debug, Clone)]
struct Measurement {
    source: SourceName,
    timestamp_field: String,
    timestamp: TimestampConverter,
    measurement_field: String,
    metadata_fields: Vec<String>,
}

impl Measurement {
    fn new(config: &MeasurementConfig, converter: &CsvConverter) -> Result<Self> {
        let source = match (&config.source, config.source_fields.is_empty()) {
            (Some(name), _) => SourceName::Fixed(name.clone()),
            (None, false) => SourceName::Fields(config.source_fields.clone()),
            (None, true) => {
                return Err(ConfigError::InvalidExtractor(format!(
                    "measurement on '{}' has neither source nor sourceFields",
                    config.measurement_field
                )));
            }
        };

        let referenced = config
            .source_fields
            .iter()
            .chain(&config.metadata_fields)
            .chain([&config.timestamp_field, &config.measurement_field]);
        for field in referenced {
            if !converter.has_field(field) {
                return Err(ConfigError::InvalidExtractor(format!(
                    "field '{}' is not in columnMap",
                    field
                )));
            }
        }

        // Source fields double as metadata
        let mut metadata_fields = config.metadata_fields.clone();
        for field in &config.source_fields {
            if !metadata_fields.contains(field) {
                metadata_fields.push(field.clone());
            }
        }

        Ok(Self {
            source,
            timestamp_field: config.timestamp_field.clone(),
            timestamp: TimestampConverter::new(
                config.timestamp_converter,
                &config.timestamp_converter_config,
            )?,
            measurement_field: config.measurement_field.clone(),
            metadata_fields,
        })
    }

    fn extract(&self, fields: &BTreeMap<String, String>) -> Option<DataPoint> {
        let timestamp = self.timestamp.convert(fields.get(&self.timestamp_field)?)?;
        let value = fields
            .get(&self.measurement_field)?
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())?;

        let source = match &self.source {
            SourceName::Fixed(name) => name.clone(),
            SourceName::Fields(names) => names
                .iter()
                .map(|name| fields.get(name).map(String::as_str))
                .collect::<Option<Vec<&str>>>()?
                .join(SOURCE_FIELD_SEPARATOR),
        };

        let mut metadata = BTreeMap::new();
        for name in &self.metadata_fields {
            metadata.insert(name.clone(), fields.get(name)?.clone());
        }

        Some(DataPoint::new(timestamp, value, source).with_metadata(metadata))
    }

    fn label(&self) -> &str {
        &self.measurement_field
    }
}

/// Configured record extractor
#[derive(Debug, Clone)]
pub struct DataPointExtractor {
    converter: CsvConverter,
    measurements: Vec<Measurement>,
}

impl DataPointExtractor {
    pub fn new(config: &DataPointExtractorConfig) -> Result<Self> {
        let converter = match config.value_converter {
            ValueConverterKind::Csv => CsvConverter::new(&config.value_converter_config)?,
        };
        if config.measurements.is_empty() {
            return Err(ConfigError::InvalidExtractor(
                "no measurements configured".to_string(),
            ));
        }
        let measurements = config
            .measurements
            .iter()
            .map(|m| Measurement::new(m, &converter))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            converter,
            measurements,
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::new(&DataPointExtractorConfig::from_json(json)?)
    }

    /// Lazily yield the points in one record, in measurement order.
    ///
    /// `_key` is the record's arrival key; delimited records carry all of
    /// their data in the value.
    pub fn extract<'a>(
        &'a self,
        _key: &[u8],
        value: &[u8],
    ) -> impl Iterator<Item = DataPoint> + use<'a> {
        let fields = match self.converter.convert(value) {
            Some(fields) => fields,
            None => {
                metrics::RECORDS_DROPPED.inc();
                debug!(bytes = value.len(), "Skipped comment or undecodable record");
                BTreeMap::new()
            }
        };
        let measurements = match fields.is_empty() {
            true => &self.measurements[..0],
            false => &self.measurements[..],
        };

        measurements.iter().filter_map(move |m| {
            let point = m.extract(&fields);
            if point.is_none() {
                metrics::RECORDS_DROPPED.inc();
                debug!(measurement = m.label(), "Measurement had an unusable field");
            }
            point
        })
    }

    pub fn measurement_count(&self) -> usize {
        self.measurements.len()
    }
}
