use crate::error::{ConfigError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TimestampConverterKind {
    /// Field already holds epoch milliseconds
    #[default]
    #[serde(rename = "NOOP")]
    Noop,
    /// Field holds a formatted date or date-time
    #[serde(rename = "DateConverter")]
    Date,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TimestampConverterConfig {
    /// chrono `strftime` pattern, e.g. `%Y-%m-%d`
    #[serde(default)]
    pub format: Option<String>,
}

/// Turns a timestamp field into epoch milliseconds (UTC).
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampConverter {
    Noop,
    Date { format: String },
}

impl TimestampConverter {
    pub fn new(kind: TimestampConverterKind, config: &TimestampConverterConfig) -> Result<Self> {
        match kind {
            TimestampConverterKind::Noop => Ok(Self::Noop),
            TimestampConverterKind::Date => match &config.format {
                Some(format) if !format.is_empty() => Ok(Self::Date {
                    format: normalize_format(format),
                }),
                _ => Err(ConfigError::InvalidExtractor(
                    "DateConverter requires a format".to_string(),
                )),
            },
        }
    }

    pub fn convert(&self, raw: &str) -> Option<i64> {
        let raw = raw.trim();
        match self {
            Self::Noop => raw
                .parse::<i64>()
                .ok()
                .or_else(|| raw.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v as i64)),
            Self::Date { format } => NaiveDateTime::parse_from_str(raw, format)
                .ok()
                .or_else(|| {
                    NaiveDate::parse_from_str(raw, format)
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
                .map(|dt| dt.and_utc().timestamp_millis()),
        }
    }
}

/// Accept Java-style `yyyy-MM-dd` patterns alongside chrono ones.
fn normalize_format(format: &str) -> String {
    if format.contains('%') {
        return format.to_string();
    }
    format
        .replace("yyyy", "%Y")
        .replace("MM", "%m")
        .replace("dd", "%d")
        .replace("HH", "%H")
        .replace("mm", "%M")
        .replace("ss", "%S")
}
