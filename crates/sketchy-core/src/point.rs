//! Measurement value types
//!
//! `DataPoint` is what the extractor produces and the engine consumes.
//! `TimeRange` is the closed interval used by chunks, units and sink queries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single typed measurement from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    timestamp: i64,
    value: f64,
    source: String,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl DataPoint {
    /// Create a point with empty metadata
    ///
    /// # Arguments
    /// * `timestamp` - Epoch milliseconds
    /// * `value` - Measured value
    /// * `source` - Series identifier; one distribution is kept per source
    pub fn new(timestamp: i64, value: f64, source: impl Into<String>) -> Self {
        Self {
            timestamp,
            value,
            source: source.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
}

/// Closed interval of epoch milliseconds, `begin <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    begin: i64,
    end: i64,
}

impl TimeRange {
    /// Build a range; bounds given in the wrong order are swapped.
    pub fn new(begin: i64, end: i64) -> Self {
        if begin <= end {
            Self { begin, end }
        } else {
            Self {
                begin: end,
                end: begin,
            }
        }
    }

    pub fn instant(ts: i64) -> Self {
        Self { begin: ts, end: ts }
    }

    pub fn begin(&self) -> i64 {
        self.begin
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    /// Elapsed milliseconds between begin and end
    pub fn duration_ms(&self) -> i64 {
        self.end - self.begin
    }

    pub fn contains(&self, ts: i64) -> bool {
        ts >= self.begin && ts <= self.end
    }

    /// Widen the range so that it covers `ts`
    pub fn extend_to(&mut self, ts: i64) {
        if ts < self.begin {
            self.begin = ts;
        }
        if ts > self.end {
            self.end = ts;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_range_normalises_order() {
        let r = TimeRange::new(50, 10);
        assert_eq!(r.begin(), 10);
        assert_eq!(r.end(), 50);
        assert_eq!(r.duration_ms(), 40);
    }

    #[test]
    fn test_time_range_extend_and_contains() {
        let mut r = TimeRange::instant(100);
        r.extend_to(90);
        r.extend_to(120);
        assert!(r.contains(90));
        assert!(r.contains(120));
        assert!(!r.contains(121));
    }

    #[test]
    fn test_data_point_tags() {
        let dp = DataPoint::new(0, 1.5, "sensor_1").with_tag("plant_id", "plant_1");
        assert_eq!(dp.source(), "sensor_1");
        assert_eq!(dp.metadata().get("plant_id").map(String::as_str), Some("plant_1"));
    }
}
