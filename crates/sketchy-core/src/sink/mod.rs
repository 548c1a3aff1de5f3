//! Time-series persistence
//!
//! Outliers and the raw series they were found in are written to a
//! time-series store and read back as context. The store is a collaborator:
//! `TimeseriesSink` is the seam, `MemorySink` backs tests and dry runs and
//! `OpenTsdbSink` talks to an OpenTSDB HTTP endpoint.

pub mod memory;
pub mod opentsdb;

pub use memory::MemorySink;
pub use opentsdb::{OpenTsdbConfig, OpenTsdbSink, SinkStats};

use crate::error::SinkError;
use crate::point::{DataPoint, TimeRange};
use crate::signal::Severity;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub const STREAMING_OUTLIER_SUFFIX: &str = ".outlier.streaming";
pub const BATCH_OUTLIER_SUFFIX: &str = ".outlier.batch";

pub const TYPE_TAG_KEY: &str = "type";
pub const SERIES_TAG_VALUE: &str = "series";
pub const OUTLIER_TAG_VALUE: &str = "outlier";
pub const SEVERITY_TAG_KEY: &str = "severity";

pub type Tags = BTreeMap<String, String>;

/// Completion hook for a write; runs once the write is acknowledged or abandoned
pub type PersistCallback = Box<dyn FnOnce(Result<(), SinkError>) + Send + 'static>;

#[async_trait]
pub trait TimeseriesSink: Send + Sync {
    /// Queue a point for writing. Never blocks on the store; failures are
    /// reported through `callback` when one is given.
    fn persist(&self, metric: &str, point: &DataPoint, tags: &Tags, callback: Option<PersistCallback>);

    /// Series-tagged points of `metric` with `range.begin() <= ts <= min(range.end(), reference.ts)`,
    /// in timestamp order.
    async fn retrieve(
        &self,
        metric: &str,
        reference: &DataPoint,
        range: TimeRange,
    ) -> Result<Vec<DataPoint>, SinkError>;
}

pub fn streaming_outlier_metric(metric: &str) -> String {
    format!("{}{}", metric, STREAMING_OUTLIER_SUFFIX)
}

pub fn batch_outlier_metric(metric: &str) -> String {
    format!("{}{}", metric, BATCH_OUTLIER_SUFFIX)
}

pub fn outlier_tags(severity: Severity) -> Tags {
    Tags::from([
        (SEVERITY_TAG_KEY.to_string(), severity.as_str().to_string()),
        (TYPE_TAG_KEY.to_string(), OUTLIER_TAG_VALUE.to_string()),
    ])
}

/// The point's metadata plus the series marker
pub fn basic_tags(point: &DataPoint) -> Tags {
    let mut tags = point.metadata().clone();
    tags.insert(TYPE_TAG_KEY.to_string(), SERIES_TAG_VALUE.to_string());
    tags
}

fn is_series(tags: &Tags) -> bool {
    tags.get(TYPE_TAG_KEY).map(String::as_str) == Some(SERIES_TAG_VALUE)
}

/// Clip a query range at the reference point so context never looks ahead
fn query_window(reference: &DataPoint, range: TimeRange) -> Option<TimeRange> {
    let end = range.end().min(reference.timestamp());
    (end >= range.begin()).then(|| TimeRange::new(range.begin(), end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert_eq!(streaming_outlier_metric("cpu"), "cpu.outlier.streaming");
        assert_eq!(batch_outlier_metric("cpu"), "cpu.outlier.batch");
    }

    #[test]
    fn test_tags() {
        let tags = outlier_tags(Severity::SevereOutlier);
        assert_eq!(tags["severity"], "SEVERE_OUTLIER");
        assert_eq!(tags["type"], "outlier");

        let point = DataPoint::new(0, 1.0, "cpu").with_tag("host", "a");
        let tags = basic_tags(&point);
        assert_eq!(tags.len(), 2);
        assert!(is_series(&tags));
    }

    #[test]
    fn test_query_window_stops_at_reference() {
        let reference = DataPoint::new(50, 0.0, "m");
        assert_eq!(
            query_window(&reference, TimeRange::new(0, 100)),
            Some(TimeRange::new(0, 50))
        );
        assert_eq!(query_window(&reference, TimeRange::new(60, 100)), None);
    }
}
