use super::{PersistCallback, Tags, TimeseriesSink, is_series, query_window};
use crate::error::SinkError;
use crate::point::{DataPoint, TimeRange};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq)]
struct Stored {
    timestamp: i64,
    value: f64,
    tags: Tags,
}

/// In-process sink. Writes complete synchronously, so callbacks run before
/// `persist` returns.
#[derive(Debug, Default)]
pub struct MemorySink {
    series: RwLock<HashMap<String, Vec<Stored>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points written under `metric`, whatever their tags
    pub fn len(&self, metric: &str) -> usize {
        let series = self.series.read().unwrap_or_else(|e| e.into_inner());
        series.get(metric).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        let series = self.series.read().unwrap_or_else(|e| e.into_inner());
        series.values().all(Vec::is_empty)
    }

    pub fn metrics(&self) -> Vec<String> {
        let series = self.series.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = series.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every point under `metric` as written, tags carried as metadata
    pub fn points(&self, metric: &str) -> Vec<DataPoint> {
        let series = self.series.read().unwrap_or_else(|e| e.into_inner());
        series
            .get(metric)
            .map(|stored| {
                stored
                    .iter()
                    .map(|s| DataPoint::new(s.timestamp, s.value, metric).with_metadata(s.tags.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl TimeseriesSink for MemorySink {
    fn persist(&self, metric: &str, point: &DataPoint, tags: &Tags, callback: Option<PersistCallback>) {
        {
            let mut series = self.series.write().unwrap_or_else(|e| e.into_inner());
            let stored = series.entry(metric.to_string()).or_default();
            let entry = Stored {
                timestamp: point.timestamp(),
                value: point.value(),
                tags: tags.clone(),
            };
            let at = stored.partition_point(|s| s.timestamp <= entry.timestamp);
            stored.insert(at, entry);
        }
        if let Some(callback) = callback {
            callback(Ok(()));
        }
    }

    async fn retrieve(
        &self,
        metric: &str,
        reference: &DataPoint,
        range: TimeRange,
    ) -> Result<Vec<DataPoint>, SinkError> {
        let Some(window) = query_window(reference, range) else {
            return Ok(Vec::new());
        };
        let series = self.series.read().unwrap_or_else(|e| e.into_inner());
        Ok(series
            .get(metric)
            .into_iter()
            .flatten()
            .filter(|s| window.contains(s.timestamp) && is_series(&s.tags))
            .map(|s| DataPoint::new(s.timestamp, s.value, metric).with_metadata(s.tags.clone()))
            .collect())
    }
}
