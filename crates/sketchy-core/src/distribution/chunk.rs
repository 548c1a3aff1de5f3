use crate::point::TimeRange;
use serde::{Deserialize, Serialize};

/// Append-only run of retained values.
///
/// A chunk is never split: it is either the open chunk at the tail of a
/// distribution or a frozen one waiting to be evicted whole.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Chunk {
    values: Vec<f64>,
    span: Option<TimeRange>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            span: None,
        }
    }

    pub fn push(&mut self, timestamp: i64, value: f64) {
        self.values.push(value);
        match self.span.as_mut() {
            Some(span) => span.extend_to(timestamp),
            None => self.span = Some(TimeRange::instant(timestamp)),
        }
    }

    pub fn count(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Span of timestamps seen, `None` while empty
    pub fn time_range(&self) -> Option<TimeRange> {
        self.span
    }
}
