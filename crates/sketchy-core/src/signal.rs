//! Classification output
//!
//! `Outlier` is the only thing the engine emits. Sinks and the CLI decide
//! what to do with it.

use crate::point::DataPoint;
use serde::{Deserialize, Serialize};

/// Severity levels, ordered from least to most anomalous.
///
/// Ordering matters: when several cutoffs are met the highest level wins.
#[repr(u8)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[default]
    Normal = 0,
    ModerateOutlier = 1,
    SevereOutlier = 2,
}

impl Severity {
    pub const ALL: [Severity; 3] = [
        Severity::Normal,
        Severity::ModerateOutlier,
        Severity::SevereOutlier,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::ModerateOutlier => "MODERATE_OUTLIER",
            Self::SevereOutlier => "SEVERE_OUTLIER",
        }
    }

    pub fn is_outlier(&self) -> bool {
        *self > Self::Normal
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outlier {
    data_point: DataPoint,
    severity: Severity,
    /// Modified z-score, absent while the source is still warming up
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f64>,
}

impl Outlier {
    pub fn new(data_point: DataPoint, severity: Severity, score: Option<f64>) -> Self {
        Self {
            data_point,
            severity,
            score,
        }
    }

    /// Classification during cold start
    pub fn warmup(data_point: DataPoint) -> Self {
        Self::new(data_point, Severity::Normal, None)
    }

    pub fn data_point(&self) -> &DataPoint {
        &self.data_point
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn into_data_point(self) -> DataPoint {
        self.data_point
    }
}
