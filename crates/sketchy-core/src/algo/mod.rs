pub mod cutoffs;
pub mod sketchy_mad;
pub mod stats;

pub use cutoffs::SeverityCutoffs;
pub use sketchy_mad::SketchyMovingMad;
pub use stats::{WindowStatistics, ZSCORE};

use crate::config::{OutlierAlgorithmKind, OutlierConfig};
use crate::error::Result;
use crate::point::DataPoint;
use crate::signal::Outlier;

/// Capability shared by every streaming outlier algorithm
pub trait StreamingOutlierAlgorithm: Send + Sync {
    fn name(&self) -> &str;
    /// Classify the point, then learn from it
    fn analyze(&self, point: DataPoint) -> Outlier;
    /// Classify the point without learning from it
    fn classify(&self, point: &DataPoint) -> Outlier;
}

impl StreamingOutlierAlgorithm for SketchyMovingMad {
    fn name(&self) -> &str {
        "SketchyMovingMAD"
    }

    fn analyze(&self, point: DataPoint) -> Outlier {
        SketchyMovingMad::analyze(self, point)
    }

    fn classify(&self, point: &DataPoint) -> Outlier {
        SketchyMovingMad::classify(self, point)
    }
}

/// The configured algorithm, chosen once from `OutlierConfig::outlier_algorithm`
pub enum OutlierAlgorithm {
    SketchyMovingMad(SketchyMovingMad),
}

impl OutlierAlgorithm {
    pub fn from_config(config: &OutlierConfig) -> Result<Self> {
        match config.outlier_algorithm {
            OutlierAlgorithmKind::SketchyMovingMad => {
                SketchyMovingMad::from_config(config).map(Self::SketchyMovingMad)
            }
        }
    }

    pub fn kind(&self) -> OutlierAlgorithmKind {
        match self {
            Self::SketchyMovingMad(_) => OutlierAlgorithmKind::SketchyMovingMad,
        }
    }

    pub fn as_sketchy_moving_mad(&self) -> Option<&SketchyMovingMad> {
        match self {
            Self::SketchyMovingMad(mad) => Some(mad),
        }
    }

    fn inner(&self) -> &dyn StreamingOutlierAlgorithm {
        match self {
            Self::SketchyMovingMad(mad) => mad,
        }
    }
}

impl StreamingOutlierAlgorithm for OutlierAlgorithm {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn analyze(&self, point: DataPoint) -> Outlier {
        self.inner().analyze(point)
    }

    fn classify(&self, point: &DataPoint) -> Outlier {
        self.inner().classify(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Severity;

    #[test]
    fn test_selects_from_config() {
        let algo = OutlierAlgorithm::from_config(&OutlierConfig::default()).unwrap();
        assert_eq!(algo.kind(), OutlierAlgorithmKind::SketchyMovingMad);
        assert_eq!(algo.name(), "SketchyMovingMAD");
        assert!(algo.as_sketchy_moving_mad().is_some());

        let outlier = algo.analyze(DataPoint::new(0, 1.0, "foo"));
        assert_eq!(outlier.severity(), Severity::Normal);
    }

    #[test]
    fn test_invalid_config_fails_construction() {
        let mut config = OutlierConfig::default();
        config.chunking_policy.amount = -1.0;
        assert!(OutlierAlgorithm::from_config(&config).is_err());
    }
}
