//! Outlier engine configuration
//!
//! Mirrors the JSON document accepted by the engine:
//!
//! ```json
//! {
//!   "rotationPolicy": { "type": "BY_AMOUNT", "amount": 100, "unit": "POINTS" },
//!   "chunkingPolicy": { "type": "BY_AMOUNT", "amount": 10, "unit": "POINTS" },
//!   "globalStatistics": { "min": -10000 },
//!   "outlierAlgorithm": "SKETCHY_MOVING_MAD",
//!   "config": {
//!     "minAmountToPredict": 100,
//!     "zscoreCutoffs": { "MODERATE_OUTLIER": 3.5, "SEVERE_OUTLIER": 5 }
//!   }
//! }
//! ```
//!
//! Parsing is only a convenience; the engine consumes the typed struct and
//! validates it on construction.

use crate::algo::cutoffs::SeverityCutoffs;
use crate::distribution::policy::{self, ChunkingPolicy, RotationPolicy};
use crate::error::{ConfigError, Result};
use crate::signal::Severity;
use crate::unit::Unit;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_MIN_AMOUNT_TO_PREDICT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyType {
    #[default]
    ByAmount,
}

/// Shared shape of the chunking and rotation policies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(rename = "type", default)]
    pub policy_type: PolicyType,
    pub amount: f64,
    pub unit: Unit,
}

impl PolicyConfig {
    pub fn points(amount: usize) -> Self {
        Self {
            policy_type: PolicyType::ByAmount,
            amount: amount as f64,
            unit: Unit::Points,
        }
    }

    pub fn time(amount: f64, unit: Unit) -> Self {
        Self {
            policy_type: PolicyType::ByAmount,
            amount,
            unit,
        }
    }
}

/// How global statistics take part in the median/MAD estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GlobalStatisticsMode {
    /// Each configured bound joins the sample as one extra value
    #[default]
    PhantomSample,
    /// The median of the real sample is clamped into `[min, max]`
    Clamp,
}

/// Known bounds of a series, fixed at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct GlobalStatistics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default)]
    pub mode: GlobalStatisticsMode,
}

impl GlobalStatistics {
    pub fn validate(&self) -> Result<()> {
        for (name, bound) in [("min", self.min), ("max", self.max)] {
            if let Some(v) = bound {
                if !v.is_finite() {
                    return Err(ConfigError::InvalidGlobalStatistics(format!(
                        "{} must be finite, got {}",
                        name, v
                    )));
                }
            }
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(ConfigError::InvalidGlobalStatistics(format!(
                    "min {} exceeds max {}",
                    min, max
                )));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// Algorithm selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutlierAlgorithmKind {
    #[default]
    SketchyMovingMad,
}

/// Parameters of the moving-MAD algorithm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmConfig {
    #[serde(default = "default_min_amount_to_predict")]
    pub min_amount_to_predict: usize,
    #[serde(default)]
    pub zscore_cutoffs: BTreeMap<Severity, f64>,
}

fn default_min_amount_to_predict() -> usize {
    DEFAULT_MIN_AMOUNT_TO_PREDICT
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self {
            min_amount_to_predict: DEFAULT_MIN_AMOUNT_TO_PREDICT,
            zscore_cutoffs: BTreeMap::from([
                (Severity::ModerateOutlier, 3.5),
                (Severity::SevereOutlier, 5.0),
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlierConfig {
    pub rotation_policy: PolicyConfig,
    pub chunking_policy: PolicyConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_statistics: Option<GlobalStatistics>,
    #[serde(default)]
    pub outlier_algorithm: OutlierAlgorithmKind,
    #[serde(rename = "config", default)]
    pub algorithm: AlgorithmConfig,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            rotation_policy: PolicyConfig::points(100),
            chunking_policy: PolicyConfig::points(10),
            global_statistics: None,
            outlier_algorithm: OutlierAlgorithmKind::SketchyMovingMad,
            algorithm: AlgorithmConfig::default(),
        }
    }
}

/// Validated pieces of an `OutlierConfig`
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub chunking: ChunkingPolicy,
    pub rotation: RotationPolicy,
    pub global_statistics: Option<GlobalStatistics>,
    pub cutoffs: SeverityCutoffs,
    pub min_amount_to_predict: usize,
}

impl OutlierConfig {
    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.resolve()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.resolve().map(|_| ())
    }

    /// Check every field and build the typed policies
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        let chunking = ChunkingPolicy::from_config(&self.chunking_policy)?;
        let rotation = RotationPolicy::from_config(&self.rotation_policy)?;
        policy::validate_pair(&chunking, &rotation)?;

        let global_statistics = match self.global_statistics {
            Some(stats) if !stats.is_empty() => {
                stats.validate()?;
                Some(stats)
            }
            _ => None,
        };

        let cutoffs = SeverityCutoffs::new(&self.algorithm.zscore_cutoffs)?;

        Ok(ResolvedConfig {
            chunking,
            rotation,
            global_statistics,
            cutoffs,
            min_amount_to_predict: self.algorithm.min_amount_to_predict,
        })
    }
}
