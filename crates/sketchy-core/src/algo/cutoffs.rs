use crate::error::{ConfigError, Result};
use crate::signal::Severity;
use std::collections::BTreeMap;

/// Z-score thresholds per severity, ascending.
///
/// A score is assigned the highest severity whose threshold it meets.
/// Scores below every threshold are `Normal`.
#[derive(Debug, Clone, PartialEq)]
pub struct SeverityCutoffs {
    levels: Vec<(Severity, f64)>,
}

impl SeverityCutoffs {
    pub fn new(cutoffs: &BTreeMap<Severity, f64>) -> Result<Self> {
        if cutoffs.is_empty() {
            return Err(ConfigError::MissingCutoffs);
        }

        let mut levels: Vec<(Severity, f64)> = Vec::with_capacity(cutoffs.len());
        // BTreeMap iterates in severity order
        for (&severity, &threshold) in cutoffs {
            if severity == Severity::Normal {
                return Err(ConfigError::NormalCutoff(severity));
            }
            if !threshold.is_finite() || threshold <= 0.0 {
                return Err(ConfigError::InvalidCutoff {
                    severity,
                    threshold,
                });
            }
            if let Some(&(lower, lower_threshold)) = levels.last() {
                if lower_threshold >= threshold {
                    return Err(ConfigError::NonMonotonicCutoffs {
                        lower,
                        higher: severity,
                    });
                }
            }
            levels.push((severity, threshold));
        }

        Ok(Self { levels })
    }

    /// Classify an absolute z-score. NaN is `Normal`, infinity the top level.
    pub fn classify(&self, abs_zscore: f64) -> Severity {
        let mut severity = Severity::Normal;
        for &(level, threshold) in &self.levels {
            if abs_zscore >= threshold {
                severity = level;
            } else {
                break;
            }
        }
        severity
    }

    /// Most severe configured level
    pub fn highest(&self) -> Severity {
        self.levels
            .last()
            .map(|&(severity, _)| severity)
            .unwrap_or_default()
    }

    pub fn threshold(&self, severity: Severity) -> Option<f64> {
        self.levels
            .iter()
            .find(|(level, _)| *level == severity)
            .map(|&(_, threshold)| threshold)
    }

    pub fn levels(&self) -> &[(Severity, f64)] {
        &self.levels
    }
}
