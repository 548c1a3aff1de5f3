//! Robust statistics over a bounded sample

use crate::config::{GlobalStatistics, GlobalStatisticsMode};
use serde::{Deserialize, Serialize};

/// Relates MAD to a standard deviation under a normality assumption
pub const ZSCORE: f64 = 0.6745;

/// Median of `values`; sorts the slice in place. Empty input yields `None`.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(f64::total_cmp);
    let n = values.len();
    if n % 2 == 0 {
        Some((values[n / 2 - 1] + values[n / 2]) / 2.0)
    } else {
        Some(values[n / 2])
    }
}

/// Median absolute deviation of `values` around `center`
pub fn median_absolute_deviation(values: &[f64], center: f64) -> Option<f64> {
    let mut deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&mut deviations)
}

/// Modified z-score `ZSCORE * (value - median) / mad`.
///
/// A zero MAD means every sample equals the median: the score is 0 for a
/// value at the median and infinite (signed) otherwise.
pub fn modified_zscore(value: f64, median: f64, mad: f64) -> f64 {
    let deviation = value - median;
    if mad == 0.0 {
        if deviation == 0.0 {
            0.0
        } else {
            f64::INFINITY.copysign(deviation)
        }
    } else {
        ZSCORE * deviation / mad
    }
}

/// Median and MAD of a window snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowStatistics {
    pub median: f64,
    pub mad: f64,
    /// Values the estimate was computed from, phantom samples included
    pub sample_size: usize,
}

impl WindowStatistics {
    /// Estimate from retained values, folding in global statistics.
    ///
    /// `PhantomSample` appends each configured bound to the sample before
    /// both medians are taken. `Clamp` takes the median of the real values,
    /// clamps it into the bounds, then measures deviations from the clamped
    /// center.
    pub fn from_sample(mut values: Vec<f64>, global: Option<&GlobalStatistics>) -> Option<Self> {
        match global {
            Some(stats) if stats.mode == GlobalStatisticsMode::PhantomSample => {
                values.extend(stats.min);
                values.extend(stats.max);
                let median = median(&mut values)?;
                let mad = median_absolute_deviation(&values, median)?;
                Some(Self {
                    median,
                    mad,
                    sample_size: values.len(),
                })
            }
            Some(stats) => {
                let mut center = median(&mut values)?;
                if let Some(min) = stats.min {
                    center = center.max(min);
                }
                if let Some(max) = stats.max {
                    center = center.min(max);
                }
                let mad = median_absolute_deviation(&values, center)?;
                Some(Self {
                    median: center,
                    mad,
                    sample_size: values.len(),
                })
            }
            None => {
                let median = median(&mut values)?;
                let mad = median_absolute_deviation(&values, median)?;
                Some(Self {
                    median,
                    mad,
                    sample_size: values.len(),
                })
            }
        }
    }

    pub fn modified_zscore(&self, value: f64) -> f64 {
        modified_zscore(value, self.median, self.mad)
    }

    /// Inverse of `modified_zscore`: the value that would score `zscore`
    pub fn value_at_zscore(&self, zscore: f64) -> f64 {
        self.mad * zscore / ZSCORE + self.median
    }
}
