//! Sketchy Moving MAD
//!
//! Streaming outlier detection with a modified z-score computed against an
//! approximate sliding window per source. Each source gets a chunked
//! `Distribution`; every incoming point is scored against the window as it
//! stands, and only then admitted into it.

use super::cutoffs::SeverityCutoffs;
use super::stats::WindowStatistics;
use crate::config::{GlobalStatistics, OutlierConfig};
use crate::distribution::{ChunkingPolicy, Distribution, RotationPolicy};
use crate::error::Result;
use crate::metrics;
use crate::point::DataPoint;
use crate::registry::{self, RegistryStats, SourceRegistry};
use crate::signal::{Outlier, Severity};
use tracing::{debug, info};

pub struct SketchyMovingMad {
    distributions: SourceRegistry<Distribution>,
    chunking: ChunkingPolicy,
    rotation: RotationPolicy,
    global_statistics: Option<GlobalStatistics>,
    cutoffs: SeverityCutoffs,
    min_amount_to_predict: usize,
}

impl SketchyMovingMad {
    /// Build from a config, failing fast on anything invalid
    pub fn from_config(config: &OutlierConfig) -> Result<Self> {
        let resolved = config.resolve()?;

        info!(
            chunking = %format!("{} {}", resolved.chunking.amount(), resolved.chunking.unit()),
            rotation = %format!("{} {}", resolved.rotation.amount(), resolved.rotation.unit()),
            min_amount_to_predict = resolved.min_amount_to_predict,
            severities = resolved.cutoffs.levels().len(),
            "Configured sketchy moving MAD"
        );

        Ok(Self {
            distributions: SourceRegistry::new(),
            chunking: resolved.chunking,
            rotation: resolved.rotation,
            global_statistics: resolved.global_statistics,
            cutoffs: resolved.cutoffs,
            min_amount_to_predict: resolved.min_amount_to_predict,
        })
    }

    /// Score `point` against its source's window, then add it to the window.
    ///
    /// Scoring and appending happen under the source's lock, so a point never
    /// influences its own score and concurrent calls for one source are
    /// applied one at a time.
    pub fn analyze(&self, point: DataPoint) -> Outlier {
        let timer = metrics::ANALYZE_LATENCY.start_timer();

        let outlier = match point.value().is_finite() {
            true => self.score_and_append(point),
            false => {
                // Scored like any other value but never retained
                metrics::POINTS_REJECTED.inc();
                debug!(
                    source = point.source(),
                    value = point.value(),
                    "Non-finite value kept out of the window"
                );
                self.classify(&point)
            }
        };

        metrics::POINTS_ANALYZED.inc();
        if outlier.severity().is_outlier() {
            metrics::OUTLIERS_TOTAL
                .with_label_values(&[outlier.severity().as_str()])
                .inc();
        }
        timer.observe_duration();

        outlier
    }

    fn score_and_append(&self, point: DataPoint) -> Outlier {
        let (entry, created) = self
            .distributions
            .get_or_create(point.source(), || self.new_distribution());
        if created {
            metrics::SOURCES_TRACKED.inc();
            debug!(source = point.source(), "Created distribution for new source");
        }

        let (timestamp, value) = (point.timestamp(), point.value());
        let mut distribution = registry::lock(&entry);
        let outlier = self.score(&distribution, point);
        let evicted = distribution.append(timestamp, value);
        if evicted > 0 {
            metrics::CHUNKS_EVICTED.inc_by(evicted as u64);
        }
        outlier
    }

    /// Score `point` without admitting it into the window
    pub fn classify(&self, point: &DataPoint) -> Outlier {
        match self.distributions.get(point.source()) {
            Some(entry) => self.score(&registry::lock(&entry), point.clone()),
            None => Outlier::warmup(point.clone()),
        }
    }

    fn score(&self, distribution: &Distribution, point: DataPoint) -> Outlier {
        if point.value().is_nan() || distribution.observed() < self.min_amount_to_predict as u64 {
            return Outlier::warmup(point);
        }

        let Some(stats) = window_statistics(distribution) else {
            return Outlier::warmup(point);
        };

        let zscore = stats.modified_zscore(point.value());
        let severity = self.cutoffs.classify(zscore.abs());
        Outlier::new(point, severity, Some(zscore))
    }

    fn new_distribution(&self) -> Distribution {
        Distribution::new(self.chunking, self.rotation)
            .with_global_statistics(self.global_statistics)
    }

    /// Current median/MAD estimate for a source
    pub fn statistics(&self, source: &str) -> Option<WindowStatistics> {
        let entry = self.distributions.get(source)?;
        let distribution = registry::lock(&entry);
        window_statistics(&distribution)
    }

    /// Inspect a source's window under its lock
    pub fn with_distribution<R>(&self, source: &str, f: impl FnOnce(&Distribution) -> R) -> Option<R> {
        let entry = self.distributions.get(source)?;
        let distribution = registry::lock(&entry);
        Some(f(&distribution))
    }

    pub fn sources(&self) -> Vec<String> {
        self.distributions.sources()
    }

    pub fn registry_stats(&self) -> RegistryStats {
        self.distributions.stats()
    }

    pub fn cutoffs(&self) -> &SeverityCutoffs {
        &self.cutoffs
    }

    pub fn min_amount_to_predict(&self) -> usize {
        self.min_amount_to_predict
    }

    /// Most severe level this engine can assign
    pub fn highest_severity(&self) -> Severity {
        self.cutoffs.highest()
    }
}

impl Drop for SketchyMovingMad {
    fn drop(&mut self) {
        metrics::SOURCES_TRACKED.sub(self.distributions.len() as i64);
    }
}

fn window_statistics(distribution: &Distribution) -> Option<WindowStatistics> {
    WindowStatistics::from_sample(
        distribution.retained_values(),
        distribution.global_statistics(),
    )
}
