//! Synthetic workload with injected spikes
//!
//! Each source emits normally distributed values around its own baseline.
//! Every `spike_every`-th point of a source is replaced by a value
//! `spike_sigma` standard deviations away and tagged so detections can be
//! scored against ground truth.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use sketchy_core::{DataPoint, Outlier};

pub const INJECTED_TAG: &str = "injected";

#[derive(Debug, Clone, Copy)]
pub struct SimulationConfig {
    pub sources: usize,
    pub points_per_source: usize,
    pub spike_every: usize,
    pub spike_sigma: f64,
    pub interval_ms: i64,
    pub seed: u64,
}

struct SourceModel {
    name: String,
    baseline: Normal<f64>,
    mean: f64,
    std_dev: f64,
}

pub struct Generator {
    config: SimulationConfig,
    rng: StdRng,
    sources: Vec<SourceModel>,
    step: usize,
}

impl Generator {
    pub fn new(config: SimulationConfig) -> Result<Self, rand_distr::NormalError> {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut sources = Vec::with_capacity(config.sources);
        for i in 0..config.sources {
            let mean = rng.random_range(10.0..1_000.0);
            let std_dev = mean * rng.random_range(0.01..0.1);
            sources.push(SourceModel {
                name: format!("sim.source-{}", i),
                baseline: Normal::new(mean, std_dev)?,
                mean,
                std_dev,
            });
        }
        Ok(Self {
            config,
            rng,
            sources,
            step: 0,
        })
    }

    fn is_spike(&self, index: usize) -> bool {
        // Leave the first window alone so every source can warm up
        self.config.spike_every > 0 && index >= self.config.spike_every && index % self.config.spike_every == 0
    }
}

impl Iterator for Generator {
    type Item = DataPoint;

    /// Round-robin over sources, one timestamp per round
    fn next(&mut self) -> Option<DataPoint> {
        if self.sources.is_empty() {
            return None;
        }
        let round = self.step / self.sources.len();
        if round >= self.config.points_per_source {
            return None;
        }
        let source = self.step % self.sources.len();
        self.step += 1;

        let timestamp = round as i64 * self.config.interval_ms;
        let spike = self.is_spike(round);
        let model = &self.sources[source];
        let point = match spike {
            true => {
                let direction = if self.rng.random_bool(0.5) { 1.0 } else { -1.0 };
                let value = model.mean + direction * self.config.spike_sigma * model.std_dev;
                DataPoint::new(timestamp, value, model.name.as_str()).with_tag(INJECTED_TAG, "true")
            }
            false => DataPoint::new(timestamp, model.baseline.sample(&mut self.rng), model.name.as_str()),
        };
        Some(point)
    }
}

/// Detection quality against the injected ground truth
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct SimulationReport {
    pub points: u64,
    pub injected: u64,
    pub detected: u64,
    pub false_positives: u64,
    pub recall: f64,
    pub precision: f64,
}

impl SimulationReport {
    pub fn new(points: u64, injected: u64) -> Self {
        Self {
            points,
            injected,
            ..Default::default()
        }
    }

    pub fn observe(&mut self, outlier: &Outlier) {
        if !outlier.severity().is_outlier() {
            return;
        }
        match outlier.data_point().metadata().contains_key(INJECTED_TAG) {
            true => self.detected += 1,
            false => self.false_positives += 1,
        }
    }

    pub fn finalize(mut self) -> Self {
        let flagged = self.detected + self.false_positives;
        self.recall = ratio(self.detected, self.injected);
        self.precision = ratio(self.detected, flagged);
        self
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// Number of spikes a configuration injects
pub fn expected_spikes(config: &SimulationConfig) -> u64 {
    if config.spike_every == 0 {
        return 0;
    }
    let per_source = (config.spike_every..config.points_per_source)
        .step_by(config.spike_every)
        .count();
    (per_source * config.sources) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use sketchy_core::Severity;

    fn config() -> SimulationConfig {
        SimulationConfig {
            sources: 3,
            points_per_source: 500,
            spike_every: 100,
            spike_sigma: 20.0,
            interval_ms: 1_000,
            seed: 7,
        }
    }

    #[test]
    fn test_generator_is_deterministic() {
        let a: Vec<DataPoint> = Generator::new(config()).unwrap().collect();
        let b: Vec<DataPoint> = Generator::new(config()).unwrap().collect();
        assert_eq!(a.len(), 1_500);
        assert_eq!(a, b);
    }

    #[test]
    fn test_spike_count_matches_expectation() {
        let injected = Generator::new(config())
            .unwrap()
            .filter(|p| p.metadata().contains_key(INJECTED_TAG))
            .count();
        assert_eq!(injected as u64, expected_spikes(&config()));
        assert_eq!(expected_spikes(&config()), 12);
    }

    #[test]
    fn test_report_scores_detections() {
        let mut report = SimulationReport::new(10, 2);
        let spike = DataPoint::new(0, 1.0, "s").with_tag(INJECTED_TAG, "true");
        report.observe(&Outlier::new(spike, Severity::SevereOutlier, Some(9.0)));
        report.observe(&Outlier::new(DataPoint::new(1, 1.0, "s"), Severity::ModerateOutlier, Some(4.0)));
        report.observe(&Outlier::warmup(DataPoint::new(2, 1.0, "s")));

        let report = report.finalize();
        assert_eq!(report.detected, 1);
        assert_eq!(report.false_positives, 1);
        assert_eq!(report.recall, 0.5);
        assert_eq!(report.precision, 0.5);
    }
}
