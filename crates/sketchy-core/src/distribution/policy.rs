//! Chunking and rotation rules
//!
//! Both policies share the `{type, amount, unit}` config shape. A `Points`
//! unit counts values; any other unit measures the time span of the data.

use super::chunk::Chunk;
use crate::config::{PolicyConfig, PolicyType};
use crate::error::{ConfigError, Result};
use crate::point::TimeRange;
use crate::unit::Unit;
use std::collections::VecDeque;

fn validate_amount(policy: &'static str, config: &PolicyConfig) -> Result<()> {
    let amount = config.amount;
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ConfigError::NonPositiveAmount { policy, amount });
    }
    if config.unit == Unit::Points && amount.fract() != 0.0 {
        return Err(ConfigError::FractionalPoints { policy, amount });
    }
    Ok(())
}

/// Decides when the open chunk is full.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkingPolicy {
    policy_type: PolicyType,
    amount: f64,
    unit: Unit,
}

impl ChunkingPolicy {
    /// Chunk every `amount` points
    pub fn points(amount: usize) -> Self {
        Self {
            policy_type: PolicyType::ByAmount,
            amount: amount.max(1) as f64,
            unit: Unit::Points,
        }
    }

    pub fn from_config(config: &PolicyConfig) -> Result<Self> {
        validate_amount("chunking policy", config)?;
        Ok(Self {
            policy_type: config.policy_type,
            amount: config.amount,
            unit: config.unit,
        })
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    /// Whether `chunk` must be frozen before a point at `incoming_ts` lands
    pub fn is_full(&self, chunk: &Chunk, incoming_ts: i64) -> bool {
        match self.policy_type {
            PolicyType::ByAmount => {
                if !self.unit.is_time_based() {
                    return chunk.count() as f64 >= self.amount;
                }
                let Some(mut span) = chunk.time_range() else {
                    return false;
                };
                span.extend_to(incoming_ts);
                self.unit
                    .apply(&span)
                    .is_some_and(|elapsed| elapsed as f64 >= self.amount)
            }
        }
    }
}

/// Decides when the oldest chunk has to go.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationPolicy {
    policy_type: PolicyType,
    amount: f64,
    unit: Unit,
}

impl RotationPolicy {
    /// Retain at most `amount` points
    pub fn points(amount: usize) -> Self {
        Self {
            policy_type: PolicyType::ByAmount,
            amount: amount.max(1) as f64,
            unit: Unit::Points,
        }
    }

    pub fn from_config(config: &PolicyConfig) -> Result<Self> {
        validate_amount("rotation policy", config)?;
        Ok(Self {
            policy_type: config.policy_type,
            amount: config.amount,
            unit: config.unit,
        })
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    /// Point budget, if this policy counts points
    pub fn max_points(&self) -> Option<usize> {
        (self.unit == Unit::Points).then_some(self.amount as usize)
    }

    /// Whether the retained window is over budget
    pub fn is_exceeded(&self, chunks: &VecDeque<Chunk>, count: usize) -> bool {
        match self.policy_type {
            PolicyType::ByAmount => {
                if self.unit == Unit::Points {
                    return count as f64 > self.amount;
                }
                // A time window never evicts the chunk holding the newest point.
                if chunks.len() < 2 {
                    return false;
                }
                let oldest = chunks.front().and_then(Chunk::time_range);
                let newest = chunks.back().and_then(Chunk::time_range);
                match (oldest, newest) {
                    (Some(oldest), Some(newest)) => {
                        let window = TimeRange::new(oldest.begin(), newest.end());
                        self.unit
                            .apply(&window)
                            .is_some_and(|elapsed| elapsed as f64 > self.amount)
                    }
                    _ => false,
                }
            }
        }
    }
}

/// Reject policy pairs that would evict a chunk before it fills.
pub fn validate_pair(chunking: &ChunkingPolicy, rotation: &RotationPolicy) -> Result<()> {
    if chunking.unit == Unit::Points
        && rotation.unit == Unit::Points
        && rotation.amount < chunking.amount
    {
        return Err(ConfigError::RotationSmallerThanChunk {
            rotation: rotation.amount,
            rotation_unit: rotation.unit,
            chunk: chunking.amount,
            chunk_unit: chunking.unit,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(amount: f64, unit: Unit) -> PolicyConfig {
        PolicyConfig {
            policy_type: PolicyType::ByAmount,
            amount,
            unit,
        }
    }

    #[test]
    fn test_points_chunking() {
        let policy = ChunkingPolicy::points(3);
        let mut chunk = Chunk::new();
        assert!(!policy.is_full(&chunk, 0));
        for i in 0..3 {
            chunk.push(i, i as f64);
        }
        assert!(policy.is_full(&chunk, 3));
    }

    #[test]
    fn test_time_chunking() {
        let policy = ChunkingPolicy::from_config(&config(1.0, Unit::Seconds)).unwrap();
        let mut chunk = Chunk::new();
        chunk.push(0, 1.0);
        chunk.push(400, 1.0);
        assert!(!policy.is_full(&chunk, 999));
        assert!(policy.is_full(&chunk, 1_000));
    }

    #[test]
    fn test_rejects_bad_amounts() {
        assert!(matches!(
            ChunkingPolicy::from_config(&config(0.0, Unit::Points)),
            Err(ConfigError::NonPositiveAmount { .. })
        ));
        assert!(matches!(
            RotationPolicy::from_config(&config(-5.0, Unit::Hours)),
            Err(ConfigError::NonPositiveAmount { .. })
        ));
        assert!(matches!(
            RotationPolicy::from_config(&config(10.5, Unit::Points)),
            Err(ConfigError::FractionalPoints { .. })
        ));
        assert!(RotationPolicy::from_config(&config(f64::NAN, Unit::Days)).is_err());
    }

    #[test]
    fn test_rotation_must_hold_a_chunk() {
        let chunking = ChunkingPolicy::points(10);
        assert!(validate_pair(&chunking, &RotationPolicy::points(5)).is_err());
        assert!(validate_pair(&chunking, &RotationPolicy::points(10)).is_ok());
    }

    #[test]
    fn test_time_rotation_keeps_newest_chunk() {
        let policy = RotationPolicy::from_config(&config(1.0, Unit::Seconds)).unwrap();
        let mut only = Chunk::new();
        only.push(0, 1.0);
        only.push(10_000, 1.0);
        let mut chunks: VecDeque<Chunk> = [only].into_iter().collect();
        assert!(!policy.is_exceeded(&chunks, 2));

        let mut newer = Chunk::new();
        newer.push(11_000, 1.0);
        chunks.push_back(newer);
        assert!(policy.is_exceeded(&chunks, 3));
    }

    #[test]
    fn test_points_rotation() {
        let policy = RotationPolicy::points(10);
        assert!(!policy.is_exceeded(&VecDeque::new(), 10));
        assert!(policy.is_exceeded(&VecDeque::new(), 11));
        assert_eq!(policy.max_points(), Some(10));
    }
}
