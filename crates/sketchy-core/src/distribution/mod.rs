//! Per-source windowed distribution
//!
//! A distribution is a queue of chunks. New values go into the newest
//! chunk; when the rotation policy reports the window over budget the
//! oldest chunk is dropped whole. Memory is therefore bounded by the
//! rotation policy, and the window lags a true sliding window by at most
//! one chunk.

pub mod chunk;
pub mod policy;

pub use chunk::Chunk;
pub use policy::{ChunkingPolicy, RotationPolicy};

use crate::config::GlobalStatistics;
use crate::point::TimeRange;
use std::collections::VecDeque;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct Distribution {
    chunks: VecDeque<Chunk>,
    chunking: ChunkingPolicy,
    rotation: RotationPolicy,
    global_statistics: Option<GlobalStatistics>,
    count: usize,
    observed: u64,
    evicted_chunks: u64,
}

impl Distribution {
    pub fn new(chunking: ChunkingPolicy, rotation: RotationPolicy) -> Self {
        Self {
            chunks: VecDeque::new(),
            chunking,
            rotation,
            global_statistics: None,
            count: 0,
            observed: 0,
            evicted_chunks: 0,
        }
    }

    pub fn with_global_statistics(mut self, global_statistics: Option<GlobalStatistics>) -> Self {
        self.global_statistics = global_statistics;
        self
    }

    /// Add a value, then rotate.
    ///
    /// The value always lands in a chunk; a new one is opened first when
    /// the current chunk is full. Returns the number of chunks evicted.
    pub fn append(&mut self, timestamp: i64, value: f64) -> usize {
        if self.needs_new_chunk(timestamp) {
            let capacity = match self.chunking.unit().is_time_based() {
                true => 0,
                false => self.chunking.amount() as usize,
            };
            self.chunks.push_back(Chunk::with_capacity(capacity));
        }

        if let Some(open) = self.chunks.back_mut() {
            open.push(timestamp, value);
            self.count += 1;
            self.observed += 1;
        }

        self.rotate()
    }

    fn needs_new_chunk(&self, timestamp: i64) -> bool {
        let Some(open) = self.chunks.back() else {
            return true;
        };
        if self.chunking.is_full(open, timestamp) {
            return true;
        }
        // A chunk may never outgrow the point budget, or evicting it would
        // take the newest value with it.
        self.rotation
            .max_points()
            .is_some_and(|max| open.count() >= max)
    }

    fn rotate(&mut self) -> usize {
        let mut evicted = 0;
        while self.rotation.is_exceeded(&self.chunks, self.count) {
            let Some(oldest) = self.chunks.pop_front() else {
                break;
            };
            self.count -= oldest.count();
            evicted += 1;
        }
        if evicted > 0 {
            self.evicted_chunks += evicted as u64;
            trace!(evicted, retained = self.count, "Rotated distribution");
        }
        evicted
    }

    /// Snapshot of all retained values, oldest first
    pub fn retained_values(&self) -> Vec<f64> {
        let mut values = Vec::with_capacity(self.count);
        for chunk in &self.chunks {
            values.extend_from_slice(chunk.values());
        }
        values
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Values ever appended, including those since evicted
    pub fn observed(&self) -> u64 {
        self.observed
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    /// Span from the oldest retained timestamp to the newest
    pub fn time_range(&self) -> Option<TimeRange> {
        let mut range: Option<TimeRange> = None;
        for span in self.chunks.iter().filter_map(Chunk::time_range) {
            match range.as_mut() {
                Some(r) => {
                    r.extend_to(span.begin());
                    r.extend_to(span.end());
                }
                None => range = Some(span),
            }
        }
        range
    }

    pub fn global_statistics(&self) -> Option<&GlobalStatistics> {
        self.global_statistics.as_ref()
    }

    pub fn chunking_policy(&self) -> &ChunkingPolicy {
        &self.chunking
    }

    pub fn rotation_policy(&self) -> &RotationPolicy {
        &self.rotation
    }

    /// Total chunks dropped over the lifetime of this distribution
    pub fn evicted_chunks(&self) -> u64 {
        self.evicted_chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PolicyConfig, PolicyType};
    use crate::unit::Unit;

    fn points(chunk: usize, rotation: usize) -> Distribution {
        Distribution::new(ChunkingPolicy::points(chunk), RotationPolicy::points(rotation))
    }

    #[test]
    fn test_append_fills_chunks_in_order() {
        let mut dist = points(3, 100);
        for i in 0..7 {
            dist.append(i, i as f64);
        }
        assert_eq!(dist.count(), 7);
        assert_eq!(dist.chunk_count(), 3);
        let sizes: Vec<usize> = dist.chunks().map(Chunk::count).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(
            dist.retained_values(),
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
        );
    }

    #[test]
    fn test_rotation_evicts_whole_oldest_chunk() {
        let mut dist = points(10, 100);
        for i in 0..100 {
            assert_eq!(dist.append(i, i as f64), 0);
        }
        assert_eq!(dist.count(), 100);

        // 101st value opens chunk 11 and pushes out the first ten.
        assert_eq!(dist.append(100, 100.0), 1);
        assert_eq!(dist.count(), 91);
        assert_eq!(dist.observed(), 101);
        assert_eq!(dist.chunk_count(), 10);
        assert_eq!(dist.retained_values().first(), Some(&10.0));
        assert_eq!(dist.retained_values().last(), Some(&100.0));
        assert_eq!(dist.evicted_chunks(), 1);
    }

    #[test]
    fn test_count_stays_within_budget() {
        let mut dist = points(10, 100);
        for i in 0..10_000 {
            dist.append(i, (i % 37) as f64);
            assert!(dist.count() <= 100);
            assert!(dist.chunk_count() <= 11);
            assert!(dist.chunks().all(|c| c.count() <= 10));
            if i >= 100 {
                assert!(dist.count() > 90);
            }
        }
    }

    #[test]
    fn test_time_based_window() {
        let chunking = ChunkingPolicy::from_config(&PolicyConfig {
            policy_type: PolicyType::ByAmount,
            amount: 1.0,
            unit: Unit::Seconds,
        })
        .unwrap();
        let rotation = RotationPolicy::from_config(&PolicyConfig {
            policy_type: PolicyType::ByAmount,
            amount: 3.0,
            unit: Unit::Seconds,
        })
        .unwrap();
        let mut dist = Distribution::new(chunking, rotation);

        // Ten points per second for ten seconds
        for i in 0..100 {
            dist.append(i * 100, 1.0);
        }

        let range = dist.time_range().unwrap();
        assert!(range.duration_ms() <= 3_999, "window too wide: {:?}", range);
        assert!(dist.chunk_count() <= 4);
        assert_eq!(range.end(), 9_900);
    }

    #[test]
    fn test_point_budget_caps_time_chunks() {
        let chunking = ChunkingPolicy::from_config(&PolicyConfig {
            policy_type: PolicyType::ByAmount,
            amount: 1.0,
            unit: Unit::Days,
        })
        .unwrap();
        let mut dist = Distribution::new(chunking, RotationPolicy::points(5));
        for i in 0..12 {
            dist.append(i, i as f64);
            assert!(dist.count() <= 5);
            assert!(!dist.is_empty());
        }
        assert_eq!(dist.count(), 2);
        assert_eq!(dist.retained_values().last(), Some(&11.0));
    }
}
