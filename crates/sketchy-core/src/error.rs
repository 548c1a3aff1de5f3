//! Error types
//!
//! Only configuration and collaborator boundaries can fail. Classification
//! itself never returns an error for a validated engine.

use crate::signal::Severity;
use crate::unit::Unit;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("{policy} amount must be positive, got {amount}")]
    NonPositiveAmount { policy: &'static str, amount: f64 },

    #[error("{policy} amount must be a whole number of points, got {amount}")]
    FractionalPoints { policy: &'static str, amount: f64 },

    #[error(
        "rotation policy ({rotation} {rotation_unit}) must retain at least one full chunk ({chunk} {chunk_unit})"
    )]
    RotationSmallerThanChunk {
        rotation: f64,
        rotation_unit: Unit,
        chunk: f64,
        chunk_unit: Unit,
    },

    #[error("no z-score cutoffs configured")]
    MissingCutoffs,

    #[error("z-score cutoff for {0} is not allowed")]
    NormalCutoff(Severity),

    #[error("z-score cutoff for {severity} must be finite and positive, got {threshold}")]
    InvalidCutoff { severity: Severity, threshold: f64 },

    #[error("z-score cutoffs must increase with severity: {lower} >= {higher}")]
    NonMonotonicCutoffs { lower: Severity, higher: Severity },

    #[error("invalid global statistics: {0}")]
    InvalidGlobalStatistics(String),

    #[error("invalid extractor configuration: {0}")]
    InvalidExtractor(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Failures reported by a time-series sink.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("sink returned status {0}")]
    Status(u16),

    #[error("failed to decode sink response: {0}")]
    Decode(String),

    #[error("sink queue full, point dropped")]
    Backpressure,

    #[error("sink is closed")]
    Closed,
}
