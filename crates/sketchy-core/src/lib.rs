//! Streaming outlier detection over per-source approximate sliding windows.
//!
//! Raw records are turned into `DataPoint`s by a configured extractor, each
//! point is scored by `SketchyMovingMad` against its source's recent history,
//! and the resulting `Outlier`s can be persisted through a `TimeseriesSink`.

pub mod algo;
pub mod config;
pub mod distribution;
pub mod error;
pub mod extract;
pub mod metrics;
pub mod point;
pub mod registry;
pub mod signal;
pub mod sink;
pub mod unit;

pub use algo::{OutlierAlgorithm, SketchyMovingMad, StreamingOutlierAlgorithm};
pub use config::{GlobalStatistics, GlobalStatisticsMode, OutlierConfig};
pub use error::{ConfigError, SinkError};
pub use extract::{DataPointExtractor, DataPointExtractorConfig};
pub use point::{DataPoint, TimeRange};
pub use signal::{Outlier, Severity};
pub use unit::Unit;
