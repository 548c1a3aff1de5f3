//! Sharded analysis pipeline
//!
//! Points are routed to a fixed shard by a hash of their source, so every
//! source is analyzed by exactly one worker thread and in arrival order.
//! All workers share one engine; results flow into a single output channel.

use crossbeam_channel::{Receiver, SendError, Sender, bounded};
use sketchy_core::sink::{TimeseriesSink, basic_tags, outlier_tags, streaming_outlier_metric};
use sketchy_core::{DataPoint, Outlier, OutlierAlgorithm, Severity, StreamingOutlierAlgorithm};
use std::io;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub shards: usize,
    pub queue_capacity: usize,
    /// Forward `Normal` results to the output as well
    pub emit_normal: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            shards: thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            queue_capacity: 10_000,
            emit_normal: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShardStats {
    pub analyzed: u64,
    pub moderate: u64,
    pub severe: u64,
}

impl ShardStats {
    fn record(&mut self, severity: Severity) {
        self.analyzed += 1;
        match severity {
            Severity::Normal => {}
            Severity::ModerateOutlier => self.moderate += 1,
            Severity::SevereOutlier => self.severe += 1,
        }
    }

    fn merge(mut self, other: ShardStats) -> Self {
        self.analyzed += other.analyzed;
        self.moderate += other.moderate;
        self.severe += other.severe;
        self
    }

    pub fn outliers(&self) -> u64 {
        self.moderate + self.severe
    }
}

struct ShardWorker {
    id: usize,
    rx: Receiver<DataPoint>,
    engine: Arc<OutlierAlgorithm>,
    sink: Option<Arc<dyn TimeseriesSink>>,
    output: Sender<Outlier>,
    emit_normal: bool,
}

impl ShardWorker {
    fn run(self) -> ShardStats {
        debug!(shard = self.id, "Shard worker active");
        let mut stats = ShardStats::default();

        for point in self.rx.iter() {
            let outlier = self.engine.analyze(point);
            stats.record(outlier.severity());

            if let Some(sink) = &self.sink {
                persist(sink.as_ref(), &outlier);
            }

            if outlier.severity().is_outlier() {
                let point = outlier.data_point();
                warn!(
                    shard = self.id,
                    source = point.source(),
                    timestamp = point.timestamp(),
                    value = point.value(),
                    severity = outlier.severity().as_str(),
                    score = outlier.score().unwrap_or_default(),
                    "Outlier detected"
                );
            }

            if (self.emit_normal || outlier.severity().is_outlier()) && self.output.send(outlier).is_err() {
                warn!(shard = self.id, "Output closed, stopping shard");
                break;
            }
        }

        debug!(shard = self.id, analyzed = stats.analyzed, "Shard worker stopped");
        stats
    }
}

/// Write the raw point under its source, and the outlier marker beside it
fn persist(sink: &dyn TimeseriesSink, outlier: &Outlier) {
    let point = outlier.data_point();
    sink.persist(point.source(), point, &basic_tags(point), None);
    if outlier.severity().is_outlier() {
        sink.persist(
            &streaming_outlier_metric(point.source()),
            point,
            &outlier_tags(outlier.severity()),
            None,
        );
    }
}

/// Stable shard for a source
pub fn shard_for(source: &str, shards: usize) -> usize {
    (xxhash_rust::xxh3::xxh3_64(source.as_bytes()) as usize) % shards.max(1)
}

pub struct Pipeline {
    shard_txs: Vec<Sender<DataPoint>>,
    workers: Vec<thread::JoinHandle<ShardStats>>,
}

impl Pipeline {
    pub fn spawn(
        engine: Arc<OutlierAlgorithm>,
        sink: Option<Arc<dyn TimeseriesSink>>,
        output: Sender<Outlier>,
        config: PipelineConfig,
    ) -> io::Result<Self> {
        let shards = config.shards.max(1);
        let mut shard_txs = Vec::with_capacity(shards);
        let mut workers = Vec::with_capacity(shards);

        for id in 0..shards {
            let (tx, rx) = bounded::<DataPoint>(config.queue_capacity.max(1));
            let worker = ShardWorker {
                id,
                rx,
                engine: engine.clone(),
                sink: sink.clone(),
                output: output.clone(),
                emit_normal: config.emit_normal,
            };
            shard_txs.push(tx);
            workers.push(
                thread::Builder::new()
                    .name(format!("sketchy-shard-{}", id))
                    .spawn(move || worker.run())?,
            );
        }

        info!(shards, algorithm = engine.name(), "Pipeline started");
        Ok(Self { shard_txs, workers })
    }

    /// Queue a point on its source's shard, waiting while the shard is busy
    pub fn dispatch(&self, point: DataPoint) -> Result<(), SendError<DataPoint>> {
        let shard = shard_for(point.source(), self.shard_txs.len());
        self.shard_txs[shard].send(point)
    }

    /// Close the shard queues and wait for every worker to drain
    pub fn finish(self) -> ShardStats {
        let Self { shard_txs, workers } = self;
        drop(shard_txs);

        let mut total = ShardStats::default();
        for (id, handle) in workers.into_iter().enumerate() {
            match handle.join() {
                Ok(stats) => total = total.merge(stats),
                Err(_) => warn!(shard = id, "Shard worker panicked"),
            }
        }
        info!(
            analyzed = total.analyzed,
            moderate = total.moderate,
            severe = total.severe,
            "Pipeline drained"
        );
        total
    }
}
