//! OpenTSDB HTTP sink
//!
//! Writes go through a bounded queue to a background worker that batches
//! them into `POST /api/put` calls, retrying with exponential backoff. A full
//! queue drops the write rather than stalling the caller.

use super::{PersistCallback, SERIES_TAG_VALUE, TYPE_TAG_KEY, Tags, TimeseriesSink, query_window};
use crate::error::SinkError;
use crate::point::{DataPoint, TimeRange};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const DEFAULT_OPENTSDB_URL: &str = "http://localhost:4242";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OpenTsdbConfig {
    pub url: String,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub channel_capacity: usize,
    pub timeout_ms: u64,
    /// OpenTSDB downsampler for context queries, e.g. `1m-avg`
    pub downsample: Option<String>,
}

impl Default for OpenTsdbConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_OPENTSDB_URL.to_string(),
            batch_size: 50,
            flush_interval_ms: 1000,
            max_retries: 3,
            retry_base_delay_ms: 100,
            channel_capacity: 10_000,
            timeout_ms: 5000,
            downsample: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct SinkStats {
    pub sent: AtomicU64,
    pub failed: AtomicU64,
    pub retried: AtomicU64,
    pub dropped: AtomicU64,
    pub batches: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
struct PutRequest {
    metric: String,
    timestamp: i64,
    value: f64,
    tags: Tags,
}

struct Pending {
    put: PutRequest,
    callback: Option<PersistCallback>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    start: i64,
    end: i64,
    ms_resolution: bool,
    queries: [SubQuery<'a>; 1],
}

#[derive(Debug, Serialize)]
struct SubQuery<'a> {
    aggregator: &'static str,
    metric: &'a str,
    tags: Tags,
    #[serde(skip_serializing_if = "Option::is_none")]
    downsample: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    tags: Tags,
    #[serde(default)]
    dps: BTreeMap<String, f64>,
}

pub struct OpenTsdbSink {
    tx: mpsc::Sender<Pending>,
    stats: Arc<SinkStats>,
    client: reqwest::Client,
    config: OpenTsdbConfig,
    worker: JoinHandle<()>,
}

impl OpenTsdbSink {
    /// Start the sink; its worker runs on the current tokio runtime.
    pub fn new(config: OpenTsdbConfig) -> Result<Self, SinkError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| SinkError::Transport(format!("no tokio runtime: {}", e)))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let stats = Arc::new(SinkStats::default());
        let worker = handle.spawn(Self::worker(
            rx,
            client.clone(),
            config.clone(),
            stats.clone(),
        ));

        Ok(Self {
            tx,
            stats,
            client,
            config,
            worker,
        })
    }

    pub fn stats(&self) -> &SinkStats {
        &self.stats
    }

    pub fn config(&self) -> &OpenTsdbConfig {
        &self.config
    }

    /// Stop accepting writes, wait for queued ones to be flushed and hand
    /// back the final counters
    pub async fn close(self) -> Arc<SinkStats> {
        let Self { tx, stats, worker, .. } = self;
        drop(tx);
        if let Err(e) = worker.await {
            error!(error = %e, "OpenTSDB worker terminated abnormally");
        }
        stats
    }

    fn try_send(&self, pending: Pending) -> Result<(), SinkError> {
        let (pending, err) = match self.tx.try_send(pending) {
            Ok(()) => return Ok(()),
            Err(mpsc::error::TrySendError::Full(pending)) => (pending, SinkError::Backpressure),
            Err(mpsc::error::TrySendError::Closed(pending)) => (pending, SinkError::Closed),
        };
        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        if let Some(callback) = pending.callback {
            callback(Err(err.clone()));
        }
        Err(err)
    }

    async fn worker(
        mut rx: mpsc::Receiver<Pending>,
        client: reqwest::Client,
        config: OpenTsdbConfig,
        stats: Arc<SinkStats>,
    ) {
        let url = format!("{}/api/put", config.url.trim_end_matches('/'));
        let batch_size = config.batch_size.max(1);
        let mut batch: Vec<Pending> = Vec::with_capacity(batch_size);
        let mut interval = tokio::time::interval(Duration::from_millis(config.flush_interval_ms.max(1)));

        info!(url = %url, "OpenTSDB sink started");

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(pending) => {
                        batch.push(pending);
                        if batch.len() >= batch_size {
                            Self::flush_batch(&client, &url, &mut batch, &config, &stats).await;
                        }
                    }
                    None => break,
                },
                _ = interval.tick() => {
                    if !batch.is_empty() {
                        Self::flush_batch(&client, &url, &mut batch, &config, &stats).await;
                    }
                }
            }
        }

        if !batch.is_empty() {
            Self::flush_batch(&client, &url, &mut batch, &config, &stats).await;
        }

        info!("OpenTSDB sink stopped");
    }

    async fn flush_batch(
        client: &reqwest::Client,
        url: &str,
        batch: &mut Vec<Pending>,
        config: &OpenTsdbConfig,
        stats: &SinkStats,
    ) {
        if batch.is_empty() {
            return;
        }

        let (puts, callbacks): (Vec<PutRequest>, Vec<Option<PersistCallback>>) = std::mem::take(batch)
            .into_iter()
            .map(|p| (p.put, p.callback))
            .unzip();
        let count = puts.len();
        let mut last_error = SinkError::Closed;

        for attempt in 0..=config.max_retries {
            match client.post(url).json(&puts).send().await {
                Ok(response) if response.status().is_success() => {
                    stats.sent.fetch_add(count as u64, Ordering::Relaxed);
                    stats.batches.fetch_add(1, Ordering::Relaxed);
                    debug!(count, "Wrote points to OpenTSDB");
                    complete(callbacks, Ok(()));
                    return;
                }
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        warn!(attempt, status = %status, "OpenTSDB rate limited");
                    } else {
                        warn!(attempt, status = %status, "OpenTSDB returned error");
                    }
                    last_error = SinkError::Status(status.as_u16());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Failed to write to OpenTSDB");
                    last_error = SinkError::Transport(e.to_string());
                }
            }

            if attempt < config.max_retries {
                stats.retried.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(backoff_delay(config.retry_base_delay_ms, attempt)).await;
            }
        }

        stats.failed.fetch_add(count as u64, Ordering::Relaxed);
        error!(count, error = %last_error, "Dropped points after max retries");
        complete(callbacks, Err(last_error));
    }
}

/// Exponential backoff, doubling up to 2^16 times the base
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(1u64 << attempt.min(16)))
}

fn complete(callbacks: Vec<Option<PersistCallback>>, result: Result<(), SinkError>) {
    for callback in callbacks.into_iter().flatten() {
        callback(result.clone());
    }
}

#[async_trait]
impl TimeseriesSink for OpenTsdbSink {
    fn persist(&self, metric: &str, point: &DataPoint, tags: &Tags, callback: Option<PersistCallback>) {
        let pending = Pending {
            put: PutRequest {
                metric: metric.to_string(),
                timestamp: point.timestamp(),
                value: point.value(),
                tags: tags.clone(),
            },
            callback,
        };
        if let Err(e) = self.try_send(pending) {
            debug!(metric, error = %e, "OpenTSDB write not queued");
        }
    }

    async fn retrieve(
        &self,
        metric: &str,
        reference: &DataPoint,
        range: TimeRange,
    ) -> Result<Vec<DataPoint>, SinkError> {
        let Some(window) = query_window(reference, range) else {
            return Ok(Vec::new());
        };
        let request = QueryRequest {
            start: window.begin(),
            end: window.end(),
            ms_resolution: true,
            queries: [SubQuery {
                aggregator: "avg",
                metric,
                tags: Tags::from([(TYPE_TAG_KEY.to_string(), SERIES_TAG_VALUE.to_string())]),
                downsample: self.config.downsample.as_deref(),
            }],
        };

        let url = format!("{}/api/query", self.config.url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SinkError::Status(response.status().as_u16()));
        }
        let results: Vec<QueryResult> = response
            .json()
            .await
            .map_err(|e| SinkError::Decode(e.to_string()))?;

        decode_points(metric, results, window)
    }
}

fn decode_points(
    metric: &str,
    results: Vec<QueryResult>,
    window: TimeRange,
) -> Result<Vec<DataPoint>, SinkError> {
    let mut points = Vec::new();
    for result in results {
        for (ts, value) in result.dps {
            let ts: i64 = ts
                .parse()
                .map_err(|_| SinkError::Decode(format!("bad timestamp '{}'", ts)))?;
            if window.contains(ts) {
                points.push(DataPoint::new(ts, value, metric).with_metadata(result.tags.clone()));
            }
        }
    }
    // dps keys are strings, so map order is lexical
    points.sort_by_key(DataPoint::timestamp);
    Ok(points)
}
