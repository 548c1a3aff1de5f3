//! sketchy-stream - streaming outlier detection from the command line
//!
//! Usage:
//!   sketchy-stream run --extractor extractor.json --config outlier.json < data.csv
//!   sketchy-stream run --extractor extractor.json --input data.csv --opentsdb-url http://localhost:4242
//!   sketchy-stream simulate --sources 20 --points 5000 --print-metrics

mod pipeline;
mod simulate;

use clap::{Args, Parser, Subcommand};
use crossbeam_channel::bounded;
use pipeline::{Pipeline, PipelineConfig};
use serde::Serialize;
use simulate::{Generator, SimulationConfig, SimulationReport};
use sketchy_core::sink::{OpenTsdbConfig, OpenTsdbSink, TimeseriesSink};
use sketchy_core::{
    ConfigError, DataPointExtractor, Outlier, OutlierAlgorithm, OutlierConfig, SinkError, metrics,
};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("pipeline stopped before all input was dispatched")]
    PipelineClosed,
}

#[derive(Parser)]
#[command(name = "sketchy-stream")]
#[command(about = "Streaming outlier detection with a sketchy moving MAD")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract points from delimited records and classify them
    Run(RunArgs),

    /// Classify a synthetic stream with injected spikes and report accuracy
    Simulate(SimulateArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Extractor configuration (JSON)
    #[arg(short, long)]
    extractor: PathBuf,

    /// Outlier engine configuration (JSON); built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input file; stdin when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Number of shard workers
    #[arg(long)]
    shards: Option<usize>,

    /// Emit NORMAL results too
    #[arg(long)]
    all: bool,

    /// Persist series and outliers to this OpenTSDB endpoint
    #[arg(long)]
    opentsdb_url: Option<String>,

    /// Print Prometheus metrics to stderr on exit
    #[arg(long)]
    print_metrics: bool,
}

#[derive(Args)]
struct SimulateArgs {
    /// Outlier engine configuration (JSON); built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "10")]
    sources: usize,

    /// Points per source
    #[arg(long, default_value = "2000")]
    points: usize,

    /// Inject a spike every N points of a source (0 disables)
    #[arg(long, default_value = "250")]
    spike_every: usize,

    /// Spike distance from the baseline mean, in standard deviations
    #[arg(long, default_value = "12.0")]
    spike_sigma: f64,

    #[arg(long, default_value = "0")]
    seed: u64,

    #[arg(long)]
    shards: Option<usize>,

    /// Print Prometheus metrics to stderr on exit
    #[arg(long)]
    print_metrics: bool,
}

/// One JSON line per emitted result
#[derive(Serialize)]
struct OutlierRecord<'a> {
    source: &'a str,
    timestamp: i64,
    value: f64,
    severity: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    metadata: &'a BTreeMap<String, String>,
}

impl<'a> From<&'a Outlier> for OutlierRecord<'a> {
    fn from(outlier: &'a Outlier) -> Self {
        let point = outlier.data_point();
        Self {
            source: point.source(),
            timestamp: point.timestamp(),
            value: point.value(),
            severity: outlier.severity().as_str(),
            score: outlier.score(),
            metadata: point.metadata(),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => run_stream(args),
        Commands::Simulate(args) => run_simulate(args),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "sketchy-stream failed");
        std::process::exit(1);
    }
}

fn load_outlier_config(path: Option<&Path>) -> Result<OutlierConfig, CliError> {
    match path {
        Some(path) => Ok(OutlierConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(OutlierConfig::default()),
    }
}

fn pipeline_config(shards: Option<usize>, emit_normal: bool) -> Result<PipelineConfig, CliError> {
    let mut config = PipelineConfig {
        emit_normal,
        ..Default::default()
    };
    if let Some(shards) = shards {
        if shards == 0 {
            return Err(CliError::InvalidArgument("--shards must be at least 1".to_string()));
        }
        config.shards = shards;
    }
    Ok(config)
}

fn print_metrics() {
    eprintln!("{}", metrics::render());
}

fn run_stream(args: RunArgs) -> Result<(), CliError> {
    let outlier_config = load_outlier_config(args.config.as_deref())?;
    let extractor = DataPointExtractor::from_json(&fs::read_to_string(&args.extractor)?)?;
    let engine = Arc::new(OutlierAlgorithm::from_config(&outlier_config)?);

    // The OpenTSDB worker needs a runtime; everything else runs on plain threads.
    let runtime = tokio::runtime::Runtime::new()?;
    let _guard = runtime.enter();
    let opentsdb = match &args.opentsdb_url {
        Some(url) => Some(Arc::new(OpenTsdbSink::new(OpenTsdbConfig {
            url: url.clone(),
            ..Default::default()
        })?)),
        None => None,
    };
    let sink = opentsdb.clone().map(|s| s as Arc<dyn TimeseriesSink>);

    let (out_tx, out_rx) = bounded::<Outlier>(10_000);
    let writer = thread::Builder::new()
        .name("sketchy-output".into())
        .spawn(move || -> io::Result<u64> {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            let mut written = 0;
            for outlier in out_rx.iter() {
                serde_json::to_writer(&mut out, &OutlierRecord::from(&outlier))?;
                out.write_all(b"\n")?;
                written += 1;
            }
            out.flush()?;
            Ok(written)
        })?;

    let pipeline = Pipeline::spawn(engine, sink, out_tx, pipeline_config(args.shards, args.all)?)?;

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut records: u64 = 0;
    let mut points: u64 = 0;
    let mut dispatch_result = Ok(());
    'records: for line in reader.split(b'\n') {
        let mut line = line?;
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.is_empty() {
            continue;
        }
        let key = records.to_be_bytes();
        records += 1;
        for point in extractor.extract(&key, &line) {
            if pipeline.dispatch(point).is_err() {
                dispatch_result = Err(CliError::PipelineClosed);
                break 'records;
            }
            points += 1;
        }
    }

    let stats = pipeline.finish();
    let written = match writer.join() {
        Ok(result) => result?,
        Err(_) => {
            warn!("Output writer panicked");
            0
        }
    };

    if let Some(sink) = opentsdb {
        match Arc::try_unwrap(sink) {
            Ok(sink) => {
                let stats = runtime.block_on(sink.close());
                info!(
                    sent = stats.sent.load(Ordering::Relaxed),
                    failed = stats.failed.load(Ordering::Relaxed),
                    dropped = stats.dropped.load(Ordering::Relaxed),
                    "OpenTSDB sink closed"
                );
            }
            Err(_) => warn!("OpenTSDB sink still shared at shutdown; queued writes may be lost"),
        }
    }

    info!(
        records,
        points,
        analyzed = stats.analyzed,
        outliers = stats.outliers(),
        written,
        "Stream complete"
    );
    if args.print_metrics {
        print_metrics();
    }
    dispatch_result
}

fn run_simulate(args: SimulateArgs) -> Result<(), CliError> {
    let outlier_config = load_outlier_config(args.config.as_deref())?;
    let engine = Arc::new(OutlierAlgorithm::from_config(&outlier_config)?);

    let sim = SimulationConfig {
        sources: args.sources,
        points_per_source: args.points,
        spike_every: args.spike_every,
        spike_sigma: args.spike_sigma,
        interval_ms: 1_000,
        seed: args.seed,
    };
    let generator = Generator::new(sim).map_err(|e| CliError::InvalidArgument(e.to_string()))?;
    info!(
        sources = sim.sources,
        points = sim.points_per_source,
        spikes = simulate::expected_spikes(&sim),
        "Starting simulation"
    );

    let (out_tx, out_rx) = bounded::<Outlier>(10_000);
    let collector = thread::Builder::new()
        .name("sketchy-report".into())
        .spawn(move || {
            let mut report = SimulationReport::default();
            for outlier in out_rx.iter() {
                report.observe(&outlier);
            }
            report
        })?;

    let pipeline = Pipeline::spawn(engine, None, out_tx, pipeline_config(args.shards, false)?)?;
    for point in generator {
        if pipeline.dispatch(point).is_err() {
            return Err(CliError::PipelineClosed);
        }
    }
    let stats = pipeline.finish();

    let observed = collector
        .join()
        .map_err(|_| CliError::InvalidArgument("report collector panicked".to_string()))?;
    let mut report = SimulationReport::new(stats.analyzed, simulate::expected_spikes(&sim));
    report.detected = observed.detected;
    report.false_positives = observed.false_positives;
    let report = report.finalize();

    info!(
        recall = report.recall,
        precision = report.precision,
        "Simulation complete"
    );
    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, &report).map_err(io::Error::from)?;
    writeln!(out)?;

    if args.print_metrics {
        print_metrics();
    }
    Ok(())
}
