//! Prometheus metrics
//!
//! Metrics live in a crate-owned registry so embedding processes can merge
//! them into their own exposition without name clashes at registration.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

fn register<C: prometheus::core::Collector + Clone + 'static>(collector: C) -> C {
    if let Err(e) = REGISTRY.register(Box::new(collector.clone())) {
        tracing::warn!(error = %e, "Metric left out of the sketchy registry");
    }
    collector
}

pub static POINTS_ANALYZED: Lazy<IntCounter> = Lazy::new(|| {
    register(
        IntCounter::new("sketchy_points_analyzed_total", "Total data points analyzed")
            .expect("valid metric"),
    )
});

pub static OUTLIERS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register(
        IntCounterVec::new(
            Opts::new(
                "sketchy_outliers_total",
                "Data points classified above NORMAL, by severity",
            ),
            &["severity"],
        )
        .expect("valid metric"),
    )
});

/// Summed over every engine in the process; an engine gives its sources
/// back when dropped.
pub static SOURCES_TRACKED: Lazy<IntGauge> = Lazy::new(|| {
    register(
        IntGauge::new(
            "sketchy_sources_tracked",
            "Sources with a live distribution, across all engines in the process",
        )
        .expect("valid metric"),
    )
});

pub static CHUNKS_EVICTED: Lazy<IntCounter> = Lazy::new(|| {
    register(
        IntCounter::new(
            "sketchy_chunks_evicted_total",
            "Chunks dropped by rotation policies",
        )
        .expect("valid metric"),
    )
});

pub static POINTS_REJECTED: Lazy<IntCounter> = Lazy::new(|| {
    register(
        IntCounter::new(
            "sketchy_points_rejected_total",
            "Non-finite values scored without entering a window",
        )
        .expect("valid metric"),
    )
});

pub static RECORDS_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    register(
        IntCounter::new(
            "sketchy_records_dropped_total",
            "Raw records or measurements that produced no data point",
        )
        .expect("valid metric"),
    )
});

pub static ANALYZE_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    register(
        Histogram::with_opts(HistogramOpts::new(
            "sketchy_analyze_duration_seconds",
            "Histogram of per-point classification latency",
        ))
        .expect("valid metric"),
    )
});

/// Text exposition of every metric in `REGISTRY`
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_registration_keeps_collector() {
        POINTS_ANALYZED.inc();
        let twin = register(
            IntCounter::new("sketchy_points_analyzed_total", "duplicate").unwrap(),
        );
        twin.inc_by(3);
        assert_eq!(twin.get(), 3);
        assert_eq!(
            render()
                .matches("# TYPE sketchy_points_analyzed_total ")
                .count(),
            1
        );
    }

    #[test]
    fn test_render_includes_registered_metrics() {
        POINTS_ANALYZED.inc();
        OUTLIERS_TOTAL.with_label_values(&["SEVERE_OUTLIER"]).inc();
        let text = render();
        assert!(text.contains("sketchy_points_analyzed_total"));
        assert!(text.contains("sketchy_outliers_total"));
    }
}
