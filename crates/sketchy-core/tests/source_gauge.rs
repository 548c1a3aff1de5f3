use sketchy_core::metrics::SOURCES_TRACKED;
use sketchy_core::{DataPoint, OutlierConfig, SketchyMovingMad};

// Only test in this binary: the gauge is process-wide.
#[test]
fn test_sources_gauge_follows_engine_lifetime() {
    let base = SOURCES_TRACKED.get();
    let first = SketchyMovingMad::from_config(&OutlierConfig::default()).unwrap();
    let second = SketchyMovingMad::from_config(&OutlierConfig::default()).unwrap();

    for source in ["a", "b", "c"] {
        first.analyze(DataPoint::new(0, 1.0, source));
        first.analyze(DataPoint::new(1, 2.0, source));
    }
    for source in ["a", "d"] {
        second.analyze(DataPoint::new(0, 1.0, source));
    }
    assert_eq!(SOURCES_TRACKED.get() - base, 5);

    drop(first);
    assert_eq!(SOURCES_TRACKED.get() - base, 2);
    drop(second);
    assert_eq!(SOURCES_TRACKED.get(), base);
}
