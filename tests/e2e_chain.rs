//! E2E tests for transform chains
//!
//! Loads files through the file source and runs them through registered
//! built-in transforms.

use approx::assert_relative_eq;
use sampleflow::source::file::load_file;
use sampleflow::transform::builtin;
use sampleflow::{
    Capability, ChainEngine, ChainError, LowPassFilter, MovingAverageFilter, ParamValue,
    SampleStore, Transform, TransformKind,
};
use std::io::Write;
use tempfile::NamedTempFile;

fn xy_store() -> SampleStore {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"x,y\n1,10\n2,20\n3,30\n").unwrap();
    load_file(file.path()).unwrap().0
}

fn engine(names: &[&str]) -> ChainEngine {
    let mut engine = ChainEngine::new();
    for name in names {
        engine.register(name, builtin(name).unwrap()).unwrap();
    }
    engine
}

/// Test that a rejected window size aborts the chain before export runs
#[test]
fn test_rejected_window_aborts_chain() {
    let mut engine = engine(&["movavg", "export"]);
    assert!(engine
        .set_parameter("movavg", "window_size", ParamValue::Int(0))
        .is_err());

    let input = xy_store();
    let mut output = SampleStore::new();
    let result = engine.run_chain(&["movavg", "export"], &input, &mut output);

    assert!(matches!(result, Err(ChainError::StageFailed { ref stage, .. }) if stage == "movavg"));
    assert!(output.is_empty());
    assert_eq!(output.field_count(), 0);

    let export = engine.stats("export").unwrap();
    assert_eq!(export.run_count, 0);
    assert_eq!(export.total_processed_count, 0);
    assert!(engine.stats("movavg").unwrap().last_error.is_some());
}

/// Test a full filter, interpolation and export chain
#[test]
fn test_filter_interpolate_export_chain() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("result.csv");

    let mut input = SampleStore::new();
    input.add_series("a", vec![2.0; 5]);
    input.add_series("b", vec![2.0; 5]);

    let mut engine = engine(&["movavg", "interp", "csv"]);
    engine
        .set_parameter("movavg", "window_size", ParamValue::Int(3))
        .unwrap();
    engine
        .set_parameter("interp", "step_size", ParamValue::Float(0.5))
        .unwrap();
    engine
        .set_parameter("csv", "output_path", ParamValue::from(csv_path.to_str().unwrap()))
        .unwrap();

    let mut summary = SampleStore::new();
    engine
        .run_chain(&["movavg", "interp", "csv"], &input, &mut summary)
        .unwrap();

    // floor(5 / 0.5) resampled points
    assert_eq!(summary.series("total_points"), [10.0]);
    assert_eq!(summary.series("field_count"), [2.0]);

    let written = std::fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 11);
    assert_eq!(lines[0], "a,b");
    assert!(lines[1..].iter().all(|line| *line == "2,2"));

    for name in ["movavg", "interp", "csv"] {
        let stats = engine.stats(name).unwrap();
        assert_eq!(stats.run_count, 1);
        assert!(stats.last_error.is_none());
    }
}

/// Test that the moving average state carries across fields
#[test]
fn test_moving_average_carries_across_fields() {
    let mut engine = engine(&["movavg"]);
    engine
        .set_parameter("movavg", "window_size", ParamValue::Int(2))
        .unwrap();

    let mut output = SampleStore::new();
    engine.run_one("movavg", &xy_store(), &mut output).unwrap();

    assert_eq!(output.series("x"), [1.0, 1.5, 2.5]);
    // First y value averages with the last x value
    assert_eq!(output.series("y"), [6.5, 15.0, 25.0]);
}

/// Test that a unit step through a first-order low-pass never overshoots
#[test]
fn test_low_pass_step_response() {
    let mut filter = LowPassFilter::new();
    filter
        .set_parameter("filter_order", ParamValue::Int(1))
        .unwrap();
    filter
        .set_parameter("cutoff_frequency", ParamValue::Float(0.05))
        .unwrap();
    filter.initialize().unwrap();

    let mut step = vec![0.0; 10];
    step.extend(std::iter::repeat(1.0).take(200));
    let mut input = SampleStore::new();
    input.add_series("signal", step);

    let mut output = SampleStore::new();
    filter.process_data(&input, &mut output).unwrap();
    let y = output.series("signal");

    assert!(y.windows(2).all(|w| w[1] >= w[0] - 1e-12));
    assert!(y.iter().all(|v| *v <= 1.0 + 1e-12));
    assert_relative_eq!(y[y.len() - 1], 1.0, epsilon = 1e-3);
}

/// Test real-time routing through the engine matches batch output
#[test]
fn test_real_time_matches_batch() {
    let mut engine = ChainEngine::new();
    engine
        .register("smooth", Box::new(MovingAverageFilter::new()))
        .unwrap();

    let values = [4.0, 8.0, 6.0, 2.0, 10.0, 0.0, 5.0];
    let streamed: Vec<f64> = values
        .iter()
        .map(|&v| engine.run_real_time("smooth", v).unwrap())
        .collect();

    engine.reload("smooth").unwrap();
    let mut input = SampleStore::new();
    input.add_series("v", values.to_vec());
    let mut output = SampleStore::new();
    engine.run_one("smooth", &input, &mut output).unwrap();

    for (a, b) in streamed.iter().zip(output.series("v")) {
        assert_relative_eq!(*a, *b);
    }
}

/// Test registry queries
#[test]
fn test_registry_queries() {
    let engine = engine(&["movavg", "lowpass", "interp", "csv"]);
    assert_eq!(engine.list_by_capability(Capability::RealTime), ["lowpass", "movavg"]);
    assert_eq!(engine.list_by_kind(TransformKind::Interpolation), ["interp"]);
    assert_eq!(engine.all_stats().len(), 4);
    assert!(engine.all_stats().values().all(|s| s.is_loaded && s.run_count == 0));
}

/// Test that a step too small to resample fails the stage instead of allocating
#[test]
fn test_tiny_interpolation_step_fails_stage() {
    let mut engine = engine(&["interp", "csv"]);
    engine
        .set_parameter("interp", "step_size", ParamValue::Float(1e-300))
        .unwrap();

    let mut output = SampleStore::new();
    let err = engine
        .run_chain(&["interp", "csv"], &xy_store(), &mut output)
        .unwrap_err();

    assert!(matches!(err, ChainError::StageFailed { ref stage, .. } if stage == "interp"));
    assert!(output.is_empty());
    assert_eq!(engine.stats("csv").unwrap().run_count, 0);
    assert!(engine
        .stats("interp")
        .unwrap()
        .last_error
        .as_deref()
        .unwrap()
        .contains("step_size"));
}
