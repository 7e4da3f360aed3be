//! E2E tests for the configurable custom source
//!
//! Column mapping, range validation, pluggable line parsers and appending
//! rows to a running source.

use sampleflow::source::LineParser;
use sampleflow::{CustomSource, ParseConfig, Source, SourceError, SourceState, ValidationRule};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

/// Test mapping columns and rejecting out-of-range readings
#[test]
fn test_mapping_and_validation_from_payload() {
    let file = write_temp("% sensor dump\nts;temp;hum\n0;21.5;40\n1;999;41\n2;22.0;nan\n3;22.5;42\n");
    let payload = format!(
        "path={};delimiter=semicolon;comment=%;columns=0:time,1:temperature;min=-50;max=100",
        file.path().display()
    );

    let mut source = CustomSource::new();
    source.initialize(&payload).unwrap();
    source.start().unwrap();

    let store = source.store();
    assert_eq!(store.field_names(), ["time", "temperature", "hum"]);
    assert_eq!(store.series("time"), [0.0, 3.0]);
    assert_eq!(store.series("temperature"), [21.5, 22.5]);
    assert_eq!(store.series("hum"), [40.0, 42.0]);

    let stats = source.statistics();
    assert_eq!(stats.total_points, 4);
    assert_eq!(stats.valid_points, 2);
    assert_eq!(stats.skipped_points, 2);
    assert_eq!(stats.ranges["temperature"], (21.5, 22.5));
}

/// Test a closure parser for a key=value line format
#[test]
fn test_closure_parser() {
    let file = write_temp("a=1 b=2\na=3 b=oops\na=5 b=6\n");
    let mut source = CustomSource::with_path(file.path());
    source.set_parse_config(ParseConfig {
        has_header: false,
        ..ParseConfig::default()
    });
    source.set_parser(Box::new(|line: &str| {
        line.split_whitespace()
            .map(|pair| pair.split_once('=')?.1.parse::<f64>().ok())
            .collect::<Option<Vec<f64>>>()
    }));
    source.start().unwrap();

    assert_eq!(source.store().series("Column_1"), [1.0, 5.0]);
    assert_eq!(source.store().series("Column_2"), [2.0, 6.0]);
    assert_eq!(source.statistics().skipped_points, 1);
}

/// Parser that only accepts lines tagged with a prefix
struct TaggedParser {
    tag: String,
    delimiter: char,
}

impl LineParser for TaggedParser {
    fn parse_line(&self, line: &str) -> Option<Vec<f64>> {
        line.strip_prefix(self.tag.as_str())?
            .split(self.delimiter)
            .map(|t| t.trim().parse().ok())
            .collect()
    }

    fn validate_format(&self, line: &str) -> bool {
        line.starts_with(&self.tag)
    }

    fn configure(&mut self, delimiter: &str) {
        if let Some(c) = delimiter.chars().next() {
            self.delimiter = c;
        }
    }
}

/// Test that a trait parser receives the configured delimiter
#[test]
fn test_trait_parser_is_configured() {
    let file = write_temp("DATA 1|2\nNOISE 3|4\nDATA 5|6\n");
    let mut source = CustomSource::new();
    source.set_parser(Box::new(TaggedParser {
        tag: "DATA ".to_string(),
        delimiter: ',',
    }));
    let payload = format!("path={};delimiter=pipe;header=false", file.path().display());
    source.initialize(&payload).unwrap();
    source.start().unwrap();

    assert_eq!(source.store().series("Column_1"), [1.0, 5.0]);
    assert_eq!(source.statistics().skipped_points, 1);
}

/// Test appending rows: validation, NaN padding and new columns
#[test]
fn test_append_rows() {
    let file = write_temp("x,y\n1,10\n");
    let mut source = CustomSource::with_path(file.path());
    source.set_parse_config(ParseConfig {
        validation: ValidationRule {
            min_value: 0.0,
            max_value: 100.0,
            ..ValidationRule::default()
        },
        ..ParseConfig::default()
    });

    assert!(matches!(
        source.append_data(&[vec![1.0]]),
        Err(SourceError::NotRunning)
    ));

    source.start().unwrap();
    let accepted = source
        .append_data(&[vec![2.0], vec![3.0, 30.0, 300.0], vec![4.0, 40.0, 7.0]])
        .unwrap();
    assert_eq!(accepted, 2);

    let store = source.store();
    assert_eq!(store.len(), 3);
    assert_eq!(store.series("x"), [1.0, 2.0, 4.0]);
    assert_eq!(store.series("y")[0], 10.0);
    assert!(store.series("y")[1].is_nan());
    let third = store.series("Column_3");
    assert!(third[0].is_nan() && third[1].is_nan());
    assert_eq!(third[2], 7.0);
    assert!(source.has_new_data());
}

/// Test that unknown payload keys are rejected
#[test]
fn test_unknown_key_rejected() {
    let mut source = CustomSource::new();
    let err = source.initialize("path=a.csv;colour=red").unwrap_err();
    assert!(matches!(err, SourceError::InvalidConfig(_)));
    assert_eq!(source.state(), SourceState::Stopped);
}
