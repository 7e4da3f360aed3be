//! CSV export
//!
//! Values are written in store field order, one row per sample index.
//! Integral values have no decimal point; other values use `precision`
//! significant digits.

use super::{ParamValue, Transform, TransformError, TransformKind, TransformState};
use crate::store::SampleStore;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

/// File extensions this exporter writes
pub const SUPPORTED_FORMATS: [&str; 2] = ["csv", "txt"];

/// Highest significant-digit precision
pub const MAX_PRECISION: i64 = 15;

/// Output text encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    /// Characters above 0x7F become `?`
    Ascii,
    /// ISO-8859-1; characters above 0xFF become `?`
    Latin1,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Ascii => "ASCII",
            Self::Latin1 => "Latin1",
        }
    }

    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => text.as_bytes().to_vec(),
            Self::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
            Self::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "ascii" | "us-ascii" => Ok(Self::Ascii),
            "latin1" | "latin-1" | "iso-8859-1" => Ok(Self::Latin1),
            _ => Err(format!("unsupported encoding: {}", s)),
        }
    }
}

/// Quote a cell if it contains the delimiter, a quote, or a line break
///
/// # Example
/// ```
/// use sampleflow_core::transform::export::escape_field;
///
/// assert_eq!(escape_field("plain", ","), "plain");
/// assert_eq!(escape_field("a,b", ","), "\"a,b\"");
/// assert_eq!(escape_field("say \"hi\"", ","), "\"say \"\"hi\"\"\"");
/// ```
pub fn escape_field(text: &str, delimiter: &str) -> String {
    let needs_quotes = text.contains(delimiter)
        || text.contains('"')
        || text.contains('\n')
        || text.contains('\r');
    if needs_quotes {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

/// Render a value: integers without a decimal point, others at `precision`
/// significant digits with trailing zeros removed
pub fn format_value(value: f64, precision: usize) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }

    let digits = precision.max(1);
    let scientific = format!("{:.*e}", digits - 1, value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return value.to_string();
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return value.to_string();
    };

    if exponent < -4 || exponent >= digits as i32 {
        format!("{}e{}", trim_fraction(mantissa), exponent)
    } else {
        let decimals = (digits as i32 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

/// CSV exporter
#[derive(Debug, Clone)]
pub struct CsvExport {
    state: TransformState,
    delimiter: String,
    include_header: bool,
    encoding: Encoding,
    precision: usize,
    output_path: Option<PathBuf>,
}

impl CsvExport {
    pub fn new() -> Self {
        Self {
            state: TransformState::default(),
            delimiter: ",".to_string(),
            include_header: true,
            encoding: Encoding::Utf8,
            precision: MAX_PRECISION as usize,
            output_path: None,
        }
    }

    pub fn supported_formats(&self) -> &'static [&'static str] {
        &SUPPORTED_FORMATS
    }

    /// Render `store` as delimited text
    pub fn to_csv_string(&self, store: &SampleStore) -> String {
        let fields = store.field_names();
        let mut out = String::new();

        if self.include_header {
            let header: Vec<String> = fields
                .iter()
                .map(|name| escape_field(name, &self.delimiter))
                .collect();
            out.push_str(&header.join(&self.delimiter));
            out.push('\n');
        }

        for i in 0..store.len() {
            let row: Vec<String> = fields
                .iter()
                .map(|name| match store.series(name).get(i) {
                    Some(&v) => escape_field(&format_value(v, self.precision), &self.delimiter),
                    None => String::new(),
                })
                .collect();
            out.push_str(&row.join(&self.delimiter));
            out.push('\n');
        }
        out
    }

    /// Write `store` to `path`
    pub fn export_to_file(&mut self, path: &Path, store: &SampleStore) -> Result<(), TransformError> {
        let started = Instant::now();
        self.write_file(path, store)?;
        self.state.finish(started, store.len());
        Ok(())
    }

    fn write_file(&mut self, path: &Path, store: &SampleStore) -> Result<(), TransformError> {
        if store.is_empty() || store.field_count() == 0 {
            return Err(self.state.fail(TransformError::EmptyInput));
        }
        let bytes = self.encoding.encode(&self.to_csv_string(store));
        if let Err(e) = std::fs::write(path, bytes) {
            return Err(self.state.fail(TransformError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            }));
        }
        tracing::info!(
            path = %path.display(),
            rows = store.len(),
            fields = store.field_count(),
            encoding = %self.encoding,
            "Exported CSV"
        );
        Ok(())
    }
}

impl Default for CsvExport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for CsvExport {
    fn name(&self) -> &str {
        "CsvExport"
    }

    fn description(&self) -> &str {
        "CSV export with configurable delimiter and encoding"
    }

    fn kind(&self) -> TransformKind {
        TransformKind::Export
    }

    fn state(&self) -> &TransformState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut TransformState {
        &mut self.state
    }

    /// Writes a summary (`total_points`, `field_count`, `export_time_ms`) to
    /// `output`, exporting `input` first when `output_path` is set
    fn process_data(
        &mut self,
        input: &SampleStore,
        output: &mut SampleStore,
    ) -> Result<(), TransformError> {
        let started = self.state.begin()?;
        if let Some(path) = self.output_path.clone() {
            self.write_file(&path, input)?;
        }

        output.add_series("total_points", vec![input.len() as f64]);
        output.add_series("field_count", vec![input.field_count() as f64]);
        output.add_series(
            "export_time_ms",
            vec![started.elapsed().as_secs_f64() * 1000.0],
        );

        self.state.finish(started, input.len());
        Ok(())
    }

    fn set_parameter(&mut self, key: &str, value: ParamValue) -> Result<(), TransformError> {
        match key {
            "delimiter" => match value.as_str() {
                Some(d) if !d.is_empty() && !d.contains(['"', '\n', '\r']) => {
                    self.delimiter = d.to_string()
                }
                _ => return Err(self.state.reject(key, &value, "a non-empty delimiter")),
            },
            "include_header" => match value.as_bool() {
                Some(b) => self.include_header = b,
                None => return Err(self.state.reject(key, &value, "a boolean")),
            },
            "encoding" => match value.as_str().map(str::parse::<Encoding>) {
                Some(Ok(encoding)) => self.encoding = encoding,
                _ => return Err(self.state.reject(key, &value, "UTF-8, ASCII or Latin1")),
            },
            "precision" => match value.as_i64() {
                Some(p) if (0..=MAX_PRECISION).contains(&p) => self.precision = p as usize,
                _ => return Err(self.state.reject(key, &value, "an integer in [0, 15]")),
            },
            "output_path" => match value.as_str() {
                Some("") => self.output_path = None,
                Some(p) => self.output_path = Some(PathBuf::from(p)),
                None => return Err(self.state.reject(key, &value, "a path")),
            },
            _ => return Err(self.state.unknown_key(key)),
        }
        self.state.accept(key);
        Ok(())
    }

    fn parameter(&self, key: &str) -> Option<ParamValue> {
        match key {
            "delimiter" => Some(ParamValue::Text(self.delimiter.clone())),
            "include_header" => Some(ParamValue::Bool(self.include_header)),
            "encoding" => Some(ParamValue::from(self.encoding.as_str())),
            "precision" => Some(ParamValue::Int(self.precision as i64)),
            "output_path" => Some(ParamValue::Text(
                self.output_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            )),
            _ => None,
        }
    }

    fn default_parameters(&self) -> BTreeMap<String, ParamValue> {
        BTreeMap::from([
            ("delimiter".to_string(), ParamValue::from(",")),
            ("include_header".to_string(), ParamValue::Bool(true)),
            ("encoding".to_string(), ParamValue::from("UTF-8")),
            ("precision".to_string(), ParamValue::Int(MAX_PRECISION)),
            ("output_path".to_string(), ParamValue::from("")),
        ])
    }

    fn validate_parameters(&self) -> bool {
        !self.delimiter.is_empty() && self.precision <= MAX_PRECISION as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> SampleStore {
        let mut store = SampleStore::new();
        store.add_series("x", vec![1.0, 2.0, 3.0]);
        store.add_series("y", vec![0.5, -2.25, 1e20]);
        store
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(3.0, 15), "3");
        assert_eq!(format_value(-42.0, 15), "-42");
        assert_eq!(format_value(0.1, 15), "0.1");
        assert_eq!(format_value(2.5, 15), "2.5");
        assert_eq!(format_value(1.0 / 3.0, 4), "0.3333");
        assert_eq!(format_value(123.456, 2), "1.2e2");
        assert_eq!(format_value(1.5e-7, 15), "1.5e-7");
        assert_eq!(format_value(1e20, 15), "1e20");
        assert_eq!(format_value(f64::NAN, 15), "NaN");
    }

    #[test]
    fn test_escape_line_breaks() {
        assert_eq!(escape_field("a\nb", ","), "\"a\nb\"");
        assert_eq!(escape_field("a\rb", ","), "\"a\rb\"");
        assert_eq!(escape_field("a;b", ","), "a;b");
        assert_eq!(escape_field("a;b", ";"), "\"a;b\"");
    }

    #[test]
    fn test_csv_string_with_header() {
        let csv = CsvExport::new().to_csv_string(&sample_store());
        assert_eq!(csv, "x,y\n1,0.5\n2,-2.25\n3,1e20\n");
    }

    #[test]
    fn test_missing_cells_are_empty() {
        let mut store = SampleStore::new();
        store.add_series("long", vec![1.0, 2.0]);
        store.add_series("short", vec![9.0]);
        let mut export = CsvExport::new();
        export
            .set_parameter("include_header", ParamValue::Bool(false))
            .unwrap();
        assert_eq!(export.to_csv_string(&store), "1,9\n2,\n");
    }

    #[test]
    fn test_quoted_header() {
        let mut store = SampleStore::new();
        store.add_series("a,b", vec![1.0]);
        store.add_series("say \"x\"", vec![2.0]);
        let csv = CsvExport::new().to_csv_string(&store);
        assert_eq!(csv.lines().next().unwrap(), "\"a,b\",\"say \"\"x\"\"\"");
    }

    #[test]
    fn test_export_to_file_encodings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut store = SampleStore::new();
        store.add_series("température", vec![20.0]);

        let mut export = CsvExport::new();
        export
            .set_parameter("encoding", ParamValue::from("ASCII"))
            .unwrap();
        export.export_to_file(&path, &store).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"temp?rature\n20\n");

        export
            .set_parameter("encoding", ParamValue::from("latin1"))
            .unwrap();
        export.export_to_file(&path, &store).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"temp\xe9rature\n20\n");
        assert_eq!(export.processed_count(), 2);
    }

    #[test]
    fn test_export_empty_store_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut export = CsvExport::new();
        let err = export
            .export_to_file(&dir.path().join("x.csv"), &SampleStore::new())
            .unwrap_err();
        assert_eq!(err, TransformError::EmptyInput);
    }

    #[test]
    fn test_process_data_summary_and_output_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.csv");
        let mut export = CsvExport::new();
        export.initialize().unwrap();
        export
            .set_parameter("output_path", ParamValue::from(path.to_str().unwrap()))
            .unwrap();
        export
            .set_parameter("delimiter", ParamValue::from(";"))
            .unwrap();

        let mut summary = SampleStore::new();
        export.process_data(&sample_store(), &mut summary).unwrap();

        assert_eq!(summary.series("total_points"), [3.0]);
        assert_eq!(summary.series("field_count"), [2.0]);
        assert!(summary.has_field("export_time_ms"));
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("x;y\n1;0.5\n"));
    }

    #[test]
    fn test_parameter_validation() {
        let mut export = CsvExport::new();
        assert!(export.set_parameter("precision", ParamValue::Int(16)).is_err());
        assert!(export.set_parameter("delimiter", ParamValue::from("")).is_err());
        assert!(export.set_parameter("encoding", ParamValue::from("EBCDIC")).is_err());
        assert_eq!(export.supported_formats(), ["csv", "txt"]);
        assert_eq!(export.default_parameters().len(), 5);
    }
}
