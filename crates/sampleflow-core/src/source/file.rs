//! Delimited text file source
//!
//! Reads the whole file in [`Source::start`], auto-detecting the delimiter
//! when none is configured, and publishes a single `DataReady` once the store
//! is complete.

use super::parser::{
    detect_delimiter, parse_token, tokens, unique_column_name, unique_column_names, ColumnBuilder,
};
use super::{read_text, Notifier, Source, SourceError, SourceState};
use crate::config::{self, ConfigError};
use crate::store::SampleStore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Lines starting with this character are comments
pub const COMMENT_PREFIX: char = '#';

/// How a file is read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOptions {
    pub path: PathBuf,
    /// `None` auto-detects from the first line
    pub delimiter: Option<char>,
    pub has_header: bool,
    /// Raw lines dropped before anything else is read
    pub skip_lines: usize,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            delimiter: None,
            has_header: true,
            skip_lines: 0,
        }
    }
}

impl FileOptions {
    /// Parse a bare path or a `path=...;delimiter=...;header=...;skip=...` payload
    ///
    /// # Example
    /// ```
    /// use sampleflow_core::source::FileOptions;
    ///
    /// let opts = FileOptions::from_payload("path=a.tsv;delimiter=tab;header=no").unwrap();
    /// assert_eq!(opts.delimiter, Some('\t'));
    /// assert!(!opts.has_header);
    /// ```
    pub fn from_payload(payload: &str) -> Result<Self, ConfigError> {
        let payload = payload.trim();
        if !config::is_pairs_payload(payload) {
            return Ok(Self {
                path: PathBuf::from(payload),
                ..Self::default()
            });
        }

        let mut opts = Self::default();
        for (key, value) in config::parse_pairs(payload)? {
            match key.as_str() {
                "path" => opts.path = PathBuf::from(value),
                "delimiter" => opts.delimiter = Some(config::parse_char(&key, &value)?),
                "header" => opts.has_header = config::parse_bool(&key, &value)?,
                "skip" => opts.skip_lines = config::parse_usize(&key, &value)?,
                _ => return Err(ConfigError::UnknownKey(key)),
            }
        }
        Ok(opts)
    }
}

/// Line counters of the last parse
///
/// `total_lines` counts candidate data lines only (header, skipped, blank and
/// comment lines excluded), so `valid_lines + skipped_lines == total_lines`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseCounters {
    pub total_lines: usize,
    pub valid_lines: usize,
    pub skipped_lines: usize,
    pub comment_lines: usize,
}

/// Static delimited file loaded in one pass
#[derive(Debug, Default)]
pub struct FileSource {
    options: FileOptions,
    store: SampleStore,
    counters: ParseCounters,
    state: SourceState,
    new_data: bool,
    notifier: Notifier,
}

impl FileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source reading `path` with default options
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self::with_options(FileOptions {
            path: path.into(),
            ..FileOptions::default()
        })
    }

    pub fn with_options(options: FileOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &FileOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: FileOptions) {
        self.options = options;
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    /// Move the loaded store out, leaving an empty one behind
    pub fn take_store(&mut self) -> SampleStore {
        std::mem::take(&mut self.store)
    }

    pub fn counters(&self) -> ParseCounters {
        self.counters
    }

    fn fail(&mut self, err: SourceError) -> SourceError {
        tracing::error!(error = %err, "File source failed to start");
        self.state = SourceState::Error;
        self.notifier.error(&err.to_string());
        err
    }
}

impl Source for FileSource {
    fn initialize(&mut self, config: &str) -> Result<(), SourceError> {
        self.options = FileOptions::from_payload(config)?;
        tracing::debug!(path = %self.options.path.display(), "File source configured");
        Ok(())
    }

    fn start(&mut self) -> Result<(), SourceError> {
        if self.options.path.as_os_str().is_empty() {
            return Err(self.fail(SourceError::EmptyPath));
        }
        let text = match read_text(&self.options.path) {
            Ok(text) => text,
            Err(err) => return Err(self.fail(err)),
        };

        let (store, counters) = parse_delimited(&text, &self.options);
        tracing::info!(
            path = %self.options.path.display(),
            fields = store.field_count(),
            points = store.len(),
            valid = counters.valid_lines,
            skipped = counters.skipped_lines,
            "Loaded data file"
        );
        if counters.skipped_lines > 0 {
            tracing::warn!(skipped = counters.skipped_lines, "Skipped unparseable lines");
        }

        self.store = store;
        self.counters = counters;
        self.state = SourceState::Running;
        self.new_data = true;
        self.notifier.data_ready();
        Ok(())
    }

    fn stop(&mut self) {
        self.store = SampleStore::new();
        self.counters = ParseCounters::default();
        self.new_data = false;
        self.state = SourceState::Stopped;
    }

    fn state(&self) -> SourceState {
        self.state
    }

    /// Series of the first field
    fn data(&mut self) -> Vec<f64> {
        self.new_data = false;
        self.store
            .field_names()
            .first()
            .map(|name| self.store.series(name).to_vec())
            .unwrap_or_default()
    }

    fn has_new_data(&self) -> bool {
        self.new_data
    }

    fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    fn notifier_mut(&mut self) -> &mut Notifier {
        &mut self.notifier
    }
}

/// Header cells, with blank cells named after their 1-based position
pub(crate) fn header_names(line: &str, delimiter: char) -> Vec<String> {
    let cells: Vec<&str> = if delimiter.is_whitespace() {
        tokens(line, delimiter).collect()
    } else {
        line.split(delimiter).map(str::trim).collect()
    };
    cells
        .into_iter()
        .enumerate()
        .map(|(i, cell)| {
            if cell.is_empty() {
                crate::column_name(i)
            } else {
                cell.to_string()
            }
        })
        .collect()
}

/// Parse delimited text into a store
pub fn parse_delimited(text: &str, options: &FileOptions) -> (SampleStore, ParseCounters) {
    let mut counters = ParseCounters::default();
    let mut lines = text
        .lines()
        .skip(options.skip_lines)
        .map(|line| line.trim_start_matches('\u{feff}').trim())
        .peekable();

    // Leading blank and comment lines never carry the header
    while let Some(line) = lines.peek() {
        if line.is_empty() {
            lines.next();
        } else if line.starts_with(COMMENT_PREFIX) {
            counters.comment_lines += 1;
            lines.next();
        } else {
            break;
        }
    }

    let delimiter = options
        .delimiter
        .or_else(|| lines.peek().map(|line| detect_delimiter(line)))
        .unwrap_or(',');

    let header = if options.has_header {
        lines.next().map(|line| header_names(line, delimiter))
    } else {
        None
    }
    .unwrap_or_default();

    let base = |i: usize| {
        header
            .get(i)
            .cloned()
            .unwrap_or_else(|| crate::column_name(i))
    };
    let declared = unique_column_names(base, header.len());
    let mut builder = ColumnBuilder::new(|i: usize| unique_column_name(base, i));

    for line in lines {
        if line.is_empty() {
            continue;
        }
        if line.starts_with(COMMENT_PREFIX) {
            counters.comment_lines += 1;
            continue;
        }
        counters.total_lines += 1;
        let values: Option<Vec<f64>> = tokens(line, delimiter).map(parse_token).collect();
        match values {
            Some(values) if !values.is_empty() => {
                builder.push(&values);
                counters.valid_lines += 1;
            }
            _ => {
                tracing::trace!(line, "Skipping unparseable line");
                counters.skipped_lines += 1;
            }
        }
    }

    let store = builder.finish(&declared);
    (store, counters)
}

/// Convenience wrapper: load `path` with default options
pub fn load_file(path: &Path) -> Result<(SampleStore, ParseCounters), SourceError> {
    let mut source = FileSource::with_path(path);
    source.start()?;
    let counters = source.counters();
    Ok((source.take_store(), counters))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceEvent;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_xy_csv() {
        let file = write_temp("x,y\n1,10\n2,20\n3,30\n");
        let mut source = FileSource::with_path(file.path());
        let rx = source.subscribe();

        source.start().unwrap();

        let store = source.store();
        assert_eq!(store.field_names(), ["x", "y"]);
        assert_eq!(store.len(), 3);
        assert_eq!(store.series("x"), [1.0, 2.0, 3.0]);
        assert_eq!(store.series("y"), [10.0, 20.0, 30.0]);
        assert_eq!(source.state(), SourceState::Running);
        assert_eq!(rx.try_recv().unwrap(), SourceEvent::DataReady);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_counters_balance() {
        let text = "a;b\n1;2\n# note\n\n3;oops\n4;5\n1.5abc;6\n";
        let (store, counters) = parse_delimited(text, &FileOptions::default());

        assert_eq!(counters.total_lines, 4);
        assert_eq!(counters.valid_lines, 2);
        assert_eq!(counters.skipped_lines, 2);
        assert_eq!(counters.comment_lines, 1);
        assert_eq!(store.series("b"), [2.0, 5.0]);
    }

    #[test]
    fn test_headerless_uses_column_names() {
        let opts = FileOptions {
            has_header: false,
            ..FileOptions::default()
        };
        let (store, counters) = parse_delimited("1\t2\n3\t4\n", &opts);
        assert_eq!(store.field_names(), ["Column_1", "Column_2"]);
        assert_eq!(store.series("Column_2"), [2.0, 4.0]);
        assert_eq!(counters.valid_lines, 2);
    }

    #[test]
    fn test_blank_header_cells_and_extra_columns() {
        let (store, _) = parse_delimited("t,,v\n1,2,3,4\n", &FileOptions::default());
        assert_eq!(store.field_names(), ["t", "Column_2", "v", "Column_4"]);
        assert_eq!(store.series("Column_4"), [4.0]);
    }

    #[test]
    fn test_duplicate_header_cells_keep_both_columns() {
        let (store, _) = parse_delimited("v,t,v\n1,2,3\n", &FileOptions::default());
        assert_eq!(store.field_names(), ["v", "t", "v_3"]);
        assert_eq!(store.series("v"), [1.0]);
        assert_eq!(store.series("v_3"), [3.0]);
    }

    #[test]
    fn test_invalid_utf8_spoils_only_its_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"x,y\n1,2\n# caf\xe9\n3,4\n5,\xff\n").unwrap();

        let mut source = FileSource::with_path(file.path());
        source.start().unwrap();
        assert_eq!(source.state(), SourceState::Running);

        let store = source.store();
        assert_eq!(store.field_names(), ["x", "y"]);
        assert_eq!(store.series("x"), [1.0, 3.0]);
        assert_eq!(store.series("y"), [2.0, 4.0]);

        let counters = source.counters();
        assert_eq!(counters.comment_lines, 1);
        assert_eq!(counters.valid_lines, 2);
        assert_eq!(counters.skipped_lines, 1);
    }

    #[test]
    fn test_ragged_rows_padded() {
        let (store, _) = parse_delimited("a,b\n1,2\n3\n", &FileOptions::default());
        assert!(store.is_valid());
        assert_eq!(store.series("a"), [1.0, 3.0]);
        assert!(store.series("b")[1].is_nan());
    }

    #[test]
    fn test_skip_lines_before_header() {
        let opts = FileOptions {
            skip_lines: 2,
            ..FileOptions::default()
        };
        let (store, _) = parse_delimited("junk\nmore junk\nx|y\n1|2\n", &opts);
        assert_eq!(store.field_names(), ["x", "y"]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_missing_file_enters_error() {
        let mut source = FileSource::with_path("/definitely/not/here.csv");
        let rx = source.subscribe();
        let err = source.start().unwrap_err();

        assert!(matches!(err, SourceError::Io { .. }));
        assert_eq!(source.state(), SourceState::Error);
        assert!(matches!(rx.try_recv().unwrap(), SourceEvent::Error(_)));
    }

    #[test]
    fn test_empty_path() {
        let mut source = FileSource::new();
        assert!(matches!(source.start(), Err(SourceError::EmptyPath)));
        assert_eq!(source.state(), SourceState::Error);
    }

    #[test]
    fn test_initialize_payload_and_stop_clears() {
        let file = write_temp("1 2\n3 4\n");
        let mut source = FileSource::new();
        source
            .initialize(&format!("path={};header=false", file.path().display()))
            .unwrap();
        source.start().unwrap();
        assert!(source.has_new_data());
        assert_eq!(source.data(), vec![1.0, 3.0]);
        assert!(!source.has_new_data());

        source.stop();
        assert_eq!(source.state(), SourceState::Stopped);
        assert!(source.store().is_empty());
        assert_eq!(source.counters(), ParseCounters::default());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = FileOptions::from_payload("path=a.csv;colour=red").unwrap_err();
        assert_eq!(err, ConfigError::UnknownKey("colour".into()));
    }
}
