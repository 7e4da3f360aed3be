//! Line tokenizers for delimited text
//!
//! Tokens are trimmed and empty tokens are dropped (so runs of spaces act
//! as one separator). A token is numeric only if the *whole* trimmed token
//! converts; `1.5abc` is rejected.

use crate::config::parse_char;
use crate::store::SampleStore;

/// Delimiters considered by auto-detection, in tie-break order
pub const DELIMITER_CANDIDATES: [char; 5] = [',', ';', '\t', '|', ' '];

/// Pick the candidate delimiter occurring most often in `line`
///
/// Ties go to the earlier candidate; a line without any candidate yields `,`.
///
/// # Example
/// ```
/// use sampleflow_core::source::parser::detect_delimiter;
///
/// assert_eq!(detect_delimiter("1;2;3"), ';');
/// assert_eq!(detect_delimiter("a\tb,c\td"), '\t');
/// ```
pub fn detect_delimiter(line: &str) -> char {
    let mut best = DELIMITER_CANDIDATES[0];
    let mut best_count = 0;
    for candidate in DELIMITER_CANDIDATES {
        let count = line.chars().filter(|&c| c == candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}

/// Trimmed, non-empty tokens of a line
pub fn tokens(line: &str, delimiter: char) -> impl Iterator<Item = &str> {
    line.split(delimiter).map(str::trim).filter(|t| !t.is_empty())
}

/// Parse a whole token as `f64`
pub fn parse_token(token: &str) -> Option<f64> {
    token.trim().parse::<f64>().ok()
}

/// Strategy for turning one text line into numeric values
///
/// Returning `None` marks the line as unparseable; it is skipped and counted.
/// Any `Fn(&str) -> Option<Vec<f64>>` closure is a parser too.
pub trait LineParser: Send {
    fn parse_line(&self, line: &str) -> Option<Vec<f64>>;

    /// Cheap pre-check that the line could hold numbers
    fn validate_format(&self, line: &str) -> bool {
        line.chars()
            .any(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
    }

    /// Apply a parser-specific configuration string
    fn configure(&mut self, _config: &str) {}
}

impl<F> LineParser for F
where
    F: Fn(&str) -> Option<Vec<f64>> + Send,
{
    fn parse_line(&self, line: &str) -> Option<Vec<f64>> {
        self(line)
    }
}

/// Built-in tokenizer splitting on a single delimiter character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelimitedParser {
    delimiter: char,
}

impl DelimitedParser {
    pub fn new(delimiter: char) -> Self {
        Self { delimiter }
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }
}

impl Default for DelimitedParser {
    fn default() -> Self {
        Self::new(',')
    }
}

impl LineParser for DelimitedParser {
    fn parse_line(&self, line: &str) -> Option<Vec<f64>> {
        tokens(line, self.delimiter).map(parse_token).collect()
    }

    /// The config is the delimiter itself (`;`, `tab`, ...)
    fn configure(&mut self, config: &str) {
        match parse_char("delimiter", config) {
            Ok(delimiter) => self.delimiter = delimiter,
            Err(e) => tracing::warn!(error = %e, "Ignoring parser configuration"),
        }
    }
}

/// Name of column `index`, suffixed with its 1-based position when an
/// earlier column already resolved to the same base name
pub(crate) fn unique_column_name(base: impl Fn(usize) -> String, index: usize) -> String {
    let name = base(index);
    if (0..index).any(|earlier| base(earlier) == name) {
        format!("{}_{}", name, index + 1)
    } else {
        name
    }
}

/// Unique names for the first `count` columns; renamed duplicates are logged
pub(crate) fn unique_column_names(base: impl Fn(usize) -> String, count: usize) -> Vec<String> {
    (0..count)
        .map(|index| {
            let name = unique_column_name(&base, index);
            if name != base(index) {
                tracing::warn!(
                    column = index + 1,
                    original = %base(index),
                    renamed = %name,
                    "Duplicate column name"
                );
            }
            name
        })
        .collect()
}

/// Column-wise accumulator for parsed rows
///
/// Rows may be ragged. Missing cells, including cells of columns that only
/// appear in later rows, are filled with NaN when the store is built.
pub(crate) struct ColumnBuilder<F> {
    name_of: F,
    columns: Vec<Vec<f64>>,
    rows: usize,
}

impl<F: Fn(usize) -> String> ColumnBuilder<F> {
    pub(crate) fn new(name_of: F) -> Self {
        Self {
            name_of,
            columns: Vec::new(),
            rows: 0,
        }
    }

    pub(crate) fn push(&mut self, values: &[f64]) {
        while self.columns.len() < values.len() {
            self.columns.push(vec![f64::NAN; self.rows]);
        }
        for (i, column) in self.columns.iter_mut().enumerate() {
            column.push(values.get(i).copied().unwrap_or(f64::NAN));
        }
        self.rows += 1;
    }

    pub(crate) fn rows(&self) -> usize {
        self.rows
    }

    /// Build the store; `declared` fields are created first, even when empty
    pub(crate) fn finish<S: AsRef<str>>(self, declared: &[S]) -> SampleStore {
        let mut store = SampleStore::with_fields(declared);
        for (i, column) in self.columns.into_iter().enumerate() {
            store.add_series(&(self.name_of)(i), column);
        }
        store.pad_series(f64::NAN);
        store
    }
}
