//! Configurable source with column mapping and value validation
//!
//! Parsing follows the file source, but every knob comes from a
//! [`ParseConfig`] and any line parser can be plugged in. A single value
//! failing the [`ValidationRule`] drops the whole sample.

use super::file::header_names;
use super::parser::{
    unique_column_name, unique_column_names, ColumnBuilder, DelimitedParser, LineParser,
};
use super::{read_text, Notifier, Source, SourceError, SourceState};
use crate::config::{self, ConfigError, ConfigPairs};
use crate::store::SampleStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Acceptance rule applied to every parsed value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRule {
    pub min_value: f64,
    pub max_value: f64,
    pub allow_nan: bool,
    pub allow_infinity: bool,
}

impl Default for ValidationRule {
    fn default() -> Self {
        Self {
            min_value: -1e9,
            max_value: 1e9,
            allow_nan: false,
            allow_infinity: false,
        }
    }
}

impl ValidationRule {
    pub fn validate(&self, value: f64) -> bool {
        if value.is_nan() {
            return self.allow_nan;
        }
        if value.is_infinite() {
            return self.allow_infinity;
        }
        value >= self.min_value && value <= self.max_value
    }
}

/// Parsing knobs of a [`CustomSource`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseConfig {
    pub delimiter: char,
    pub comment_char: char,
    pub has_header: bool,
    pub skip_lines: usize,
    /// Column index to field name; unmapped columns use the header or `Column_<n>`
    pub column_mapping: BTreeMap<usize, String>,
    pub validation: ValidationRule,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            comment_char: '#',
            has_header: true,
            skip_lines: 0,
            column_mapping: BTreeMap::new(),
            validation: ValidationRule::default(),
        }
    }
}

impl ParseConfig {
    /// Build from `key=value` pairs; unspecified keys keep their defaults
    pub fn from_pairs(pairs: &ConfigPairs) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "delimiter" => cfg.delimiter = config::parse_char(key, value)?,
                "comment" => cfg.comment_char = config::parse_char(key, value)?,
                "header" => cfg.has_header = config::parse_bool(key, value)?,
                "skip" => cfg.skip_lines = config::parse_usize(key, value)?,
                "columns" => cfg.column_mapping = config::parse_column_mapping(key, value)?,
                "min" => cfg.validation.min_value = config::parse_f64(key, value)?,
                "max" => cfg.validation.max_value = config::parse_f64(key, value)?,
                "allow_nan" => cfg.validation.allow_nan = config::parse_bool(key, value)?,
                "allow_inf" => cfg.validation.allow_infinity = config::parse_bool(key, value)?,
                _ => return Err(ConfigError::UnknownKey(key.clone())),
            }
        }
        Ok(cfg)
    }
}

/// Running counters and per-field ranges
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomStats {
    pub total_points: usize,
    pub valid_points: usize,
    pub skipped_points: usize,
    pub ranges: BTreeMap<String, (f64, f64)>,
}

/// Source with pluggable parsing and validation
pub struct CustomSource {
    path: PathBuf,
    config: ParseConfig,
    parser: Option<Box<dyn LineParser>>,
    header: Vec<String>,
    store: SampleStore,
    total: usize,
    valid: usize,
    skipped: usize,
    state: SourceState,
    new_data: bool,
    notifier: Notifier,
}

impl CustomSource {
    pub fn new() -> Self {
        Self {
            path: PathBuf::new(),
            config: ParseConfig::default(),
            parser: None,
            header: Vec::new(),
            store: SampleStore::new(),
            total: 0,
            valid: 0,
            skipped: 0,
            state: SourceState::Stopped,
            new_data: false,
            notifier: Notifier::new(),
        }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::new()
        }
    }

    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = path.into();
    }

    pub fn parse_config(&self) -> &ParseConfig {
        &self.config
    }

    pub fn set_parse_config(&mut self, config: ParseConfig) {
        self.config = config;
    }

    /// Replace the built-in tokenizer
    pub fn set_parser(&mut self, parser: Box<dyn LineParser>) {
        self.parser = Some(parser);
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    pub fn statistics(&self) -> CustomStats {
        CustomStats {
            total_points: self.total,
            valid_points: self.valid,
            skipped_points: self.skipped,
            ranges: self.store.calculate_statistics().ranges,
        }
    }

    /// Ingest rows after `start`; each row is validated and mapped like a parsed line
    ///
    /// Returns the number of accepted rows.
    pub fn append_data(&mut self, rows: &[Vec<f64>]) -> Result<usize, SourceError> {
        if self.state != SourceState::Running {
            return Err(SourceError::NotRunning);
        }

        let mut accepted = 0;
        for row in rows {
            self.total += 1;
            if row.is_empty() || !row.iter().all(|&v| self.config.validation.validate(v)) {
                self.skipped += 1;
                continue;
            }
            self.append_row(row);
            self.valid += 1;
            accepted += 1;
        }

        tracing::debug!(accepted, rejected = rows.len() - accepted, "Appended rows");
        if accepted > 0 {
            self.new_data = true;
            self.notifier.data_ready();
        }
        Ok(accepted)
    }

    fn append_row(&mut self, row: &[f64]) {
        let len = self.store.len();
        let mut cells: Vec<(String, f64)> = self
            .store
            .field_names()
            .iter()
            .map(|name| (name.clone(), f64::NAN))
            .collect();

        for (i, &value) in row.iter().enumerate() {
            let name = field_name(&self.config, &self.header, i);
            if !self.store.has_field(&name) {
                self.store.add_series(&name, vec![f64::NAN; len]);
            }
            match cells.iter_mut().find(|(n, _)| *n == name) {
                Some(cell) => cell.1 = value,
                None => cells.push((name, value)),
            }
        }
        self.store.add_sample(cells);
    }

    fn fail(&mut self, err: SourceError) -> SourceError {
        tracing::error!(error = %err, "Custom source failed to start");
        self.state = SourceState::Error;
        self.notifier.error(&err.to_string());
        err
    }

    fn parse_text(&mut self, text: &str) {
        let cfg = &self.config;
        let builtin = DelimitedParser::new(cfg.delimiter);
        let parser: &dyn LineParser = match &self.parser {
            Some(parser) => parser.as_ref(),
            None => &builtin,
        };

        let mut lines = text
            .lines()
            .skip(cfg.skip_lines)
            .map(|line| line.trim_start_matches('\u{feff}').trim())
            .filter(|line| !line.is_empty() && !line.starts_with(cfg.comment_char));

        let header = if cfg.has_header {
            lines
                .next()
                .map(|line| header_names(line, cfg.delimiter))
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let (mut total, mut valid, mut skipped) = (0, 0, 0);
        let mut builder = ColumnBuilder::new(|i: usize| field_name(cfg, &header, i));
        for line in lines {
            total += 1;
            let values = if parser.validate_format(line) {
                parser.parse_line(line)
            } else {
                None
            };
            match values {
                Some(values)
                    if !values.is_empty() && values.iter().all(|&v| cfg.validation.validate(v)) =>
                {
                    builder.push(&values);
                    valid += 1;
                }
                _ => skipped += 1,
            }
        }

        let width = cfg
            .column_mapping
            .keys()
            .next_back()
            .map_or(header.len(), |last| header.len().max(last + 1));
        let declared: Vec<String> =
            unique_column_names(|i| base_field_name(cfg, &header, i), width)
                .into_iter()
                .enumerate()
                .filter(|(i, _)| *i < header.len() || cfg.column_mapping.contains_key(i))
                .map(|(_, name)| name)
                .collect();
        let store = builder.finish(&declared);

        self.store = store;
        self.header = header;
        self.total = total;
        self.valid = valid;
        self.skipped = skipped;
    }
}

impl Default for CustomSource {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CustomSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomSource")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("custom_parser", &self.parser.is_some())
            .field("state", &self.state)
            .field("points", &self.store.len())
            .finish()
    }
}

fn base_field_name(cfg: &ParseConfig, header: &[String], index: usize) -> String {
    cfg.column_mapping
        .get(&index)
        .or_else(|| header.get(index))
        .cloned()
        .unwrap_or_else(|| crate::column_name(index))
}

/// Mapped, header or positional name; a name already taken by an earlier
/// column gets the column position appended
fn field_name(cfg: &ParseConfig, header: &[String], index: usize) -> String {
    unique_column_name(|i| base_field_name(cfg, header, i), index)
}

impl Source for CustomSource {
    /// Accepts a bare path or `path=...;delimiter=...;columns=0:x,1:y;min=...` pairs
    fn initialize(&mut self, config: &str) -> Result<(), SourceError> {
        let config = config.trim();
        if !config::is_pairs_payload(config) {
            self.path = PathBuf::from(config);
            return Ok(());
        }
        let mut pairs = config::parse_pairs(config)?;
        if let Some(path) = pairs.remove("path") {
            self.path = PathBuf::from(path);
        }
        self.config = ParseConfig::from_pairs(&pairs)?;
        if let Some(parser) = self.parser.as_mut() {
            parser.configure(&self.config.delimiter.to_string());
        }
        tracing::debug!(path = %self.path.display(), config = ?self.config, "Custom source configured");
        Ok(())
    }

    fn start(&mut self) -> Result<(), SourceError> {
        if self.path.as_os_str().is_empty() {
            return Err(self.fail(SourceError::EmptyPath));
        }
        let text = match read_text(&self.path) {
            Ok(text) => text,
            Err(err) => return Err(self.fail(err)),
        };

        self.parse_text(&text);
        tracing::info!(
            path = %self.path.display(),
            fields = self.store.field_count(),
            valid = self.valid,
            skipped = self.skipped,
            "Loaded custom data"
        );

        self.state = SourceState::Running;
        self.new_data = true;
        self.notifier.data_ready();
        Ok(())
    }

    fn stop(&mut self) {
        self.store = SampleStore::new();
        self.header.clear();
        self.total = 0;
        self.valid = 0;
        self.skipped = 0;
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
