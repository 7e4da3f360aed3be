//! Pluggable store-to-store transforms
//!
//! Every transform implements [`Transform`]: lifecycle, batch processing of
//! a whole [`SampleStore`], typed parameters and introspection. Transforms
//! that can also filter one value at a time report it through
//! [`Capabilities::real_time`] and [`Transform::process_sample`].
//!
//! Built-ins:
//! - [`MovingAverageFilter`] and [`LowPassFilter`] ([`filter`])
//! - [`LinearInterpolation`] ([`interpolation`])
//! - [`CsvExport`] ([`export`])

pub mod export;
pub mod filter;
pub mod interpolation;

pub use export::{CsvExport, Encoding};
pub use filter::{LowPassFilter, MovingAverageFilter};
pub use interpolation::LinearInterpolation;

use crate::store::SampleStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;
use thiserror::Error;

/// Errors raised by transforms
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("Transform is not initialized")]
    NotInitialized,

    #[error("Input contains no data")]
    EmptyInput,

    #[error("Invalid parameter {key}: {reason}")]
    InvalidParameter { key: String, reason: String },

    #[error("Processing failed: {0}")]
    Processing(String),

    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },
}

/// Category of a transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransformKind {
    Filter,
    Interpolation,
    Export,
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Filter => "filter",
            Self::Interpolation => "interpolation",
            Self::Export => "export",
        };
        f.write_str(s)
    }
}

/// A single processing capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// One value at a time via [`Transform::process_sample`]
    RealTime,
    /// Whole stores via [`Transform::process_data`]
    Batch,
}

/// Capability flags reported by a transform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub real_time: bool,
    pub batch: bool,
}

impl Capabilities {
    pub const BATCH: Self = Self {
        real_time: false,
        batch: true,
    };

    pub const REAL_TIME_AND_BATCH: Self = Self {
        real_time: true,
        batch: true,
    };

    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::RealTime => self.real_time,
            Capability::Batch => self.batch,
        }
    }
}

/// Typed parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Infer the type from text: integer, float, boolean, else text
    ///
    /// # Example
    /// ```
    /// use sampleflow_core::ParamValue;
    ///
    /// assert_eq!(ParamValue::parse("5"), ParamValue::Int(5));
    /// assert_eq!(ParamValue::parse("0.25"), ParamValue::Float(0.25));
    /// assert_eq!(ParamValue::parse("true"), ParamValue::Bool(true));
    /// assert_eq!(ParamValue::parse(";"), ParamValue::Text(";".into()));
    /// ```
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if let Ok(i) = trimmed.parse::<i64>() {
            Self::Int(i)
        } else if let Ok(f) = trimmed.parse::<f64>() {
            Self::Float(f)
        } else if let Ok(b) = trimmed.parse::<bool>() {
            Self::Bool(b)
        } else {
            Self::Text(text.to_string())
        }
    }

    /// Numeric view; integers widen, text is parsed
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Bool(_) => None,
        }
    }

    /// Integer view; floats must be integral
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            Self::Float(_) | Self::Bool(_) => None,
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(i) => Some(*i != 0),
            Self::Text(s) => crate::config::parse_bool("", s).ok(),
            Self::Float(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Bool(_) | Self::Int(_) | Self::Float(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Bookkeeping shared by every built-in transform
///
/// A rejected out-of-domain value leaves the parameter marked invalid:
/// processing fails until the key is set to a valid value or the transform
/// is re-initialized.
#[derive(Debug, Clone, Default)]
pub struct TransformState {
    initialized: bool,
    last_error: Option<String>,
    warning: Option<String>,
    invalid: BTreeMap<String, String>,
    processing_time_ms: u64,
    processed_count: usize,
}

impl TransformState {
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn initialize(&mut self) {
        self.initialized = true;
        self.invalid.clear();
        self.last_error = self.warning.clone();
    }

    pub fn shutdown(&mut self) {
        self.initialized = false;
        self.processing_time_ms = 0;
        self.processed_count = 0;
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn processing_time_ms(&self) -> u64 {
        self.processing_time_ms
    }

    pub fn processed_count(&self) -> usize {
        self.processed_count
    }

    /// Record a failure and hand it back for `Err(..)`
    pub fn fail(&mut self, err: TransformError) -> TransformError {
        self.last_error = Some(err.to_string());
        err
    }

    /// Reject an unknown key
    pub fn unknown_key(&mut self, key: &str) -> TransformError {
        self.fail(TransformError::InvalidParameter {
            key: key.to_string(),
            reason: "unknown parameter".to_string(),
        })
    }

    /// Reject a value for a known key and mark the key invalid
    pub fn reject(&mut self, key: &str, value: &ParamValue, expected: &str) -> TransformError {
        let reason = format!("{} (expected {})", value, expected);
        tracing::warn!(key, %value, expected, "Rejected transform parameter");
        self.invalid.insert(key.to_string(), reason.clone());
        self.fail(TransformError::InvalidParameter {
            key: key.to_string(),
            reason,
        })
    }

    /// A valid value was applied to `key`
    pub fn accept(&mut self, key: &str) {
        self.invalid.remove(key);
    }

    /// Non-fatal warning reported through `last_error`
    pub fn set_warning(&mut self, warning: Option<String>) {
        if let Some(w) = &warning {
            tracing::warn!(warning = %w, "Transform warning");
        }
        self.warning = warning;
        self.last_error = self.warning.clone();
    }

    /// Check that processing may start
    pub fn begin(&mut self) -> Result<Instant, TransformError> {
        if !self.initialized {
            return Err(self.fail(TransformError::NotInitialized));
        }
        if let Some((key, reason)) = self.invalid.iter().next() {
            let err = TransformError::InvalidParameter {
                key: key.clone(),
                reason: reason.clone(),
            };
            return Err(self.fail(err));
        }
        Ok(Instant::now())
    }

    /// Record a successful run over `points` samples
    pub fn finish(&mut self, started: Instant, points: usize) {
        self.processing_time_ms = started.elapsed().as_millis() as u64;
        self.processed_count += points;
        self.last_error = self.warning.clone();
    }
}

/// A unit mapping one store to another
pub trait Transform: Send {
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str;

    fn author(&self) -> &str {
        "Sampleflow Team"
    }

    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    fn kind(&self) -> TransformKind;

    fn state(&self) -> &TransformState;

    fn state_mut(&mut self) -> &mut TransformState;

    fn initialize(&mut self) -> Result<(), TransformError> {
        self.state_mut().initialize();
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), TransformError> {
        self.state_mut().shutdown();
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.state().is_initialized()
    }

    /// Process `input` into `output`, adding or replacing series there
    fn process_data(
        &mut self,
        input: &SampleStore,
        output: &mut SampleStore,
    ) -> Result<(), TransformError>;

    fn capabilities(&self) -> Capabilities {
        Capabilities::BATCH
    }

    fn supports_real_time(&self) -> bool {
        self.capabilities().real_time
    }

    fn supports_batch(&self) -> bool {
        self.capabilities().batch
    }

    /// Filter one value; `None` when the transform is not real-time capable
    fn process_sample(&mut self, _value: f64) -> Option<f64> {
        None
    }

    fn reset_real_time_state(&mut self) {}

    fn set_parameter(&mut self, key: &str, value: ParamValue) -> Result<(), TransformError>;

    fn parameter(&self, key: &str) -> Option<ParamValue>;

    fn default_parameters(&self) -> BTreeMap<String, ParamValue>;

    fn validate_parameters(&self) -> bool;

    fn last_error(&self) -> Option<&str> {
        self.state().last_error()
    }

    /// Duration of the last processing call
    fn processing_time_ms(&self) -> u64 {
        self.state().processing_time_ms()
    }

    /// Samples processed since initialization
    fn processed_count(&self) -> usize {
        self.state().processed_count()
    }
}

/// Instantiate a built-in transform by short name
///
/// Known names: `movavg`, `lowpass`, `interp`, `csv` (and their long forms).
pub fn builtin(name: &str) -> Option<Box<dyn Transform>> {
    match name.to_ascii_lowercase().as_str() {
        "movavg" | "moving_average" | "movingaveragefilter" => {
            Some(Box::new(MovingAverageFilter::new()))
        }
        "lowpass" | "low_pass" | "lowpassfilter" => Some(Box::new(LowPassFilter::new())),
        "interp" | "linear" | "linearinterpolation" => Some(Box::new(LinearInterpolation::new())),
        "csv" | "export" | "csvexport" => Some(Box::new(CsvExport::new())),
        _ => None,
    }
}

/// Copy every metadata entry of `field` from `input` to `output`
pub(crate) fn copy_field_metadata(input: &SampleStore, output: &mut SampleStore, field: &str) {
    if let Some(meta) = input.field_metadata_all(field) {
        for (key, value) in meta {
            output.set_field_metadata(field, key, value.clone());
        }
    }
}
