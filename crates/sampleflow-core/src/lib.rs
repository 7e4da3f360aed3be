//! Sampleflow Core - sample store, data sources, realtime generator and transform chains
//!
//! Multi-field numeric samples are ingested from delimited files, custom
//! parsers or a synthetic realtime generator, kept in a columnar
//! [`SampleStore`], and pushed through chains of [`Transform`]s (filters,
//! interpolation, CSV export) managed by a [`ChainEngine`].

pub mod chain;
pub mod config;
pub mod realtime;
pub mod source;
pub mod store;
pub mod transform;

pub use chain::{ChainEngine, ChainError, ChainStats};
pub use realtime::{RealtimeConfig, RealtimeSource, RealtimeStats, WaveformMode};
pub use source::{
    CustomSource, FileSource, ParseConfig, Source, SourceError, SourceEvent, SourceState,
    ValidationRule,
};
pub use store::{MetadataValue, SampleStore, StoreStatistics};
pub use transform::{
    Capability, CsvExport, LinearInterpolation, LowPassFilter, MovingAverageFilter, ParamValue,
    Transform, TransformError, TransformKind,
};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date stamped by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Prefix used for columns without a header or mapping entry (`Column_1`, `Column_2`, ...)
pub const COLUMN_PREFIX: &str = "Column_";

/// Name of a fallback column, 1-based
pub fn column_name(index: usize) -> String {
    format!("{}{}", COLUMN_PREFIX, index + 1)
}
