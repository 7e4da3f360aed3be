//! Sampleflow - multi-field sample acquisition and transformation chains
//!
//! This library re-exports the store, sources, realtime generator,
//! transforms and chain engine from `sampleflow-core`.

pub use sampleflow_core::chain;
pub use sampleflow_core::config;
pub use sampleflow_core::realtime;
pub use sampleflow_core::source;
pub use sampleflow_core::store;
pub use sampleflow_core::transform;

pub use sampleflow_core::{
    column_name, Capability, ChainEngine, ChainError, ChainStats, CsvExport, CustomSource,
    FileSource, LinearInterpolation, LowPassFilter, MetadataValue, MovingAverageFilter,
    ParamValue, ParseConfig, RealtimeConfig, RealtimeSource, RealtimeStats, SampleStore, Source,
    SourceError, SourceEvent, SourceState, StoreStatistics, Transform, TransformError,
    TransformKind, ValidationRule, WaveformMode,
};
pub use sampleflow_core::{BUILD_DATE, COLUMN_PREFIX, VERSION};
