//! Columnar sample storage
//!
//! A [`SampleStore`] maps field names to positional `f64` series. Rows
//! ("samples") are never materialized; they are synthesized on read.

pub mod metadata;
pub mod sample_store;

pub use metadata::MetadataValue;
pub use sample_store::{Sample, SampleStore, StoreStatistics};
