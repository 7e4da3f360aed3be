//! Columnar time-series store
//!
//! Fields keep their insertion order for display. Values are positional:
//! index `i` of every series belongs to sample `i`.

use super::metadata::{MetadataValue, COLOR_KEY, VISIBLE_KEY};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One synthesized row: field name to value
pub type Sample = HashMap<String, f64>;

/// Summary statistics computed on demand
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStatistics {
    /// Number of samples (the store's point count)
    pub total_points: usize,
    /// Samples where every field holds a finite value
    pub valid_points: usize,
    /// Per-field (min, max) over finite values
    pub ranges: BTreeMap<String, (f64, f64)>,
    /// Per-field mean over finite values
    pub averages: BTreeMap<String, f64>,
}

/// Columnar store mapping field names to ordered `f64` series
///
/// Invariant: every non-empty series has exactly [`len`](Self::len) values.
/// Operations that can break this (e.g. [`add_series`](Self::add_series) with
/// a mismatched length) leave the store flagged by [`is_valid`](Self::is_valid).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleStore {
    /// Field names in insertion order
    fields: Vec<String>,
    series: HashMap<String, Vec<f64>>,
    metadata: HashMap<String, HashMap<String, MetadataValue>>,
    point_count: usize,
}

impl SampleStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with the given (empty) fields
    pub fn with_fields<S: AsRef<str>>(names: &[S]) -> Self {
        let mut store = Self::new();
        for name in names {
            store.add_field(name.as_ref());
        }
        store
    }

    // === Field management ===

    /// Add an empty field. Returns false if it already exists.
    pub fn add_field(&mut self, name: &str) -> bool {
        if self.series.contains_key(name) {
            return false;
        }
        self.fields.push(name.to_string());
        self.series.insert(name.to_string(), Vec::new());
        true
    }

    /// Remove a field with its data and metadata. Returns false if unknown.
    pub fn remove_field(&mut self, name: &str) -> bool {
        if self.series.remove(name).is_none() {
            return false;
        }
        self.fields.retain(|f| f != name);
        self.metadata.remove(name);
        self.recompute_point_count();
        true
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.series.contains_key(name)
    }

    /// Field names in insertion order
    pub fn field_names(&self) -> &[String] {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    // === Data operations ===

    /// Empty every series, keeping the field list and metadata
    pub fn clear(&mut self) {
        for values in self.series.values_mut() {
            values.clear();
        }
        self.point_count = 0;
    }

    /// Empty a single series
    pub fn clear_field(&mut self, name: &str) {
        if let Some(values) = self.series.get_mut(name) {
            values.clear();
            self.recompute_point_count();
        }
    }

    /// Append one sample, creating missing fields on first write
    ///
    /// # Example
    /// ```
    /// use sampleflow_core::SampleStore;
    ///
    /// let mut store = SampleStore::new();
    /// store.add_sample([("time", 0.0), ("value", 1.5)]);
    /// assert_eq!(store.len(), 1);
    /// assert_eq!(store.field_names(), ["time", "value"]);
    /// ```
    pub fn add_sample<I, K>(&mut self, sample: I)
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        for (name, value) in sample {
            let name = name.as_ref();
            self.add_field(name);
            if let Some(values) = self.series.get_mut(name) {
                values.push(value);
            }
        }
        self.recompute_point_count();
    }

    /// Append a batch of samples
    pub fn add_samples<R, I, K>(&mut self, rows: R)
    where
        R: IntoIterator<Item = I>,
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        for row in rows {
            self.add_sample(row);
        }
    }

    /// Replace a field's full series, creating the field if needed
    pub fn add_series(&mut self, name: &str, values: Vec<f64>) {
        self.add_field(name);
        self.series.insert(name.to_string(), values);
        self.recompute_point_count();
    }

    /// Extend every series shorter than the point count with `fill`
    ///
    /// Used by the parsers to keep ragged input consistent.
    pub fn pad_series(&mut self, fill: f64) {
        let target = self.point_count;
        for values in self.series.values_mut() {
            if values.len() < target {
                values.resize(target, fill);
            }
        }
    }

    // === Data access ===

    /// Series for a field; empty for unknown fields
    pub fn series(&self, name: &str) -> &[f64] {
        self.series.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Value at `index`, or 0.0 when the field or index is out of range
    pub fn value(&self, name: &str, index: usize) -> f64 {
        self.series(name).get(index).copied().unwrap_or(0.0)
    }

    /// Synthesize sample `index`
    ///
    /// Returns `None` when `index >= len()`. Every known field is present;
    /// fields whose series is too short read as 0.0.
    pub fn sample(&self, index: usize) -> Option<Sample> {
        if index >= self.point_count {
            return None;
        }
        Some(
            self.fields
                .iter()
                .map(|name| (name.clone(), self.value(name, index)))
                .collect(),
        )
    }

    // === Metadata ===

    /// Attach a metadata value to an existing field. Returns false if the field is unknown.
    pub fn set_field_metadata(&mut self, field: &str, key: &str, value: MetadataValue) -> bool {
        if !self.has_field(field) {
            tracing::debug!(field, key, "Ignoring metadata for unknown field");
            return false;
        }
        self.metadata
            .entry(field.to_string())
            .or_default()
            .insert(key.to_string(), value);
        true
    }

    pub fn field_metadata(&self, field: &str, key: &str) -> Option<&MetadataValue> {
        self.metadata.get(field).and_then(|m| m.get(key))
    }

    /// All metadata of a field
    pub fn field_metadata_all(&self, field: &str) -> Option<&HashMap<String, MetadataValue>> {
        self.metadata.get(field)
    }

    pub fn set_field_color(&mut self, field: &str, color: &str) -> bool {
        self.set_field_metadata(field, COLOR_KEY, MetadataValue::from(color))
    }

    pub fn set_field_visible(&mut self, field: &str, visible: bool) -> bool {
        self.set_field_metadata(field, VISIBLE_KEY, MetadataValue::Bool(visible))
    }

    // === Validation and statistics ===

    /// True when the store is non-empty and every non-empty series has `len()` values
    pub fn is_valid(&self) -> bool {
        self.point_count > 0 && self.is_consistent()
    }

    fn is_consistent(&self) -> bool {
        self.series
            .values()
            .all(|values| values.is_empty() || values.len() == self.point_count)
    }

    /// Number of samples (max series length)
    pub fn len(&self) -> usize {
        self.point_count
    }

    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    /// Compute per-field ranges and averages, O(n) per field
    pub fn calculate_statistics(&self) -> StoreStatistics {
        let mut stats = StoreStatistics {
            total_points: self.point_count,
            ..Default::default()
        };

        for name in &self.fields {
            let finite: Vec<f64> = self
                .series(name)
                .iter()
                .copied()
                .filter(|v| v.is_finite())
                .collect();
            if finite.is_empty() {
                continue;
            }
            let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
            let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let sum: f64 = finite.iter().sum();
            stats.ranges.insert(name.clone(), (min, max));
            stats.averages.insert(name.clone(), sum / finite.len() as f64);
        }

        stats.valid_points = (0..self.point_count)
            .filter(|&i| {
                self.fields.iter().all(|name| {
                    self.series(name)
                        .get(i)
                        .map(|v| v.is_finite())
                        .unwrap_or(false)
                })
            })
            .count();

        stats
    }

    // === Subsets ===

    /// Deep copy of samples `[start, end)`, clamped to the store
    pub fn subset(&self, start: usize, end: usize) -> SampleStore {
        let end = end.min(self.point_count);
        let start = start.min(end);

        let mut out = SampleStore::new();
        for name in &self.fields {
            let values = self.series(name);
            let slice = if values.len() >= end {
                values[start..end].to_vec()
            } else {
                values.get(start..).map(<[f64]>::to_vec).unwrap_or_default()
            };
            out.add_series(name, slice);
            if let Some(meta) = self.metadata.get(name) {
                out.metadata.insert(name.clone(), meta.clone());
            }
        }
        out
    }

    /// Deep copy of the named fields, in the order given; unknown names are ignored
    pub fn subset_by_fields<S: AsRef<str>>(&self, names: &[S]) -> SampleStore {
        let mut out = SampleStore::new();
        for name in names {
            let name = name.as_ref();
            if let Some(values) = self.series.get(name) {
                out.add_series(name, values.clone());
                if let Some(meta) = self.metadata.get(name) {
                    out.metadata.insert(name.to_string(), meta.clone());
                }
            }
        }
        out
    }

    fn recompute_point_count(&mut self) {
        self.point_count = self.series.values().map(Vec::len).max().unwrap_or(0);
    }
}
