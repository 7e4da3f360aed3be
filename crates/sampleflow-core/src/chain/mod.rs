//! Transform registry and chain runner
//!
//! A [`ChainEngine`] owns its registered transforms by name. Stages run in
//! the order given to [`ChainEngine::run_chain`], each reading the previous
//! stage's output from a fresh intermediate store.

use crate::store::SampleStore;
use crate::transform::{
    Capabilities, Capability, ParamValue, Transform, TransformError, TransformKind,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use thiserror::Error;

/// Errors raised by the chain engine
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Chain has no stages")]
    EmptyChain,

    #[error("Transform not registered: {0}")]
    NotRegistered(String),

    #[error("Transform {0} is not loaded")]
    NotLoaded(String),

    #[error("Failed to initialize {name}: {message}")]
    InitFailed { name: String, message: String },

    #[error("Stage {stage} failed: {message}")]
    StageFailed { stage: String, message: String },

    #[error("Transform {0} does not support real-time processing")]
    NotRealTime(String),

    #[error("Parameter rejected by {name}")]
    Parameter {
        name: String,
        #[source]
        source: TransformError,
    },
}

/// Aggregated statistics for one registered transform
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainStats {
    pub is_loaded: bool,
    pub total_processing_time_ms: f64,
    pub total_processed_count: usize,
    pub run_count: usize,
    pub last_error: Option<String>,
    pub capabilities: Capabilities,
    pub kind: Option<TransformKind>,
}

struct Entry {
    transform: Box<dyn Transform>,
    stats: ChainStats,
}

/// Owned registry of named transforms
#[derive(Default)]
pub struct ChainEngine {
    entries: BTreeMap<String, Entry>,
}

impl ChainEngine {
    pub fn new() -> Self {
        Self::default()
    }

    // === Registry ===

    /// Initialize `transform` and register it under `name`
    ///
    /// A transform already registered under `name` is shut down first.
    pub fn register(
        &mut self,
        name: &str,
        mut transform: Box<dyn Transform>,
    ) -> Result<(), ChainError> {
        self.unregister(name);

        if let Err(e) = transform.initialize() {
            tracing::error!(name, error = %e, "Transform initialization failed");
            return Err(ChainError::InitFailed {
                name: name.to_string(),
                message: e.to_string(),
            });
        }

        let stats = ChainStats {
            is_loaded: true,
            capabilities: transform.capabilities(),
            kind: Some(transform.kind()),
            last_error: transform.last_error().map(str::to_string),
            ..ChainStats::default()
        };
        tracing::info!(
            name,
            transform = transform.name(),
            version = transform.version(),
            "Registered transform"
        );
        self.entries
            .insert(name.to_string(), Entry { transform, stats });
        Ok(())
    }

    /// Shut down and remove `name`. Returns false if it was not registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        let Some(mut entry) = self.entries.remove(name) else {
            return false;
        };
        if let Err(e) = entry.transform.shutdown() {
            tracing::warn!(name, error = %e, "Transform shutdown failed");
        }
        tracing::debug!(name, "Unregistered transform");
        true
    }

    /// Shut down and re-initialize `name`, clearing its pending errors
    pub fn reload(&mut self, name: &str) -> Result<(), ChainError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| ChainError::NotRegistered(name.to_string()))?;

        if let Err(e) = entry.transform.shutdown() {
            tracing::warn!(name, error = %e, "Transform shutdown failed");
        }
        match entry.transform.initialize() {
            Ok(()) => {
                entry.stats.is_loaded = true;
                entry.stats.last_error = entry.transform.last_error().map(str::to_string);
                tracing::info!(name, "Reloaded transform");
                Ok(())
            }
            Err(e) => {
                entry.stats.is_loaded = false;
                entry.stats.last_error = Some(e.to_string());
                Err(ChainError::InitFailed {
                    name: name.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Loaded transform registered under `name`
    pub fn get(&self, name: &str) -> Option<&dyn Transform> {
        self.entries
            .get(name)
            .filter(|e| e.stats.is_loaded)
            .map(|e| e.transform.as_ref())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn Transform + 'static)> {
        self.entries
            .get_mut(name)
            .filter(|e| e.stats.is_loaded)
            .map(|e| e.transform.as_mut())
    }

    fn loaded_mut(&mut self, name: &str) -> Result<&mut Entry, ChainError> {
        match self.entries.get_mut(name) {
            Some(entry) if entry.stats.is_loaded => Ok(entry),
            Some(_) => Err(ChainError::NotLoaded(name.to_string())),
            None => Err(ChainError::NotRegistered(name.to_string())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn list_by_capability(&self, capability: Capability) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, e)| e.stats.is_loaded && e.transform.capabilities().has(capability))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn list_by_kind(&self, kind: TransformKind) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, e)| e.stats.is_loaded && e.transform.kind() == kind)
            .map(|(name, _)| name.clone())
            .collect()
    }

    // === Parameters ===

    pub fn set_parameter(
        &mut self,
        name: &str,
        key: &str,
        value: ParamValue,
    ) -> Result<(), ChainError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| ChainError::NotRegistered(name.to_string()))?;
        let result = entry.transform.set_parameter(key, value);
        entry.stats.last_error = entry.transform.last_error().map(str::to_string);
        result.map_err(|source| ChainError::Parameter {
            name: name.to_string(),
            source,
        })
    }

    pub fn parameter(&self, name: &str, key: &str) -> Option<ParamValue> {
        self.entries.get(name)?.transform.parameter(key)
    }

    // === Processing ===

    /// Run a single transform, updating its statistics
    pub fn run_one(
        &mut self,
        name: &str,
        input: &SampleStore,
        output: &mut SampleStore,
    ) -> Result<(), ChainError> {
        let entry = self.loaded_mut(name)?;

        let started = Instant::now();
        let result = entry.transform.process_data(input, output);
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let stats = &mut entry.stats;
        stats.run_count += 1;
        stats.total_processing_time_ms += elapsed_ms;
        stats.total_processed_count = entry.transform.processed_count();

        match result {
            Ok(()) => {
                stats.last_error = None;
                tracing::debug!(
                    name,
                    points = input.len(),
                    elapsed_ms,
                    "Stage completed"
                );
                Ok(())
            }
            Err(e) => {
                let message = entry
                    .transform
                    .last_error()
                    .map(str::to_string)
                    .unwrap_or_else(|| e.to_string());
                stats.last_error = Some(message.clone());
                tracing::warn!(name, error = %message, "Stage failed");
                Err(ChainError::StageFailed {
                    stage: name.to_string(),
                    message,
                })
            }
        }
    }

    /// Filter one value through a real-time capable transform
    pub fn run_real_time(&mut self, name: &str, value: f64) -> Result<f64, ChainError> {
        let entry = self.loaded_mut(name)?;
        if !entry.transform.supports_real_time() {
            return Err(ChainError::NotRealTime(name.to_string()));
        }
        entry
            .transform
            .process_sample(value)
            .ok_or_else(|| ChainError::NotRealTime(name.to_string()))
    }

    /// Run `names` in order, feeding each stage's output to the next
    ///
    /// `output` receives the last stage's result and is left untouched when
    /// any stage fails.
    pub fn run_chain<S: AsRef<str>>(
        &mut self,
        names: &[S],
        input: &SampleStore,
        output: &mut SampleStore,
    ) -> Result<(), ChainError> {
        if names.is_empty() {
            return Err(ChainError::EmptyChain);
        }
        for name in names {
            let name = name.as_ref();
            match self.entries.get(name) {
                Some(entry) if entry.stats.is_loaded => {}
                Some(_) => return Err(ChainError::NotLoaded(name.to_string())),
                None => return Err(ChainError::NotRegistered(name.to_string())),
            }
        }

        let started = Instant::now();
        let mut current: Option<SampleStore> = None;
        for name in names {
            let source = current.as_ref().unwrap_or(input);
            let mut next = SampleStore::new();
            self.run_one(name.as_ref(), source, &mut next)?;
            current = Some(next);
        }

        if let Some(result) = current {
            *output = result;
        }
        tracing::info!(
            stages = names.len(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Chain completed"
        );
        Ok(())
    }

    // === Statistics ===

    pub fn stats(&self, name: &str) -> Option<&ChainStats> {
        self.entries.get(name).map(|e| &e.stats)
    }

    pub fn all_stats(&self) -> BTreeMap<String, ChainStats> {
        self.entries
            .iter()
            .map(|(name, e)| (name.clone(), e.stats.clone()))
            .collect()
    }
}

impl std::fmt::Debug for ChainEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainEngine")
            .field("transforms", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Drop for ChainEngine {
    fn drop(&mut self) {
        for (name, entry) in self.entries.iter_mut() {
            if let Err(e) = entry.transform.shutdown() {
                tracing::warn!(name = %name, error = %e, "Transform shutdown failed");
            }
        }
    }
}
