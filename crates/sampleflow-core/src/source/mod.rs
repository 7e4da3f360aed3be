//! Data sources
//!
//! A source is a small state machine (`Stopped → Running → Error`) that
//! populates a [`SampleStore`](crate::SampleStore):
//! - Delimited files with delimiter auto-detection ([`file`])
//! - Configurable column mapping and validation ([`custom`])
//! - Line tokenizers shared by both ([`parser`])
//!
//! The realtime generator lives in [`crate::realtime`].
//!
//! Consumers learn about new data through a bounded channel returned by
//! [`Source::subscribe`]. Optional callbacks are supported too; the realtime
//! source invokes them from its worker thread, so hosts with single-threaded
//! state must re-dispatch themselves.

pub mod custom;
pub mod file;
pub mod parser;

pub use custom::{CustomSource, CustomStats, ParseConfig, ValidationRule};
pub use file::{FileOptions, FileSource, ParseCounters};
pub use parser::{DelimitedParser, LineParser};

use crate::config::ConfigError;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Capacity of the notification channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Errors that can occur during source operations
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Data source path not set")]
    EmptyPath,

    #[error("Cannot open {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Failed to spawn worker: {0}")]
    Spawn(std::io::Error),

    #[error("Source is not running")]
    NotRunning,

    #[error("Invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
}

/// Source state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum SourceState {
    /// Source is stopped (initial state)
    #[default]
    Stopped,
    /// Source is producing data
    Running,
    /// Source failed to start
    Error,
}

/// Notification published by a source
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// The store changed; consumers should re-read it
    DataReady,
    /// Something failed; the message is human readable
    Error(String),
}

/// Callback invoked on [`SourceEvent::DataReady`]
pub type DataReadyCallback = Arc<dyn Fn() + Send + Sync>;

/// Callback invoked on [`SourceEvent::Error`]
pub type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Fan-out of source notifications to a channel and optional callbacks
///
/// Cloning a notifier shares the channel and callbacks, which is how the
/// realtime worker reports from its own thread.
#[derive(Clone)]
pub struct Notifier {
    tx: Sender<SourceEvent>,
    rx: Receiver<SourceEvent>,
    on_data_ready: Option<DataReadyCallback>,
    on_error: Option<ErrorCallback>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY);
        Self {
            tx,
            rx,
            on_data_ready: None,
            on_error: None,
        }
    }

    /// Receiver for this notifier's events
    pub fn subscribe(&self) -> Receiver<SourceEvent> {
        self.rx.clone()
    }

    pub fn set_data_ready_callback(&mut self, callback: DataReadyCallback) {
        self.on_data_ready = Some(callback);
    }

    pub fn set_error_callback(&mut self, callback: ErrorCallback) {
        self.on_error = Some(callback);
    }

    pub fn data_ready(&self) {
        self.publish(SourceEvent::DataReady);
        if let Some(cb) = &self.on_data_ready {
            cb();
        }
    }

    pub fn error(&self, message: &str) {
        self.publish(SourceEvent::Error(message.to_string()));
        if let Some(cb) = &self.on_error {
            cb(message);
        }
    }

    fn publish(&self, event: SourceEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::trace!(?event, "Notification channel full, dropping event");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("pending", &self.rx.len())
            .field("on_data_ready", &self.on_data_ready.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Common contract of every data source
pub trait Source: Send {
    /// Apply a configuration payload (source specific)
    fn initialize(&mut self, config: &str) -> Result<(), SourceError>;

    /// Begin producing data. On failure the state becomes [`SourceState::Error`]
    /// and an error notification is published.
    fn start(&mut self) -> Result<(), SourceError>;

    /// Stop, release resources and clear accumulated data
    fn stop(&mut self);

    fn state(&self) -> SourceState;

    /// Single-series convenience view; clears the new-data flag
    fn data(&mut self) -> Vec<f64>;

    fn has_new_data(&self) -> bool;

    fn notifier(&self) -> &Notifier;

    fn notifier_mut(&mut self) -> &mut Notifier;

    /// Receiver for this source's notifications
    fn subscribe(&self) -> Receiver<SourceEvent> {
        self.notifier().subscribe()
    }

    fn set_data_ready_callback(&mut self, callback: DataReadyCallback) {
        self.notifier_mut().set_data_ready_callback(callback);
    }

    fn set_error_callback(&mut self, callback: ErrorCallback) {
        self.notifier_mut().set_error_callback(callback);
    }
}

/// Read a text file, replacing invalid UTF-8 sequences with U+FFFD
///
/// Undecodable bytes only spoil the lines they sit on, which the line
/// parsers then count as skipped.
pub(crate) fn read_text(path: &Path) -> Result<String, SourceError> {
    let bytes = std::fs::read(path).map_err(|source| SourceError::Io {
        path: path.display().to_string(),
        source,
    })?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) => {
            tracing::warn!(path = %path.display(), "File contains invalid UTF-8, bad bytes replaced");
            Ok(String::from_utf8_lossy(err.as_bytes()).into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_notifier_channel_and_callbacks() {
        let mut notifier = Notifier::new();
        let rx = notifier.subscribe();
        let ready = Arc::new(AtomicUsize::new(0));
        let ready_clone = Arc::clone(&ready);
        notifier.set_data_ready_callback(Arc::new(move || {
            ready_clone.fetch_add(1, Ordering::Relaxed);
        }));

        notifier.data_ready();
        notifier.error("boom");

        assert_eq!(rx.try_recv().unwrap(), SourceEvent::DataReady);
        assert_eq!(rx.try_recv().unwrap(), SourceEvent::Error("boom".into()));
        assert_eq!(ready.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_notifier_drops_when_full() {
        let notifier = Notifier::new();
        let rx = notifier.subscribe();
        for _ in 0..EVENT_CHANNEL_CAPACITY + 10 {
            notifier.data_ready();
        }
        assert_eq!(rx.len(), EVENT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_default_state_is_stopped() {
        assert_eq!(SourceState::default(), SourceState::Stopped);
    }
}
