//! Realtime synthetic source
//!
//! [`RealtimeSource`] owns one background worker that synthesizes samples
//! at `sample_rate_hz` into a bounded ring:
//!
//! - `start()` spawns the worker, `stop()` signals and **joins** it
//! - `pause()`/`resume()` suspend generation without ending the thread
//! - statistics and live parameters may be read or changed at any time
//!
//! The worker publishes `DataReady` from its own thread.

pub mod ring;
pub mod waveform;
mod worker;

pub use ring::{SampleRing, TIME_FIELD, VALUE_FIELD};
pub use waveform::{Generator, WaveformMode};

use crate::config::{self, ConfigError};
use crate::source::{Notifier, Source, SourceError, SourceState};
use crate::store::SampleStore;
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use worker::{lock, Shared, WorkerSettings};

/// Highest accepted sample rate
pub const MAX_SAMPLE_RATE_HZ: f64 = 1000.0;

/// Realtime source configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub mode: WaveformMode,
    pub sample_rate_hz: f64,
    pub amplitude: f64,
    pub frequency_hz: f64,
    pub offset: f64,
    /// Standard deviation of additive noise; 0 disables it
    pub noise_level: f64,
    /// Retained points before the oldest is evicted
    pub buffer_size: usize,
    /// Start the worker at the end of `initialize`
    pub auto_start: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            mode: WaveformMode::SineWave,
            sample_rate_hz: 10.0,
            amplitude: 1.0,
            frequency_hz: 1.0,
            offset: 0.0,
            noise_level: 0.0,
            buffer_size: 1000,
            auto_start: false,
        }
    }
}

fn valid_rate(rate: f64) -> bool {
    rate > 0.0 && rate <= MAX_SAMPLE_RATE_HZ
}

impl RealtimeConfig {
    /// Parse an empty payload, a JSON object, or `key=value` pairs
    ///
    /// # Example
    /// ```
    /// use sampleflow_core::{RealtimeConfig, WaveformMode};
    ///
    /// let cfg = RealtimeConfig::from_payload("mode=SquareWave;rate=100;buffer=50").unwrap();
    /// assert_eq!(cfg.mode, WaveformMode::SquareWave);
    /// assert_eq!(cfg.buffer_size, 50);
    ///
    /// let cfg = RealtimeConfig::from_payload(r#"{"amplitude": 2.0}"#).unwrap();
    /// assert_eq!(cfg.amplitude, 2.0);
    /// ```
    pub fn from_payload(payload: &str) -> Result<Self, ConfigError> {
        let payload = payload.trim();
        let cfg = if payload.is_empty() {
            Self::default()
        } else if payload.starts_with('{') {
            serde_json::from_str(payload).map_err(|e| ConfigError::Json(e.to_string()))?
        } else {
            let mut cfg = Self::default();
            for (key, value) in config::parse_pairs(payload)? {
                match key.as_str() {
                    "mode" => {
                        cfg.mode = value.parse().map_err(|_| ConfigError::InvalidValue {
                            key: key.clone(),
                            value: value.clone(),
                        })?
                    }
                    "rate" => cfg.sample_rate_hz = config::parse_f64(&key, &value)?,
                    "amplitude" => cfg.amplitude = config::parse_f64(&key, &value)?,
                    "frequency" => cfg.frequency_hz = config::parse_f64(&key, &value)?,
                    "offset" => cfg.offset = config::parse_f64(&key, &value)?,
                    "noise" => cfg.noise_level = config::parse_f64(&key, &value)?,
                    "buffer" => cfg.buffer_size = config::parse_usize(&key, &value)?,
                    "auto_start" => cfg.auto_start = config::parse_bool(&key, &value)?,
                    _ => return Err(ConfigError::UnknownKey(key)),
                }
            }
            cfg
        };

        if !valid_rate(cfg.sample_rate_hz) {
            return Err(ConfigError::InvalidValue {
                key: "rate".into(),
                value: cfg.sample_rate_hz.to_string(),
            });
        }
        if cfg.buffer_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "buffer".into(),
                value: "0".into(),
            });
        }
        Ok(cfg)
    }
}

/// Snapshot of the running statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RealtimeStats {
    pub elapsed_secs: f64,
    /// Points currently retained (bounded by the buffer size)
    pub total_samples: usize,
    /// Points generated since the last start
    pub generated_samples: u64,
    pub current_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub average_value: f64,
}

/// Synthetic source driven by a background worker
pub struct RealtimeSource {
    config: RealtimeConfig,
    shared: Arc<Shared>,
    custom: Option<Generator>,
    worker: Option<JoinHandle<()>>,
    state: SourceState,
    notifier: Notifier,
}

impl RealtimeSource {
    pub fn new(config: RealtimeConfig) -> Self {
        let shared = Shared::new(config.sample_rate_hz, config.amplitude, config.buffer_size);
        Self {
            config,
            shared: Arc::new(shared),
            custom: None,
            worker: None,
            state: SourceState::Stopped,
            notifier: Notifier::new(),
        }
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    /// Suspend generation; the worker stays alive
    pub fn pause(&self) {
        if self.state != SourceState::Running {
            return;
        }
        lock(&self.shared.control).paused = true;
        self.shared.wake.notify_all();
        tracing::info!("Realtime source paused");
    }

    pub fn resume(&self) {
        let mut control = lock(&self.shared.control);
        if self.state == SourceState::Running && control.paused {
            control.paused = false;
            drop(control);
            self.shared.wake.notify_all();
            tracing::info!("Realtime source resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.shared.control).paused
    }

    /// Change the rate; applies from the next tick
    pub fn set_sample_rate(&mut self, rate_hz: f64) -> Result<(), SourceError> {
        if !valid_rate(rate_hz) {
            return Err(SourceError::InvalidParameter {
                name: "sample_rate_hz",
                value: rate_hz,
            });
        }
        lock(&self.shared.live).sample_rate_hz = rate_hz;
        self.config.sample_rate_hz = rate_hz;
        tracing::debug!(rate_hz, "Sample rate changed");
        Ok(())
    }

    pub fn sample_rate(&self) -> f64 {
        lock(&self.shared.live).sample_rate_hz
    }

    pub fn set_amplitude(&mut self, amplitude: f64) {
        lock(&self.shared.live).amplitude = amplitude;
        self.config.amplitude = amplitude;
    }

    pub fn amplitude(&self) -> f64 {
        lock(&self.shared.live).amplitude
    }

    /// Install a custom generator and switch to [`WaveformMode::CustomFunction`]
    ///
    /// Takes effect on the next `start`.
    pub fn set_custom_generator<F>(&mut self, generator: F)
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        self.custom = Some(Arc::new(generator));
        self.config.mode = WaveformMode::CustomFunction;
    }

    /// Resize retention, evicting the oldest points if it shrinks
    pub fn set_buffer_size(&mut self, buffer_size: usize) {
        self.config.buffer_size = buffer_size.max(1);
        lock(&self.shared.ring).set_capacity(buffer_size);
    }

    pub fn statistics(&self) -> RealtimeStats {
        let live = lock(&self.shared.live);
        let has_samples = live.generated > 0;
        RealtimeStats {
            elapsed_secs: live.elapsed_secs(),
            total_samples: live.retained,
            generated_samples: live.generated,
            current_value: live.current,
            min_value: if has_samples { live.min } else { 0.0 },
            max_value: if has_samples { live.max } else { 0.0 },
            average_value: if has_samples {
                live.sum / live.generated as f64
            } else {
                0.0
            },
        }
    }

    /// Panic message of the current run's worker, if it died
    pub fn worker_failure(&self) -> Option<String> {
        lock(&self.shared.live).failure.clone()
    }

    /// Copy of the retained samples as a `time`/`value` store
    pub fn snapshot(&self) -> SampleStore {
        lock(&self.shared.ring).to_store()
    }

    /// Seconds since `start`, 0 when not running
    pub fn elapsed_secs(&self) -> f64 {
        if self.state != SourceState::Running {
            return 0.0;
        }
        lock(&self.shared.live).elapsed_secs()
    }

    pub fn is_worker_alive(&self) -> bool {
        self.worker
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Default for RealtimeSource {
    fn default() -> Self {
        Self::new(RealtimeConfig::default())
    }
}

impl std::fmt::Debug for RealtimeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeSource")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("worker_alive", &self.is_worker_alive())
            .finish()
    }
}

impl Source for RealtimeSource {
    fn initialize(&mut self, config: &str) -> Result<(), SourceError> {
        let cfg = RealtimeConfig::from_payload(config)?;
        let was_running = self.state == SourceState::Running;
        if was_running {
            self.stop();
        }

        {
            let mut live = lock(&self.shared.live);
            live.sample_rate_hz = cfg.sample_rate_hz;
            live.amplitude = cfg.amplitude;
        }
        lock(&self.shared.ring).set_capacity(cfg.buffer_size);
        let auto_start = cfg.auto_start;
        tracing::debug!(config = ?cfg, "Realtime source configured");
        self.config = cfg;

        if auto_start || was_running {
            self.start()?;
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), SourceError> {
        if self.state == SourceState::Running {
            return Ok(());
        }

        *lock(&self.shared.control) = Default::default();
        lock(&self.shared.ring).clear();
        lock(&self.shared.live).restart(Instant::now());
        self.shared.new_data.store(false, Ordering::Release);

        let settings = WorkerSettings {
            mode: self.config.mode,
            frequency_hz: self.config.frequency_hz,
            offset: self.config.offset,
            noise_level: self.config.noise_level,
            custom: self.custom.clone(),
        };
        match worker::spawn(Arc::clone(&self.shared), settings, self.notifier.clone()) {
            Ok(handle) => {
                self.worker = Some(handle);
                self.state = SourceState::Running;
                tracing::info!(
                    mode = %self.config.mode,
                    rate_hz = self.config.sample_rate_hz,
                    buffer = self.config.buffer_size,
                    "Realtime source started"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to spawn realtime worker");
                self.state = SourceState::Error;
                let err = SourceError::Spawn(e);
                self.notifier.error(&err.to_string());
                Err(err)
            }
        }
    }

    /// Signal the worker, wait for it to exit and drop retained samples
    ///
    /// Statistics stay readable (frozen) until the next start.
    fn stop(&mut self) {
        {
            let mut control = lock(&self.shared.control);
            control.stop = true;
            control.paused = false;
        }
        self.shared.wake.notify_all();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!("Realtime worker terminated abnormally");
            }
        }

        {
            let mut live = lock(&self.shared.live);
            if let Some(started) = live.started.take() {
                live.elapsed_at_stop = started.elapsed().as_secs_f64();
            }
        }
        lock(&self.shared.ring).clear();
        self.shared.new_data.store(false, Ordering::Release);

        if self.state == SourceState::Running {
            tracing::info!("Realtime source stopped");
        }
        self.state = SourceState::Stopped;
    }

    fn state(&self) -> SourceState {
        self.state
    }

    /// Latest value as a one-element vector
    fn data(&mut self) -> Vec<f64> {
        self.shared.new_data.store(false, Ordering::Release);
        lock(&self.shared.ring)
            .latest()
            .map(|(_, value)| vec![value])
            .unwrap_or_default()
    }

    fn has_new_data(&self) -> bool {
        self.shared.new_data.load(Ordering::Acquire)
    }

    fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    fn notifier_mut(&mut self) -> &mut Notifier {
        &mut self.notifier
    }
}

impl Drop for RealtimeSource {
    fn drop(&mut self) {
        self.stop();
    }
}
