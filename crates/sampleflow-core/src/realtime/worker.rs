//! Generator thread
//!
//! Three independent locks are shared with the owning source:
//! - `control`: pause/stop flags, paired with `wake` for prompt wake-ups
//! - `live`: running statistics and the live rate/amplitude
//! - `ring`: retained samples
//!
//! The worker never holds two of them at once.

use super::ring::SampleRing;
use super::waveform::{self, Generator, Shape, WaveformMode};
use crate::source::Notifier;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Lock a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub(crate) struct Control {
    pub paused: bool,
    pub stop: bool,
}

/// Statistics and live parameters, guarded by one lock
#[derive(Debug)]
pub(crate) struct LiveState {
    pub sample_rate_hz: f64,
    pub amplitude: f64,
    pub generated: u64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub current: f64,
    pub retained: usize,
    pub started: Option<Instant>,
    /// Elapsed seconds frozen by the last stop
    pub elapsed_at_stop: f64,
    /// Why the worker of the current run died, if it did
    pub failure: Option<String>,
}

impl LiveState {
    pub fn new(sample_rate_hz: f64, amplitude: f64) -> Self {
        Self {
            sample_rate_hz,
            amplitude,
            generated: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            current: 0.0,
            retained: 0,
            started: None,
            elapsed_at_stop: 0.0,
            failure: None,
        }
    }

    /// Clear counters for a new run, keeping the live parameters
    pub fn restart(&mut self, now: Instant) {
        *self = Self {
            started: Some(now),
            ..Self::new(self.sample_rate_hz, self.amplitude)
        };
    }

    fn record(&mut self, value: f64, retained: usize) {
        self.generated += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.current = value;
        self.retained = retained;
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started
            .map(|s| s.elapsed().as_secs_f64())
            .unwrap_or(self.elapsed_at_stop)
    }
}

/// State shared between a source and its worker
#[derive(Debug)]
pub(crate) struct Shared {
    pub control: Mutex<Control>,
    pub wake: Condvar,
    pub live: Mutex<LiveState>,
    pub ring: Mutex<SampleRing>,
    pub new_data: AtomicBool,
}

impl Shared {
    pub fn new(sample_rate_hz: f64, amplitude: f64, buffer_size: usize) -> Self {
        Self {
            control: Mutex::new(Control::default()),
            wake: Condvar::new(),
            live: Mutex::new(LiveState::new(sample_rate_hz, amplitude)),
            ring: Mutex::new(SampleRing::new(buffer_size)),
            new_data: AtomicBool::new(false),
        }
    }
}

/// Parameters fixed for the lifetime of one worker
pub(crate) struct WorkerSettings {
    pub mode: WaveformMode,
    pub frequency_hz: f64,
    pub offset: f64,
    pub noise_level: f64,
    pub custom: Option<Generator>,
}

/// Spawn the worker thread
pub(crate) fn spawn(
    shared: Arc<Shared>,
    settings: WorkerSettings,
    notifier: Notifier,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("realtime-worker".into())
        .spawn(move || {
            let run = AssertUnwindSafe(|| generation_loop(&shared, &settings, &notifier));
            match std::panic::catch_unwind(run) {
                Ok(()) => tracing::debug!("Realtime worker exited normally"),
                Err(payload) => report_panic(&shared, &notifier, payload),
            }
        })
}

/// Record a worker panic in the live state and publish it as an error
fn report_panic(shared: &Shared, notifier: &Notifier, payload: Box<dyn Any + Send>) {
    let reason = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!(%reason, "Realtime worker panicked, generation halted");
    lock(&shared.live).failure = Some(reason.clone());
    notifier.error(&format!("realtime worker panicked: {}", reason));
}

fn generation_loop(shared: &Shared, settings: &WorkerSettings, notifier: &Notifier) {
    let mut rng = StdRng::from_entropy();
    let started = lock(&shared.live).started.unwrap_or_else(Instant::now);
    let mut last_tick = Instant::now();
    let mut budget = Duration::ZERO;

    tracing::info!(mode = %settings.mode, "Realtime worker running");

    loop {
        {
            let mut control = lock(&shared.control);
            if control.stop {
                break;
            }
            if control.paused {
                tracing::debug!("Realtime worker paused");
                while control.paused && !control.stop {
                    control = shared
                        .wake
                        .wait(control)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                if control.stop {
                    break;
                }
                tracing::debug!("Realtime worker resumed");
                budget = Duration::ZERO;
                last_tick = Instant::now();
                continue;
            }
        }

        let now = Instant::now();
        budget += now - last_tick;
        last_tick = now;

        let (rate, amplitude) = {
            let live = lock(&shared.live);
            (live.sample_rate_hz, live.amplitude)
        };
        let period = Duration::from_secs_f64(1.0 / rate);

        if budget >= period {
            budget = Duration::ZERO;
            let t = now.duration_since(started).as_secs_f64();
            let shape = Shape {
                amplitude,
                frequency_hz: settings.frequency_hz,
                offset: settings.offset,
            };
            let value = waveform::evaluate(settings.mode, t, shape, settings.custom.as_ref(), &mut rng)
                + waveform::noise(settings.noise_level, &mut rng);

            let retained = {
                let mut ring = lock(&shared.ring);
                ring.push(t, value);
                ring.len()
            };
            lock(&shared.live).record(value, retained);
            shared.new_data.store(true, Ordering::Release);
            notifier.data_ready();
        }

        let remaining = period.saturating_sub(budget);
        let control = lock(&shared.control);
        if !control.stop && !control.paused {
            let _ = shared
                .wake
                .wait_timeout(control, remaining)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    tracing::info!("Realtime worker stopping");
}
