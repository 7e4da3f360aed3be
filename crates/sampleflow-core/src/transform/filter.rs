//! Moving-average and IIR low-pass filters
//!
//! Both filters run every input field through the same per-sample routine
//! and write one output series per input field.

use super::{
    copy_field_metadata, Capabilities, ParamValue, Transform, TransformError, TransformKind,
    TransformState,
};
use crate::store::SampleStore;
use std::collections::{BTreeMap, VecDeque};
use std::f64::consts::PI;

/// Quality factor of the second-order section
const BIQUAD_Q: f64 = 0.707;

/// Highest accepted low-pass order
pub const MAX_FILTER_ORDER: i64 = 10;

/// Sliding-window mean
///
/// The window is **shared across fields and calls**: the first samples of a
/// field are averaged with the tail of the previous one. It is reset only by
/// `initialize`, `shutdown`, a `window_size` change or
/// [`reset_real_time_state`](Transform::reset_real_time_state).
#[derive(Debug, Clone)]
pub struct MovingAverageFilter {
    state: TransformState,
    window_size: usize,
    cutoff_frequency: f64,
    filter_order: i64,
    window: Vec<f64>,
    next: usize,
    sum: f64,
}

impl MovingAverageFilter {
    pub const DEFAULT_WINDOW: usize = 5;

    pub fn new() -> Self {
        Self {
            state: TransformState::default(),
            window_size: Self::DEFAULT_WINDOW,
            cutoff_frequency: 0.1,
            filter_order: 2,
            window: Vec::with_capacity(Self::DEFAULT_WINDOW),
            next: 0,
            sum: 0.0,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    fn reset_window(&mut self) {
        self.window.clear();
        self.next = 0;
        self.sum = 0.0;
    }

    /// Partial-window mean until the window fills, then a sliding mean
    fn filter(&mut self, value: f64) -> f64 {
        if self.window.len() < self.window_size {
            self.window.push(value);
            self.sum += value;
            return self.sum / self.window.len() as f64;
        }
        self.sum -= self.window[self.next];
        self.window[self.next] = value;
        self.sum += value;
        self.next = (self.next + 1) % self.window_size;
        self.sum / self.window_size as f64
    }
}

impl Default for MovingAverageFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for MovingAverageFilter {
    fn name(&self) -> &str {
        "MovingAverageFilter"
    }

    fn description(&self) -> &str {
        "Moving-average filter smoothing noisy series"
    }

    fn kind(&self) -> TransformKind {
        TransformKind::Filter
    }

    fn state(&self) -> &TransformState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut TransformState {
        &mut self.state
    }

    fn initialize(&mut self) -> Result<(), TransformError> {
        self.reset_window();
        self.state.initialize();
        tracing::debug!(window = self.window_size, "Moving average initialized");
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), TransformError> {
        self.reset_window();
        self.state.shutdown();
        Ok(())
    }

    fn process_data(
        &mut self,
        input: &SampleStore,
        output: &mut SampleStore,
    ) -> Result<(), TransformError> {
        let started = self.state.begin()?;
        if input.field_count() == 0 {
            return Err(self.state.fail(TransformError::EmptyInput));
        }

        for name in input.field_names() {
            let series = input.series(name);
            if series.is_empty() {
                continue;
            }
            let filtered: Vec<f64> = series.iter().map(|&v| self.filter(v)).collect();
            output.add_series(name, filtered);
            copy_field_metadata(input, output, name);
        }

        self.state.finish(started, input.len());
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::REAL_TIME_AND_BATCH
    }

    fn process_sample(&mut self, value: f64) -> Option<f64> {
        Some(self.filter(value))
    }

    fn reset_real_time_state(&mut self) {
        self.reset_window();
    }

    fn set_parameter(&mut self, key: &str, value: ParamValue) -> Result<(), TransformError> {
        match key {
            "window_size" => match value.as_i64() {
                Some(size) if size > 0 => {
                    self.window_size = size as usize;
                    if self.state.is_initialized() {
                        self.reset_window();
                    }
                }
                _ => return Err(self.state.reject(key, &value, "an integer > 0")),
            },
            "cutoff_frequency" => match value.as_f64() {
                Some(f) if f > 0.0 => self.cutoff_frequency = f,
                _ => return Err(self.state.reject(key, &value, "a number > 0")),
            },
            "filter_order" => match value.as_i64() {
                Some(order) if order > 0 => self.filter_order = order,
                _ => return Err(self.state.reject(key, &value, "an integer > 0")),
            },
            _ => return Err(self.state.unknown_key(key)),
        }
        self.state.accept(key);
        Ok(())
    }

    fn parameter(&self, key: &str) -> Option<ParamValue> {
        match key {
            "window_size" => Some(ParamValue::Int(self.window_size as i64)),
            "cutoff_frequency" => Some(ParamValue::Float(self.cutoff_frequency)),
            "filter_order" => Some(ParamValue::Int(self.filter_order)),
            _ => None,
        }
    }

    fn default_parameters(&self) -> BTreeMap<String, ParamValue> {
        BTreeMap::from([
            (
                "window_size".to_string(),
                ParamValue::Int(Self::DEFAULT_WINDOW as i64),
            ),
            ("cutoff_frequency".to_string(), ParamValue::Float(0.1)),
            ("filter_order".to_string(), ParamValue::Int(2)),
        ])
    }

    fn validate_parameters(&self) -> bool {
        self.window_size > 0 && self.cutoff_frequency > 0.0 && self.filter_order > 0
    }
}

/// IIR low-pass filter
///
/// `y[i] = Σ b[j]·x[i-j] − Σ_{j≥1} a[j]·y[i-j]`, with zero history at the
/// start of every field in batch mode.
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    state: TransformState,
    /// Normalized cutoff, in (0, 1)
    cutoff_frequency: f64,
    filter_order: i64,
    a: Vec<f64>,
    b: Vec<f64>,
    x_history: VecDeque<f64>,
    y_history: VecDeque<f64>,
}

impl LowPassFilter {
    pub fn new() -> Self {
        let mut filter = Self {
            state: TransformState::default(),
            cutoff_frequency: 0.1,
            filter_order: 2,
            a: Vec::new(),
            b: Vec::new(),
            x_history: VecDeque::new(),
            y_history: VecDeque::new(),
        };
        filter.compute_coefficients();
        filter
    }

    /// Feedback coefficients `a` (index 0 unused by the recurrence)
    pub fn a(&self) -> &[f64] {
        &self.a
    }

    /// Feed-forward coefficients `b`
    pub fn b(&self) -> &[f64] {
        &self.b
    }

    fn compute_coefficients(&mut self) {
        let fc = self.cutoff_frequency;
        match self.filter_order {
            1 => {
                let rc = 1.0 / (2.0 * PI * fc);
                let alpha = 1.0 / (rc + 1.0);
                self.a = vec![1.0, alpha - 1.0];
                self.b = vec![alpha, 0.0];
                self.state.set_warning(None);
            }
            2 => {
                let wc = 2.0 * PI * fc;
                let wc2 = wc * wc;
                let a0 = 4.0 + 2.0 * wc / BIQUAD_Q + wc2;
                let a1 = 2.0 * wc2 - 8.0;
                let a2 = 4.0 - 2.0 * wc / BIQUAD_Q + wc2;
                self.a = vec![a0, a1 / a0, a2 / a0];
                self.b = vec![wc2 / a0, 2.0 * wc2 / a0, wc2 / a0];
                self.state.set_warning(None);
            }
            order => {
                let taps = order as usize + 1;
                self.a = vec![1.0];
                self.b = vec![1.0 / taps as f64; taps];
                self.state.set_warning(Some(format!(
                    "filter order {} not supported, using {}-tap averaging",
                    order, taps
                )));
            }
        }
        self.reset_real_time_state();
    }

    fn filter_series(&self, x: &[f64]) -> Vec<f64> {
        let mut y: Vec<f64> = Vec::with_capacity(x.len());
        for i in 0..x.len() {
            let mut acc = 0.0;
            for (j, b) in self.b.iter().enumerate().take(i + 1) {
                acc += b * x[i - j];
            }
            for (j, a) in self.a.iter().enumerate().skip(1).take(i) {
                acc -= a * y[i - j];
            }
            y.push(acc);
        }
        y
    }
}

impl Default for LowPassFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for LowPassFilter {
    fn name(&self) -> &str {
        "LowPassFilter"
    }

    fn description(&self) -> &str {
        "IIR low-pass filter removing high-frequency noise"
    }

    fn kind(&self) -> TransformKind {
        TransformKind::Filter
    }

    fn state(&self) -> &TransformState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut TransformState {
        &mut self.state
    }

    fn initialize(&mut self) -> Result<(), TransformError> {
        self.compute_coefficients();
        self.state.initialize();
        Ok(())
    }

    fn process_data(
        &mut self,
        input: &SampleStore,
        output: &mut SampleStore,
    ) -> Result<(), TransformError> {
        let started = self.state.begin()?;
        if input.field_count() == 0 {
            return Err(self.state.fail(TransformError::EmptyInput));
        }

        for name in input.field_names() {
            let series = input.series(name);
            if series.is_empty() {
                continue;
            }
            output.add_series(name, self.filter_series(series));
            copy_field_metadata(input, output, name);
        }

        self.state.finish(started, input.len());
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::REAL_TIME_AND_BATCH
    }

    fn process_sample(&mut self, value: f64) -> Option<f64> {
        self.x_history.push_front(value);
        self.x_history.truncate(self.b.len());

        let mut acc: f64 = self
            .b
            .iter()
            .zip(self.x_history.iter())
            .map(|(b, x)| b * x)
            .sum();
        acc -= self
            .a
            .iter()
            .skip(1)
            .zip(self.y_history.iter())
            .map(|(a, y)| a * y)
            .sum::<f64>();

        self.y_history.push_front(acc);
        self.y_history.truncate(self.a.len().saturating_sub(1));
        Some(acc)
    }

    fn reset_real_time_state(&mut self) {
        self.x_history.clear();
        self.y_history.clear();
    }

    fn set_parameter(&mut self, key: &str, value: ParamValue) -> Result<(), TransformError> {
        match key {
            "cutoff_frequency" => match value.as_f64() {
                Some(f) if f > 0.0 && f < 1.0 => self.cutoff_frequency = f,
                _ => return Err(self.state.reject(key, &value, "a number in (0, 1)")),
            },
            "filter_order" => match value.as_i64() {
                Some(order) if (1..=MAX_FILTER_ORDER).contains(&order) => self.filter_order = order,
                _ => return Err(self.state.reject(key, &value, "an integer in [1, 10]")),
            },
            _ => return Err(self.state.unknown_key(key)),
        }
        self.state.accept(key);
        self.compute_coefficients();
        Ok(())
    }

    fn parameter(&self, key: &str) -> Option<ParamValue> {
        match key {
            "cutoff_frequency" => Some(ParamValue::Float(self.cutoff_frequency)),
            "filter_order" => Some(ParamValue::Int(self.filter_order)),
            _ => None,
        }
    }

    fn default_parameters(&self) -> BTreeMap<String, ParamValue> {
        BTreeMap::from([
            ("cutoff_frequency".to_string(), ParamValue::Float(0.1)),
            ("filter_order".to_string(), ParamValue::Int(2)),
        ])
    }

    fn validate_parameters(&self) -> bool {
        self.cutoff_frequency > 0.0
            && self.cutoff_frequency < 1.0
            && (1..=MAX_FILTER_ORDER).contains(&self.filter_order)
    }
}
