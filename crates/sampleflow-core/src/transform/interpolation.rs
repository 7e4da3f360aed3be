//! Linear resampling
//!
//! With a `time`/`Time`/`TIME` field the store is resampled onto a uniform
//! time axis from the first to the last timestamp. Without one, every field
//! is resampled along its 0-based index.

use super::{
    copy_field_metadata, ParamValue, Transform, TransformError, TransformKind, TransformState,
};
use crate::store::SampleStore;
use std::collections::BTreeMap;

/// Field names that switch to time-keyed resampling
pub const TIME_FIELDS: [&str; 3] = ["time", "Time", "TIME"];

/// Only supported method
pub const METHOD_LINEAR: &str = "linear";

/// Upper bound on resampled points per field
pub const MAX_OUTPUT_POINTS: usize = 10_000_000;

/// Linearly interpolate `ys` (over axis `xs`) at `x`
///
/// `xs` must be non-decreasing. Targets before the first point clamp to the
/// first value, targets after the last clamp to the last. A target equal to
/// an axis point returns that point's value exactly.
///
/// # Example
/// ```
/// use sampleflow_core::transform::interpolation::interpolate;
///
/// let xs = [0.0, 1.0, 2.0];
/// let ys = [0.0, 10.0, 40.0];
/// assert_eq!(interpolate(&xs, &ys, 1.5), 25.0);
/// assert_eq!(interpolate(&xs, &ys, -1.0), 0.0);
/// assert_eq!(interpolate(&xs, &ys, 9.0), 40.0);
/// ```
pub fn interpolate(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    Resampler::new(xs, ys).at(x)
}

/// Forward-scanning interpolator for increasing targets
struct Resampler<'a> {
    xs: &'a [f64],
    ys: &'a [f64],
    cursor: usize,
    last_target: f64,
}

impl<'a> Resampler<'a> {
    fn new(xs: &'a [f64], ys: &'a [f64]) -> Self {
        Self {
            xs,
            ys,
            cursor: 0,
            last_target: f64::NEG_INFINITY,
        }
    }

    fn at(&mut self, x: f64) -> f64 {
        let n = self.xs.len().min(self.ys.len());
        if n == 0 {
            return f64::NAN;
        }
        if x <= self.xs[0] {
            return self.ys[0];
        }
        if x < self.last_target {
            self.cursor = 0;
        }
        self.last_target = x;

        while self.cursor + 1 < n {
            let (x0, x1) = (self.xs[self.cursor], self.xs[self.cursor + 1]);
            if x >= x0 && x <= x1 {
                let (y0, y1) = (self.ys[self.cursor], self.ys[self.cursor + 1]);
                if x == x0 || x1 == x0 {
                    return y0;
                }
                if x == x1 {
                    return y1;
                }
                return y0 + (y1 - y0) * (x - x0) / (x1 - x0);
            }
            self.cursor += 1;
        }
        self.ys[n - 1]
    }
}

/// Number of points on a time axis spanning `first..=last`
///
/// `None` when the count is not finite or exceeds [`MAX_OUTPUT_POINTS`].
fn time_axis_points(first: f64, last: f64, step: f64) -> Option<usize> {
    if last <= first {
        return Some(1);
    }
    // Tolerance keeps `last` when the span is an exact multiple of `step`
    bounded_count(((last - first) / step + 1e-9).floor() + 1.0)
}

/// Number of points when resampling `len` indices with `step`
fn index_axis_points(len: usize, step: f64) -> Option<usize> {
    bounded_count((len as f64 / step).floor())
}

fn bounded_count(count: f64) -> Option<usize> {
    (count.is_finite() && count <= MAX_OUTPUT_POINTS as f64).then_some(count as usize)
}

/// Resample one field onto `axis`; declared but empty fields stay empty
fn resample_field(
    input: &SampleStore,
    output: &mut SampleStore,
    name: &str,
    xs: &[f64],
    axis: &[f64],
) {
    let ys = input.series(name);
    if ys.is_empty() {
        output.add_field(name);
    } else {
        let mut resampler = Resampler::new(xs, ys);
        let values = axis.iter().map(|&x| resampler.at(x)).collect();
        output.add_series(name, values);
    }
    copy_field_metadata(input, output, name);
}

/// Linear interpolation transform
#[derive(Debug, Clone)]
pub struct LinearInterpolation {
    state: TransformState,
    method: String,
    step_size: f64,
}

impl LinearInterpolation {
    pub fn new() -> Self {
        Self {
            state: TransformState::default(),
            method: METHOD_LINEAR.to_string(),
            step_size: 1.0,
        }
    }

    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    fn too_many_points(&mut self) -> TransformError {
        let message = format!(
            "step_size {} yields more than {} points",
            self.step_size, MAX_OUTPUT_POINTS
        );
        self.state.fail(TransformError::Processing(message))
    }

    fn check_input(&mut self, input: &SampleStore) -> Result<(), TransformError> {
        if input.is_empty() || input.field_count() == 0 {
            return Err(self.state.fail(TransformError::EmptyInput));
        }
        if input.len() < 2 {
            return Err(self.state.fail(TransformError::Processing(
                "at least 2 points are required".to_string(),
            )));
        }
        if let Some(name) = input
            .field_names()
            .iter()
            .find(|name| {
                let len = input.series(name).len();
                len != 0 && len != input.len()
            })
        {
            let message = format!(
                "series {} has {} values, expected {}",
                name,
                input.series(name).len(),
                input.len()
            );
            return Err(self.state.fail(TransformError::Processing(message)));
        }
        Ok(())
    }
}

impl Default for LinearInterpolation {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for LinearInterpolation {
    fn name(&self) -> &str {
        "LinearInterpolation"
    }

    fn description(&self) -> &str {
        "Linear interpolation and uniform resampling"
    }

    fn kind(&self) -> TransformKind {
        TransformKind::Interpolation
    }

    fn state(&self) -> &TransformState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut TransformState {
        &mut self.state
    }

    fn process_data(
        &mut self,
        input: &SampleStore,
        output: &mut SampleStore,
    ) -> Result<(), TransformError> {
        let started = self.state.begin()?;
        self.check_input(input)?;

        let time_field = TIME_FIELDS
            .into_iter()
            .find(|name| !input.series(name).is_empty());
        match time_field {
            Some(time_name) => {
                let xs = input.series(time_name);
                let (first, last) = (xs[0], xs[xs.len() - 1]);
                let count = match time_axis_points(first, last, self.step_size) {
                    Some(count) => count,
                    None => return Err(self.too_many_points()),
                };
                let axis: Vec<f64> = (0..count)
                    .map(|i| first + i as f64 * self.step_size)
                    .collect();
                tracing::debug!(field = time_name, points = count, "Time-keyed resampling");
                for name in input.field_names() {
                    if name == time_name {
                        continue;
                    }
                    resample_field(input, output, name, xs, &axis);
                }
                output.add_series(time_name, axis);
                copy_field_metadata(input, output, time_name);
            }
            None => {
                let len = input.len();
                let count = match index_axis_points(len, self.step_size) {
                    Some(count) => count,
                    None => return Err(self.too_many_points()),
                };
                let xs: Vec<f64> = (0..len).map(|i| i as f64).collect();
                let axis: Vec<f64> = (0..count).map(|i| i as f64 * self.step_size).collect();
                tracing::debug!(points = count, "Index-keyed resampling");
                for name in input.field_names() {
                    resample_field(input, output, name, &xs, &axis);
                }
            }
        }

        self.state.finish(started, input.len());
        Ok(())
    }

    fn set_parameter(&mut self, key: &str, value: ParamValue) -> Result<(), TransformError> {
        match key {
            "method" => match value.as_str() {
                Some(m) if m.eq_ignore_ascii_case(METHOD_LINEAR) => {
                    self.method = METHOD_LINEAR.to_string()
                }
                _ => return Err(self.state.reject(key, &value, "\"linear\"")),
            },
            "step_size" => match value.as_f64() {
                Some(step) if step > 0.0 && step.is_finite() => self.step_size = step,
                _ => return Err(self.state.reject(key, &value, "a number > 0")),
            },
            _ => return Err(self.state.unknown_key(key)),
        }
        self.state.accept(key);
        Ok(())
    }

    fn parameter(&self, key: &str) -> Option<ParamValue> {
        match key {
            "method" => Some(ParamValue::Text(self.method.clone())),
            "step_size" => Some(ParamValue::Float(self.step_size)),
            _ => None,
        }
    }

    fn default_parameters(&self) -> BTreeMap<String, ParamValue> {
        BTreeMap::from([
            ("method".to_string(), ParamValue::from(METHOD_LINEAR)),
            ("step_size".to_string(), ParamValue::Float(1.0)),
        ])
    }

    fn validate_parameters(&self) -> bool {
        self.method == METHOD_LINEAR && self.step_size > 0.0
    }
}
