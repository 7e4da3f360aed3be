//! Waveform synthesis

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// User-supplied `t -> value` generator for [`WaveformMode::CustomFunction`]
pub type Generator = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Generating function of the realtime source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WaveformMode {
    #[default]
    SineWave,
    SquareWave,
    TriangleWave,
    RandomNoise,
    LinearRamp,
    /// Uses the custom generator, sine when none is set
    CustomFunction,
}

impl WaveformMode {
    pub const ALL: [WaveformMode; 6] = [
        Self::SineWave,
        Self::SquareWave,
        Self::TriangleWave,
        Self::RandomNoise,
        Self::LinearRamp,
        Self::CustomFunction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SineWave => "SineWave",
            Self::SquareWave => "SquareWave",
            Self::TriangleWave => "TriangleWave",
            Self::RandomNoise => "RandomNoise",
            Self::LinearRamp => "LinearRamp",
            Self::CustomFunction => "CustomFunction",
        }
    }
}

impl fmt::Display for WaveformMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WaveformMode {
    type Err = String;

    /// Accepts `SineWave`, `sine_wave`, `sine`, ... (case-insensitive)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "sinewave" | "sine" | "sin" => Ok(Self::SineWave),
            "squarewave" | "square" => Ok(Self::SquareWave),
            "trianglewave" | "triangle" => Ok(Self::TriangleWave),
            "randomnoise" | "random" | "noise" => Ok(Self::RandomNoise),
            "linearramp" | "ramp" | "sawtooth" => Ok(Self::LinearRamp),
            "customfunction" | "custom" => Ok(Self::CustomFunction),
            _ => Err(format!("unknown waveform mode: {}", s)),
        }
    }
}

/// Shape parameters shared by every mode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shape {
    pub amplitude: f64,
    pub frequency_hz: f64,
    pub offset: f64,
}

/// Position within the current period, in `[0, 1)`
///
/// A non-positive frequency has no period, so the phase stays at 0.
pub fn phase(t: f64, frequency_hz: f64) -> f64 {
    if frequency_hz <= 0.0 {
        return 0.0;
    }
    (t * frequency_hz).rem_euclid(1.0)
}

/// Waveform value at `t` seconds, without noise
pub fn evaluate<R: Rng>(
    mode: WaveformMode,
    t: f64,
    shape: Shape,
    custom: Option<&Generator>,
    rng: &mut R,
) -> f64 {
    let Shape {
        amplitude,
        frequency_hz,
        offset,
    } = shape;
    match mode {
        WaveformMode::SineWave => sine(t, shape),
        WaveformMode::SquareWave => {
            if phase(t, frequency_hz) < 0.5 {
                amplitude + offset
            } else {
                -amplitude + offset
            }
        }
        WaveformMode::TriangleWave => {
            let p = phase(t, frequency_hz);
            let unit = if p < 0.5 { 4.0 * p - 1.0 } else { 3.0 - 4.0 * p };
            amplitude * unit + offset
        }
        WaveformMode::RandomNoise => {
            let n: f64 = rng.sample(StandardNormal);
            n * amplitude + offset
        }
        WaveformMode::LinearRamp => amplitude * (2.0 * phase(t, frequency_hz) - 1.0) + offset,
        WaveformMode::CustomFunction => match custom {
            Some(generator) => generator(t),
            None => sine(t, shape),
        },
    }
}

fn sine(t: f64, shape: Shape) -> f64 {
    shape.amplitude * (2.0 * std::f64::consts::PI * shape.frequency_hz * t).sin() + shape.offset
}

/// Additive gaussian noise, zero when `level <= 0`
pub fn noise<R: Rng>(level: f64, rng: &mut R) -> f64 {
    if level > 0.0 {
        let n: f64 = rng.sample(StandardNormal);
        n * level
    } else {
        0.0
    }
}
