//! Source pulse series and injection.

use std::f64::consts::PI;

use crate::error::{Result, SeismicError};

/// Per-step source amplitudes.
///
/// Holds `timesteps + 1` values; the last one is always zero so that the
/// worker loop can read `pulse[t + 1]` at the final step without a branch.
#[derive(Debug, Clone, PartialEq)]
pub struct PulseSeries {
    amplitudes: Vec<f32>,
}

impl PulseSeries {
    /// All-zero series for `timesteps` steps.
    pub fn silent(timesteps: usize) -> Self {
        Self {
            amplitudes: vec![0.0; timesteps + 1],
        }
    }

    /// Ricker wavelet centred one period after the start.
    ///
    /// `amplitude[t] = ricker(t - 1/f_peak, f_peak)` for `t < timesteps`,
    /// followed by the zero sentinel.
    pub fn ricker(timesteps: usize, f_peak: f32) -> Self {
        let f = f64::from(f_peak);
        let delay = 1.0 / f;
        let mut amplitudes: Vec<f32> = (0..timesteps)
            .map(|t| ricker(t as f64 - delay, f) as f32)
            .collect();
        amplitudes.push(0.0);
        Self { amplitudes }
    }

    /// Series from caller-provided amplitudes, one per step; the sentinel is
    /// appended.
    pub fn from_amplitudes(values: &[f32]) -> Self {
        let mut amplitudes = Vec::with_capacity(values.len() + 1);
        amplitudes.extend_from_slice(values);
        amplitudes.push(0.0);
        Self { amplitudes }
    }

    /// Number of steps this series covers.
    pub fn timesteps(&self) -> usize {
        self.amplitudes.len() - 1
    }

    /// Total stored length, sentinel included.
    pub fn len(&self) -> usize {
        self.amplitudes.len()
    }

    /// Always false; a series holds at least the sentinel.
    pub fn is_empty(&self) -> bool {
        self.amplitudes.is_empty()
    }

    /// Amplitude at step `t`.
    #[inline]
    pub fn get(&self, t: usize) -> f32 {
        self.amplitudes[t]
    }

    /// All amplitudes, sentinel included.
    pub fn as_slice(&self) -> &[f32] {
        &self.amplitudes
    }
}

/// Ricker ("Mexican hat") wavelet: `(1 - 2x²)·e^(-x²)` with `x = π·f·t`.
pub fn ricker(t: f64, f: f64) -> f64 {
    let x = PI * f * t;
    let x2 = x * x;
    (1.0 - 2.0 * x2) * (-x2).exp()
}

/// Add `amplitude` to `buffer[cell]`.
///
/// Called at most once per step, by the worker that owns the pulse cell.
#[inline]
pub fn inject(buffer: &mut [f32], cell: usize, amplitude: f32) -> Result<()> {
    let len = buffer.len();
    let slot = buffer
        .get_mut(cell)
        .ok_or_else(|| SeismicError::geometry(format!("pulse cell {} outside buffer of {}", cell, len)))?;
    *slot += amplitude;
    Ok(())
}
