//! Run configuration and derived statistics.

use crate::error::{Result, SeismicError};
use crate::kernel::STENCIL_RADIUS;
use crate::partition::PartitionMode;

/// Floating-point operations per interior cell per step.
pub const FLOPS_PER_CELL: u64 = 15;

/// Parameters of one simulation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    /// Grid width (outer dimension, split between threads).
    pub width: usize,
    /// Grid height (inner dimension, contiguous in memory).
    pub height: usize,
    /// Number of time steps.
    pub timesteps: usize,
    /// Pulse column.
    pub pulse_x: usize,
    /// Pulse row.
    pub pulse_y: usize,
    /// Kernel variant name.
    pub kernel: String,
    /// Worker thread count.
    pub threads: usize,
    /// Split dimension.
    pub partition: PartitionMode,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let width = 2300;
        let height = 748;
        Self {
            width,
            height,
            timesteps: 100,
            pulse_x: width / 2,
            pulse_y: height / 2,
            kernel: "plain_naive".to_string(),
            threads: 1,
            partition: PartitionMode::Outer,
        }
    }
}

impl SimulationConfig {
    /// Config for a `width x height` grid with the pulse at its centre.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pulse_x: width / 2,
            pulse_y: height / 2,
            ..Self::default()
        }
    }

    /// Set the number of time steps.
    pub fn with_timesteps(mut self, timesteps: usize) -> Self {
        self.timesteps = timesteps;
        self
    }

    /// Set the pulse cell.
    pub fn with_pulse(mut self, x: usize, y: usize) -> Self {
        self.pulse_x = x;
        self.pulse_y = y;
        self
    }

    /// Set the kernel variant.
    pub fn with_kernel(mut self, name: impl Into<String>) -> Self {
        self.kernel = name.into();
        self
    }

    /// Set the thread count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the split dimension.
    pub fn with_partition(mut self, mode: PartitionMode) -> Self {
        self.partition = mode;
        self
    }

    /// Check geometry against a kernel's vector width.
    ///
    /// The inner interior length must divide evenly into one vector-aligned
    /// block per thread.
    pub fn validate(&self, vector_width: usize) -> Result<()> {
        let min = 2 * STENCIL_RADIUS;
        if self.width <= min || self.height <= min {
            return Err(SeismicError::geometry(format!(
                "grid {}x{} must be larger than {} in both dimensions",
                self.width, self.height, min
            )));
        }
        if self.threads == 0 {
            return Err(SeismicError::geometry("thread count must be at least 1"));
        }
        let block = vector_width.max(1) * self.threads;
        let inner = self.height - min;
        if inner % block != 0 {
            return Err(SeismicError::geometry(format!(
                "height - {} = {} is not a multiple of vector width {} x {} threads",
                min, inner, vector_width, self.threads
            )));
        }
        let interior_x = STENCIL_RADIUS..self.width - STENCIL_RADIUS;
        let interior_y = STENCIL_RADIUS..self.height - STENCIL_RADIUS;
        if !interior_x.contains(&self.pulse_x) || !interior_y.contains(&self.pulse_y) {
            return Err(SeismicError::geometry(format!(
                "pulse ({}, {}) outside interior [{}, {}) x [{}, {})",
                self.pulse_x, self.pulse_y, interior_x.start, interior_x.end, interior_y.start, interior_y.end
            )));
        }
        Ok(())
    }

    /// Flat index of the pulse cell.
    pub fn pulse_cell(&self) -> usize {
        self.pulse_x * self.height + self.pulse_y
    }

    /// Work in MFLOP units over the whole run, as reported next to GFLOPS.
    pub fn gflop(&self) -> f64 {
        let cells = (self.width.saturating_sub(4) * self.height.saturating_sub(4)) as u64;
        ((cells * FLOPS_PER_CELL + 1) * self.timesteps as u64) as f64 / 1e6
    }

    /// Approximate bytes needed by the grids and pulse series.
    pub fn memory_estimate(&self, alignment: usize) -> u64 {
        let grid = self.height as u64 * (self.width + alignment) as u64 * 4;
        grid * 3 + self.timesteps as u64 * 4
    }
}

/// Render a byte count with binary units.
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}
