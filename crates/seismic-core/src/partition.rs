//! Domain decomposition across worker threads.

use std::ops::Range;

use crate::error::{Result, SeismicError};
use crate::kernel::STENCIL_RADIUS;

/// Which grid dimension is split between threads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PartitionMode {
    /// Split the outer (slow, `x`) dimension; every thread sweeps whole
    /// columns of the inner dimension.
    #[default]
    Outer,
    /// Split the inner (fast, `y`) dimension; every thread sweeps the whole
    /// outer range.
    Inner,
}

impl std::str::FromStr for PartitionMode {
    type Err = SeismicError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "outer" | "x" => Ok(Self::Outer),
            "inner" | "y" => Ok(Self::Inner),
            other => Err(SeismicError::geometry(format!("unknown partition mode '{}'", other))),
        }
    }
}

impl std::fmt::Display for PartitionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Outer => f.write_str("outer"),
            Self::Inner => f.write_str("inner"),
        }
    }
}

/// Work assigned to one worker for a whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadTask {
    /// Worker index; 0 runs on the calling thread.
    pub id: usize,
    /// Outer-dimension cells this worker updates.
    pub outer: Range<usize>,
    /// Inner-dimension cells this worker updates.
    pub inner: Range<usize>,
    /// Whether this worker injects the source pulse.
    pub owns_pulse: bool,
}

impl ThreadTask {
    /// Number of cells updated per step.
    pub fn cells(&self) -> usize {
        self.outer.len() * self.inner.len()
    }
}

/// Input to [`partition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionRequest {
    /// Grid width (outer dimension).
    pub width: usize,
    /// Grid height (inner dimension).
    pub height: usize,
    /// Number of workers.
    pub threads: usize,
    /// Vector width of the selected kernel, in floats.
    pub vector_width: usize,
    /// Pulse column.
    pub pulse_x: usize,
    /// Pulse row.
    pub pulse_y: usize,
    /// Split dimension.
    pub mode: PartitionMode,
}

/// Split the interior `[2, width-2) x [2, height-2)` into one task per
/// thread.
///
/// Ranges are contiguous, disjoint, and together cover the interior exactly.
/// The caller validates geometry first; this only rejects inputs it cannot
/// divide at all.
pub fn partition(req: &PartitionRequest) -> Result<Vec<ThreadTask>> {
    let margin = STENCIL_RADIUS;
    if req.threads == 0 || req.vector_width == 0 {
        return Err(SeismicError::geometry("thread count and vector width must be positive"));
    }
    if req.width <= 2 * margin || req.height <= 2 * margin {
        return Err(SeismicError::geometry(format!(
            "grid {}x{} has no interior",
            req.width, req.height
        )));
    }

    let outer_all = margin..req.width - margin;
    let inner_all = margin..req.height - margin;

    let tasks = match req.mode {
        PartitionMode::Outer => {
            let chunk = round_up(outer_all.len() / req.threads, req.vector_width);
            split(outer_all.clone(), chunk, req.threads)
                .into_iter()
                .enumerate()
                .map(|(id, outer)| ThreadTask {
                    id,
                    owns_pulse: outer.contains(&req.pulse_x),
                    outer,
                    inner: inner_all.clone(),
                })
                .collect()
        }
        PartitionMode::Inner => {
            let chunk = inner_all.len() / req.threads;
            split(inner_all.clone(), chunk, req.threads)
                .into_iter()
                .enumerate()
                .map(|(id, inner)| ThreadTask {
                    id,
                    owns_pulse: inner.contains(&req.pulse_y),
                    outer: outer_all.clone(),
                    inner,
                })
                .collect()
        }
    };

    Ok(tasks)
}

/// Consecutive chunks of `chunk` cells, clamped to `all.end`; the last
/// chunk takes whatever remains.
fn split(all: Range<usize>, chunk: usize, parts: usize) -> Vec<Range<usize>> {
    (0..parts)
        .map(|id| {
            let start = (all.start + id * chunk).min(all.end);
            let end = if id + 1 == parts {
                all.end
            } else {
                (start + chunk).min(all.end)
            };
            start..end
        })
        .collect()
}

fn round_up(value: usize, multiple: usize) -> usize {
    value.div_ceil(multiple) * multiple
}
