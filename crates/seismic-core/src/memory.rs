//! Aligned grid storage.
//!
//! SIMD kernels start every row at the first interior cell, two elements
//! into the row. [`AlignedGrid`] places that cell on the kernel's alignment
//! boundary by offsetting the view into an over-allocated block.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::mem::size_of;
use std::ptr::NonNull;

use crate::error::{Result, SeismicError};
use crate::kernel::STENCIL_RADIUS;
use crate::medium::Medium;
use crate::pulse::PulseSeries;

/// Zero-initialized `f32` buffer whose element 2 sits on an alignment
/// boundary.
pub struct AlignedGrid {
    base: NonNull<u8>,
    data: NonNull<f32>,
    len: usize,
    alignment: usize,
    layout: Layout,
}

impl AlignedGrid {
    /// Allocate `len` zeroed floats.
    ///
    /// `alignment == 0` requests ordinary `f32` alignment. Otherwise the
    /// block is `len * 4 + alignment` bytes aligned to `alignment`, and the
    /// view starts `alignment - 8` bytes in.
    pub fn new(len: usize, alignment: usize) -> Result<Self> {
        validate_alignment(alignment)?;

        let bytes = len
            .checked_mul(size_of::<f32>())
            .and_then(|b| b.checked_add(alignment))
            .ok_or(SeismicError::Allocation { bytes: usize::MAX })?;
        if len == 0 {
            return Err(SeismicError::Allocation { bytes: 0 });
        }

        let block_align = alignment.max(std::mem::align_of::<f32>());
        let layout =
            Layout::from_size_align(bytes, block_align).map_err(|_| SeismicError::Allocation { bytes })?;

        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let base = NonNull::new(raw).ok_or(SeismicError::Allocation { bytes })?;

        let margin = if alignment == 0 {
            0
        } else {
            alignment - STENCIL_RADIUS * size_of::<f32>()
        };
        // SAFETY: margin < alignment <= bytes - len * 4, so the view lies
        // inside the block; margin is a multiple of 4 and the block is at
        // least 4-aligned.
        let data = unsafe { NonNull::new_unchecked(raw.add(margin) as *mut f32) };

        Ok(Self {
            base,
            data,
            len,
            alignment,
            layout,
        })
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the grid is empty (never true for a constructed grid).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Requested alignment in bytes (0 = natural).
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Elements as a slice.
    pub fn as_slice(&self) -> &[f32] {
        // SAFETY: data points to len initialized floats owned by self.
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }

    /// Elements as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        // SAFETY: as above; &mut self guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.data.as_ptr(), self.len) }
    }

    /// Raw pointer to element 0.
    pub fn as_mut_ptr(&mut self) -> *mut f32 {
        self.data.as_ptr()
    }

    /// Size of the underlying block in bytes.
    pub fn block_size(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for AlignedGrid {
    fn drop(&mut self) {
        // SAFETY: base and layout are exactly what alloc_zeroed returned and
        // was called with.
        unsafe { dealloc(self.base.as_ptr(), self.layout) }
    }
}

impl std::fmt::Debug for AlignedGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedGrid")
            .field("len", &self.len)
            .field("alignment", &self.alignment)
            .finish()
    }
}

// SAFETY: AlignedGrid owns its block exclusively, like a Vec<f32>.
unsafe impl Send for AlignedGrid {}
unsafe impl Sync for AlignedGrid {}

/// Check that the 2-float margin offset is representable for `alignment`.
pub fn validate_alignment(alignment: usize) -> Result<()> {
    let margin = STENCIL_RADIUS * size_of::<f32>();
    if alignment != 0 && (!alignment.is_power_of_two() || alignment < margin) {
        return Err(SeismicError::alignment(format!(
            "{} bytes is not 0 or a power of two of at least {}",
            alignment, margin
        )));
    }
    Ok(())
}

/// Every buffer a run needs: two pressure grids, the velocity model and the
/// pulse series.
///
/// Grid 0 is the first-allocated buffer and is current before the first step.
#[derive(Debug)]
pub struct Wavefield {
    width: usize,
    height: usize,
    grids: [AlignedGrid; 2],
    velocity: AlignedGrid,
    pulse: PulseSeries,
    current: usize,
}

impl Wavefield {
    /// Allocate zeroed grids for a `width x height` domain.
    pub fn allocate(width: usize, height: usize, timesteps: usize, alignment: usize) -> Result<Self> {
        let cells = width
            .checked_mul(height)
            .ok_or(SeismicError::Allocation { bytes: usize::MAX })?;

        let first = AlignedGrid::new(cells, alignment)?;
        let second = AlignedGrid::new(cells, alignment)?;
        let velocity = AlignedGrid::new(cells, alignment)?;

        tracing::debug!(
            width,
            height,
            alignment,
            block_bytes = first.block_size(),
            "allocated wavefield"
        );

        Ok(Self {
            width,
            height,
            grids: [first, second],
            velocity,
            pulse: PulseSeries::silent(timesteps),
            current: 0,
        })
    }

    /// Fill the velocity model and the Ricker source from `medium`.
    pub fn initialize(&mut self, medium: &Medium) {
        self.velocity.as_mut_slice().fill(medium.velocity_coefficient());
        self.pulse = PulseSeries::ricker(self.pulse.timesteps(), medium.peak_frequency());
    }

    /// Grid width (outer dimension).
    pub fn width(&self) -> usize {
        self.width
    }

    /// Grid height (inner dimension, contiguous).
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of steps the pulse series covers.
    pub fn timesteps(&self) -> usize {
        self.pulse.timesteps()
    }

    /// Mutable velocity model.
    pub fn velocity_mut(&mut self) -> &mut [f32] {
        self.velocity.as_mut_slice()
    }

    /// Velocity model.
    pub fn velocity(&self) -> &[f32] {
        self.velocity.as_slice()
    }

    /// Replace the pulse series. It must cover the same number of steps.
    pub fn set_pulse(&mut self, pulse: PulseSeries) -> Result<()> {
        if pulse.timesteps() != self.pulse.timesteps() {
            return Err(SeismicError::geometry(format!(
                "pulse series covers {} steps, wavefield was allocated for {}",
                pulse.timesteps(),
                self.pulse.timesteps()
            )));
        }
        self.pulse = pulse;
        Ok(())
    }

    /// Pulse series.
    pub fn pulse(&self) -> &PulseSeries {
        &self.pulse
    }

    /// Index (0 or 1) of the grid holding the latest pressure field.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Latest pressure field.
    pub fn current(&self) -> &[f32] {
        self.grids[self.current].as_slice()
    }

    /// Pressure grid `index` in allocation order.
    pub fn buffer(&self, index: usize) -> &[f32] {
        self.grids[index & 1].as_slice()
    }

    pub(crate) fn set_current_index(&mut self, index: usize) {
        self.current = index & 1;
    }

    /// Raw access for the engine: both pressure grids, the velocity model
    /// and the pulse series.
    pub(crate) fn split_mut(&mut self) -> ([&mut AlignedGrid; 2], &AlignedGrid, &PulseSeries) {
        let [first, second] = &mut self.grids;
        ([first, second], &self.velocity, &self.pulse)
    }
}
