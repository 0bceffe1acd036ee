//! Stencil kernels.
//!
//! Every kernel implements the same 4th-order-in-space, 2nd-order-in-time
//! update for the acoustic wave equation:
//!
//! ```text
//! next[r] = 2*cur[r] - next[r]
//!         + vel[r] * ( 16*(cur[r-1] + cur[r+1] + cur[r-h] + cur[r+h])
//!                    -    (cur[r-2] + cur[r+2] + cur[r-2h] + cur[r+2h])
//!                    - 60*cur[r] )
//! ```
//!
//! where `h` is the grid height (the stride of the outer dimension). The
//! variants differ only in how they fetch neighbors from memory. Variants
//! without fused multiply-add evaluate in exactly the reference operation
//! order and therefore produce bit-identical results.
//!
//! Kernels work one row segment at a time: a contiguous run of cells along
//! the inner dimension, described by a [`RowSweep`].

mod scalar;

#[cfg(target_arch = "x86_64")]
mod x86;

#[cfg(target_arch = "aarch64")]
mod neon;

pub use scalar::{PlainNaive, PlainOpt};

#[cfg(target_arch = "x86_64")]
pub use x86::{AvxUnaligned, FmaAvx2Unaligned, FmaSseUnaligned, SseAligned, SsePartialAligned, SseUnaligned};

#[cfg(target_arch = "aarch64")]
pub use neon::NeonAligned;

/// Coefficient of the centre cell in the time update.
pub const COEFF_TIME: f32 = 2.0;
/// Coefficient of the four nearest neighbors.
pub const COEFF_NEAR: f32 = 16.0;
/// Coefficient of the centre cell in the Laplacian.
pub const COEFF_CENTRE: f32 = 60.0;

/// Stencil radius in cells; also the width of the untouched grid margin.
pub const STENCIL_RADIUS: usize = 2;

/// A numeric backend applying the stencil to one row segment.
///
/// Implementations must be free of shared mutable state: the same kernel
/// object is called concurrently from every worker thread.
pub trait StencilKernel: Send + Sync {
    /// Advance every cell of `row.next()` by one time step.
    fn sweep_row(&self, row: RowSweep<'_>);
}

/// One contiguous segment of cells to update.
///
/// `next` is the write window: `next[k]` is the cell with flat index
/// `offset + k`. `current` and `velocity` are whole grids. Construction
/// checks that every stencil read of every cell in the window stays inside
/// `current`, so kernels may use unchecked loads.
pub struct RowSweep<'a> {
    current: &'a [f32],
    velocity: &'a [f32],
    next: &'a mut [f32],
    offset: usize,
    stride: usize,
}

impl<'a> RowSweep<'a> {
    /// Describe a row segment.
    ///
    /// # Panics
    ///
    /// Panics if the grids differ in size, if `stride` is not larger than
    /// the two-cell margin on both sides, or if a stencil read of any cell
    /// in the window would fall outside `current`.
    pub fn new(
        current: &'a [f32],
        velocity: &'a [f32],
        next: &'a mut [f32],
        offset: usize,
        stride: usize,
    ) -> Self {
        assert_eq!(current.len(), velocity.len(), "velocity model shape mismatch");
        assert!(stride > 2 * STENCIL_RADIUS, "stride {} too small", stride);
        assert!(
            offset >= STENCIL_RADIUS * stride,
            "row segment at {} reads before the grid start",
            offset
        );
        assert!(
            offset + next.len() + STENCIL_RADIUS * stride <= current.len(),
            "row segment at {}+{} reads past the grid end",
            offset,
            next.len()
        );

        Self {
            current,
            velocity,
            next,
            offset,
            stride,
        }
    }

    /// Flat index of the first cell in the window.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Grid height.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of cells in the window.
    pub fn len(&self) -> usize {
        self.next.len()
    }

    /// Check if the window is empty.
    pub fn is_empty(&self) -> bool {
        self.next.is_empty()
    }

    /// The write window.
    pub fn next(&self) -> &[f32] {
        self.next
    }

    /// Update cells `from..len()` with the reference formula.
    ///
    /// SIMD kernels use this for the remainder that does not fill a vector.
    pub(crate) fn finish_scalar(&mut self, from: usize) {
        for k in from..self.next.len() {
            let r = self.offset + k;
            self.next[k] = stencil_point(self.current, self.velocity, self.next[k], r, self.stride);
        }
    }
}

/// Reference update of a single cell.
///
/// `prev` is the value at `r` two time levels back (the old content of the
/// write buffer).
#[inline(always)]
pub fn stencil_point(current: &[f32], velocity: &[f32], prev: f32, r: usize, stride: usize) -> f32 {
    let centre = current[r];
    let near = current[r - 1] + current[r + 1] + current[r - stride] + current[r + stride];
    let far = current[r - 2] + current[r + 2] + current[r - 2 * stride] + current[r + 2 * stride];
    COEFF_TIME * centre - prev + velocity[r] * (COEFF_NEAR * near - far - COEFF_CENTRE * centre)
}
