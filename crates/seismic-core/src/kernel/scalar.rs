//! Portable scalar kernels.

use super::{RowSweep, StencilKernel, COEFF_CENTRE, COEFF_NEAR, COEFF_TIME};

/// Reference kernel: the stencil formula evaluated cell by cell with indexed
/// reads. Defines ground truth for every other variant.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainNaive;

impl StencilKernel for PlainNaive {
    fn sweep_row(&self, mut row: RowSweep<'_>) {
        row.finish_scalar(0);
    }
}

/// Scalar kernel walking ten pre-cut neighbor windows in lockstep.
///
/// Every window has the length of the row, so the loop body carries no
/// bounds checks and the compiler is free to vectorize it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainOpt;

impl StencilKernel for PlainOpt {
    fn sweep_row(&self, row: RowSweep<'_>) {
        let RowSweep {
            current,
            velocity,
            next,
            offset,
            stride,
        } = row;
        let len = next.len();
        let centre = window(current, offset, len);
        let west1 = window(current, offset - 1, len);
        let east1 = window(current, offset + 1, len);
        let north1 = window(current, offset - stride, len);
        let south1 = window(current, offset + stride, len);
        let west2 = window(current, offset - 2, len);
        let east2 = window(current, offset + 2, len);
        let north2 = window(current, offset - 2 * stride, len);
        let south2 = window(current, offset + 2 * stride, len);
        let vel = &velocity[offset..offset + len];

        for k in 0..len {
            let near = west1[k] + east1[k] + north1[k] + south1[k];
            let far = west2[k] + east2[k] + north2[k] + south2[k];
            let c = centre[k];
            next[k] = COEFF_TIME * c - next[k] + vel[k] * (COEFF_NEAR * near - far - COEFF_CENTRE * c);
        }
    }
}

#[inline(always)]
fn window(grid: &[f32], start: usize, len: usize) -> &[f32] {
    &grid[start..start + len]
}
