//! AArch64 Advanced SIMD kernel.

use std::arch::aarch64::*;

use super::{RowSweep, StencilKernel, COEFF_CENTRE, COEFF_NEAR, COEFF_TIME};

const NEON_LANES: usize = 4;

/// NEON, 4-wide loads. `vld1q_f32` has no alignment requirement, so the
/// 16-byte buffer alignment only affects throughput.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeonAligned;

impl StencilKernel for NeonAligned {
    fn sweep_row(&self, row: RowSweep<'_>) {
        // SAFETY: selected only when the processor reports NEON and ASIMD.
        unsafe { neon_row(row) }
    }
}

#[target_feature(enable = "neon")]
unsafe fn neon_row(mut row: RowSweep<'_>) {
    let stride = row.stride;
    let len = row.next.len();
    let vector_end = len - len % NEON_LANES;
    let cur = row.current.as_ptr();
    let vel = row.velocity.as_ptr();
    let out = row.next.as_mut_ptr();

    let two = vdupq_n_f32(COEFF_TIME);
    let sixteen = vdupq_n_f32(COEFF_NEAR);
    let sixty = vdupq_n_f32(COEFF_CENTRE);

    let mut k = 0;
    while k < vector_end {
        let r = row.offset + k;
        let centre = vld1q_f32(cur.add(r));
        let near = vaddq_f32(
            vaddq_f32(
                vaddq_f32(vld1q_f32(cur.add(r - 1)), vld1q_f32(cur.add(r + 1))),
                vld1q_f32(cur.add(r - stride)),
            ),
            vld1q_f32(cur.add(r + stride)),
        );
        let far = vaddq_f32(
            vaddq_f32(
                vaddq_f32(vld1q_f32(cur.add(r - 2)), vld1q_f32(cur.add(r + 2))),
                vld1q_f32(cur.add(r - 2 * stride)),
            ),
            vld1q_f32(cur.add(r + 2 * stride)),
        );
        let prev = vld1q_f32(out.add(k));

        let laplacian = vsubq_f32(vsubq_f32(vmulq_f32(sixteen, near), far), vmulq_f32(sixty, centre));
        let result = vaddq_f32(
            vsubq_f32(vmulq_f32(two, centre), prev),
            vmulq_f32(vld1q_f32(vel.add(r)), laplacian),
        );
        vst1q_f32(out.add(k), result);
        k += NEON_LANES;
    }

    row.finish_scalar(vector_end);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capabilities;
    use crate::kernel::tests::assert_matches_reference;

    #[test]
    fn test_neon_bit_identical() {
        let required = Capabilities::from_bits(Capabilities::NEON | Capabilities::ASIMD);
        if !Capabilities::detect().contains(required) {
            return;
        }
        assert_matches_reference(&NeonAligned, 20, 20, 0.0);
        assert_matches_reference(&NeonAligned, 12, 15, 0.0);
    }
}
