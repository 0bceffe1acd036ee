//! x86_64 SSE / AVX / FMA kernels.
//!
//! All entry points are gated by the registry on the matching capability
//! flags, which is what makes the `unsafe` calls into `#[target_feature]`
//! functions sound. Bounds are guaranteed by [`RowSweep::new`].

use std::arch::x86_64::*;

use super::{RowSweep, StencilKernel, COEFF_CENTRE, COEFF_NEAR, COEFF_TIME};

const SSE_LANES: usize = 4;
const AVX_LANES: usize = 8;
const SSE_ALIGN: usize = 16;

/// `_mm_shuffle_ps` mask taking lanes `[a2, a3, b0, b1]`.
const SHIFT_TWO: i32 = 0b01_00_11_10;
/// `_mm_shuffle_ps` mask taking lanes `[a1, a2, b1, b2]`.
const SHIFT_ONE: i32 = 0b10_01_10_01;

/// SSE, unaligned loads for every operand.
#[derive(Debug, Clone, Copy, Default)]
pub struct SseUnaligned;

/// SSE, aligned loads along the outer dimension and for the centre column.
///
/// Relies on the allocator placing the first interior cell on a 16-byte
/// boundary and on the height being a multiple of four plus the margin.
/// A row whose base is not aligned is processed with unaligned loads.
#[derive(Debug, Clone, Copy, Default)]
pub struct SseAligned;

/// SSE, three aligned loads per vector along the inner dimension; the four
/// shifted neighbors `r-2, r-1, r+1, r+2` are rebuilt with shuffles.
#[derive(Debug, Clone, Copy, Default)]
pub struct SsePartialAligned;

/// AVX, unaligned 8-wide loads.
#[derive(Debug, Clone, Copy, Default)]
pub struct AvxUnaligned;

/// SSE with fused multiply-add, unaligned loads.
#[derive(Debug, Clone, Copy, Default)]
pub struct FmaSseUnaligned;

/// AVX2 with fused multiply-add, unaligned 8-wide loads.
#[derive(Debug, Clone, Copy, Default)]
pub struct FmaAvx2Unaligned;

impl StencilKernel for SseUnaligned {
    fn sweep_row(&self, row: RowSweep<'_>) {
        // SAFETY: selected only when the processor reports SSE.
        unsafe { sse_row::<false>(row) }
    }
}

impl StencilKernel for SseAligned {
    fn sweep_row(&self, row: RowSweep<'_>) {
        // SAFETY: selected only when the processor reports SSE; aligned loads
        // are used only after checking every aligned operand's address.
        unsafe {
            if sse_aligned_operands(&row) {
                sse_row::<true>(row)
            } else {
                sse_row::<false>(row)
            }
        }
    }
}

impl StencilKernel for SsePartialAligned {
    fn sweep_row(&self, row: RowSweep<'_>) {
        // SAFETY: as for SseAligned.
        unsafe {
            if sse_aligned_operands(&row) {
                sse_partial_aligned_row(row)
            } else {
                sse_row::<false>(row)
            }
        }
    }
}

impl StencilKernel for AvxUnaligned {
    fn sweep_row(&self, row: RowSweep<'_>) {
        // SAFETY: selected only when the processor reports AVX.
        unsafe { avx_row(row) }
    }
}

impl StencilKernel for FmaSseUnaligned {
    fn sweep_row(&self, row: RowSweep<'_>) {
        // SAFETY: selected only when the processor reports SSE and FMA.
        unsafe { fma_sse_row(row) }
    }
}

impl StencilKernel for FmaAvx2Unaligned {
    fn sweep_row(&self, row: RowSweep<'_>) {
        // SAFETY: selected only when the processor reports AVX, AVX2 and FMA.
        unsafe { fma_avx2_row(row) }
    }
}

/// Check that centre, outer-dimension neighbors, velocity and write window
/// of every vector in the row sit on 16-byte boundaries.
fn sse_aligned_operands(row: &RowSweep<'_>) -> bool {
    let aligned = |ptr: *const f32| (ptr as usize) % SSE_ALIGN == 0;
    row.stride % SSE_LANES == 0
        && aligned(row.current[row.offset..].as_ptr())
        && aligned(row.velocity[row.offset..].as_ptr())
        && aligned(row.next.as_ptr())
}

#[inline(always)]
unsafe fn load4<const ALIGNED: bool>(ptr: *const f32) -> __m128 {
    if ALIGNED {
        _mm_load_ps(ptr)
    } else {
        _mm_loadu_ps(ptr)
    }
}

#[inline(always)]
unsafe fn store4<const ALIGNED: bool>(ptr: *mut f32, value: __m128) {
    if ALIGNED {
        _mm_store_ps(ptr, value)
    } else {
        _mm_storeu_ps(ptr, value)
    }
}

/// Final combination shared by the non-FMA SSE kernels, in reference order.
#[inline(always)]
unsafe fn sse_combine(centre: __m128, near: __m128, far: __m128, prev: __m128, vel: __m128) -> __m128 {
    let two = _mm_set1_ps(COEFF_TIME);
    let sixteen = _mm_set1_ps(COEFF_NEAR);
    let sixty = _mm_set1_ps(COEFF_CENTRE);

    let laplacian = _mm_sub_ps(_mm_sub_ps(_mm_mul_ps(sixteen, near), far), _mm_mul_ps(sixty, centre));
    _mm_add_ps(_mm_sub_ps(_mm_mul_ps(two, centre), prev), _mm_mul_ps(vel, laplacian))
}

#[target_feature(enable = "sse")]
unsafe fn sse_row<const ALIGNED: bool>(mut row: RowSweep<'_>) {
    let stride = row.stride;
    let len = row.next.len();
    let vector_end = len - len % SSE_LANES;
    let cur = row.current.as_ptr();
    let vel = row.velocity.as_ptr();
    let out = row.next.as_mut_ptr();

    let mut k = 0;
    while k < vector_end {
        let r = row.offset + k;
        let centre = load4::<ALIGNED>(cur.add(r));
        let near = _mm_add_ps(
            _mm_add_ps(
                _mm_add_ps(_mm_loadu_ps(cur.add(r - 1)), _mm_loadu_ps(cur.add(r + 1))),
                load4::<ALIGNED>(cur.add(r - stride)),
            ),
            load4::<ALIGNED>(cur.add(r + stride)),
        );
        let far = _mm_add_ps(
            _mm_add_ps(
                _mm_add_ps(_mm_loadu_ps(cur.add(r - 2)), _mm_loadu_ps(cur.add(r + 2))),
                load4::<ALIGNED>(cur.add(r - 2 * stride)),
            ),
            load4::<ALIGNED>(cur.add(r + 2 * stride)),
        );
        let prev = load4::<ALIGNED>(out.add(k));
        let result = sse_combine(centre, near, far, prev, load4::<ALIGNED>(vel.add(r)));
        store4::<ALIGNED>(out.add(k), result);
        k += SSE_LANES;
    }

    row.finish_scalar(vector_end);
}

#[target_feature(enable = "sse")]
unsafe fn sse_partial_aligned_row(mut row: RowSweep<'_>) {
    let stride = row.stride;
    let len = row.next.len();
    let vector_end = len - len % SSE_LANES;
    let cur = row.current.as_ptr();
    let vel = row.velocity.as_ptr();
    let out = row.next.as_mut_ptr();

    let mut k = 0;
    while k < vector_end {
        let r = row.offset + k;
        // before = [r-4 .. r-1], centre = [r .. r+3], after = [r+4 .. r+7]
        let before = _mm_load_ps(cur.add(r - SSE_LANES));
        let centre = _mm_load_ps(cur.add(r));
        let after = _mm_load_ps(cur.add(r + SSE_LANES));

        let west2 = _mm_shuffle_ps::<SHIFT_TWO>(before, centre);
        let east2 = _mm_shuffle_ps::<SHIFT_TWO>(centre, after);
        let west1 = _mm_shuffle_ps::<SHIFT_ONE>(west2, centre);
        let east1 = _mm_shuffle_ps::<SHIFT_ONE>(centre, east2);

        let near = _mm_add_ps(
            _mm_add_ps(_mm_add_ps(west1, east1), _mm_load_ps(cur.add(r - stride))),
            _mm_load_ps(cur.add(r + stride)),
        );
        let far = _mm_add_ps(
            _mm_add_ps(_mm_add_ps(west2, east2), _mm_load_ps(cur.add(r - 2 * stride))),
            _mm_load_ps(cur.add(r + 2 * stride)),
        );
        let prev = _mm_load_ps(out.add(k));
        let result = sse_combine(centre, near, far, prev, _mm_load_ps(vel.add(r)));
        _mm_store_ps(out.add(k), result);
        k += SSE_LANES;
    }

    row.finish_scalar(vector_end);
}

#[target_feature(enable = "avx")]
unsafe fn avx_row(mut row: RowSweep<'_>) {
    let stride = row.stride;
    let len = row.next.len();
    let vector_end = len - len % AVX_LANES;
    let cur = row.current.as_ptr();
    let vel = row.velocity.as_ptr();
    let out = row.next.as_mut_ptr();

    let two = _mm256_set1_ps(COEFF_TIME);
    let sixteen = _mm256_set1_ps(COEFF_NEAR);
    let sixty = _mm256_set1_ps(COEFF_CENTRE);

    let mut k = 0;
    while k < vector_end {
        let r = row.offset + k;
        let centre = _mm256_loadu_ps(cur.add(r));
        let near = _mm256_add_ps(
            _mm256_add_ps(
                _mm256_add_ps(_mm256_loadu_ps(cur.add(r - 1)), _mm256_loadu_ps(cur.add(r + 1))),
                _mm256_loadu_ps(cur.add(r - stride)),
            ),
            _mm256_loadu_ps(cur.add(r + stride)),
        );
        let far = _mm256_add_ps(
            _mm256_add_ps(
                _mm256_add_ps(_mm256_loadu_ps(cur.add(r - 2)), _mm256_loadu_ps(cur.add(r + 2))),
                _mm256_loadu_ps(cur.add(r - 2 * stride)),
            ),
            _mm256_loadu_ps(cur.add(r + 2 * stride)),
        );
        let prev = _mm256_loadu_ps(out.add(k));

        let laplacian = _mm256_sub_ps(
            _mm256_sub_ps(_mm256_mul_ps(sixteen, near), far),
            _mm256_mul_ps(sixty, centre),
        );
        let result = _mm256_add_ps(
            _mm256_sub_ps(_mm256_mul_ps(two, centre), prev),
            _mm256_mul_ps(_mm256_loadu_ps(vel.add(r)), laplacian),
        );
        _mm256_storeu_ps(out.add(k), result);
        k += AVX_LANES;
    }

    row.finish_scalar(vector_end);
}

#[target_feature(enable = "sse,fma")]
unsafe fn fma_sse_row(mut row: RowSweep<'_>) {
    let stride = row.stride;
    let len = row.next.len();
    let vector_end = len - len % SSE_LANES;
    let cur = row.current.as_ptr();
    let vel = row.velocity.as_ptr();
    let out = row.next.as_mut_ptr();

    let two = _mm_set1_ps(COEFF_TIME);
    let sixteen = _mm_set1_ps(COEFF_NEAR);
    let sixty = _mm_set1_ps(COEFF_CENTRE);

    let mut k = 0;
    while k < vector_end {
        let r = row.offset + k;
        let centre = _mm_loadu_ps(cur.add(r));
        let near = _mm_add_ps(
            _mm_add_ps(
                _mm_add_ps(_mm_loadu_ps(cur.add(r - 1)), _mm_loadu_ps(cur.add(r + 1))),
                _mm_loadu_ps(cur.add(r - stride)),
            ),
            _mm_loadu_ps(cur.add(r + stride)),
        );
        let far = _mm_add_ps(
            _mm_add_ps(
                _mm_add_ps(_mm_loadu_ps(cur.add(r - 2)), _mm_loadu_ps(cur.add(r + 2))),
                _mm_loadu_ps(cur.add(r - 2 * stride)),
            ),
            _mm_loadu_ps(cur.add(r + 2 * stride)),
        );
        let prev = _mm_loadu_ps(out.add(k));

        let laplacian = _mm_fnmadd_ps(sixty, centre, _mm_fmsub_ps(sixteen, near, far));
        let result = _mm_fmadd_ps(_mm_loadu_ps(vel.add(r)), laplacian, _mm_fmsub_ps(two, centre, prev));
        _mm_storeu_ps(out.add(k), result);
        k += SSE_LANES;
    }

    row.finish_scalar(vector_end);
}

#[target_feature(enable = "avx,avx2,fma")]
unsafe fn fma_avx2_row(mut row: RowSweep<'_>) {
    let stride = row.stride;
    let len = row.next.len();
    let vector_end = len - len % AVX_LANES;
    let cur = row.current.as_ptr();
    let vel = row.velocity.as_ptr();
    let out = row.next.as_mut_ptr();

    let two = _mm256_set1_ps(COEFF_TIME);
    let sixteen = _mm256_set1_ps(COEFF_NEAR);
    let sixty = _mm256_set1_ps(COEFF_CENTRE);

    let mut k = 0;
    while k < vector_end {
        let r = row.offset + k;
        let centre = _mm256_loadu_ps(cur.add(r));
        let near = _mm256_add_ps(
            _mm256_add_ps(
                _mm256_add_ps(_mm256_loadu_ps(cur.add(r - 1)), _mm256_loadu_ps(cur.add(r + 1))),
                _mm256_loadu_ps(cur.add(r - stride)),
            ),
            _mm256_loadu_ps(cur.add(r + stride)),
        );
        let far = _mm256_add_ps(
            _mm256_add_ps(
                _mm256_add_ps(_mm256_loadu_ps(cur.add(r - 2)), _mm256_loadu_ps(cur.add(r + 2))),
                _mm256_loadu_ps(cur.add(r - 2 * stride)),
            ),
            _mm256_loadu_ps(cur.add(r + 2 * stride)),
        );
        let prev = _mm256_loadu_ps(out.add(k));

        let laplacian = _mm256_fnmadd_ps(sixty, centre, _mm256_fmsub_ps(sixteen, near, far));
        let result = _mm256_fmadd_ps(
            _mm256_loadu_ps(vel.add(r)),
            laplacian,
            _mm256_fmsub_ps(two, centre, prev),
        );
        _mm256_storeu_ps(out.add(k), result);
        k += AVX_LANES;
    }

    row.finish_scalar(vector_end);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capabilities;
    use crate::kernel::tests::assert_matches_reference;

    fn has(flags: u32) -> bool {
        Capabilities::detect().contains(Capabilities::from_bits(flags))
    }

    #[test]
    fn test_sse_unaligned_bit_identical() {
        if !has(Capabilities::SSE) {
            return;
        }
        assert_matches_reference(&SseUnaligned, 20, 20, 0.0);
        // Inner length 9: two vectors plus a scalar remainder.
        assert_matches_reference(&SseUnaligned, 12, 13, 0.0);
    }

    #[test]
    fn test_sse_aligned_falls_back_on_plain_vec() {
        if !has(Capabilities::SSE) {
            return;
        }
        // Vec storage gives no 16-byte guarantee for index 2; the kernel must
        // still produce the reference result.
        assert_matches_reference(&SseAligned, 20, 20, 0.0);
        assert_matches_reference(&SsePartialAligned, 20, 20, 0.0);
    }

    #[test]
    fn test_shuffle_masks_select_shifted_lanes() {
        if !has(Capabilities::SSE) {
            return;
        }
        let a = [0.0f32, 1.0, 2.0, 3.0];
        let b = [4.0f32, 5.0, 6.0, 7.0];
        let mut two = [0.0f32; 4];
        let mut one = [0.0f32; 4];
        // SAFETY: SSE checked above; arrays hold four floats.
        unsafe {
            let (va, vb) = (_mm_loadu_ps(a.as_ptr()), _mm_loadu_ps(b.as_ptr()));
            _mm_storeu_ps(two.as_mut_ptr(), _mm_shuffle_ps::<SHIFT_TWO>(va, vb));
            _mm_storeu_ps(one.as_mut_ptr(), _mm_shuffle_ps::<SHIFT_ONE>(va, vb));
        }
        assert_eq!(two, [2.0, 3.0, 4.0, 5.0]);
        assert_eq!(one, [1.0, 2.0, 5.0, 6.0]);
    }

    #[test]
    fn test_partial_aligned_on_aligned_grid() {
        if !has(Capabilities::SSE) {
            return;
        }
        use crate::kernel::tests::{pattern, sweep_interior};
        use crate::kernel::PlainNaive;
        use crate::memory::AlignedGrid;

        let (width, height) = (16usize, 20usize);
        let size = width * height;
        let mut current = AlignedGrid::new(size, SSE_ALIGN).unwrap();
        let mut velocity = AlignedGrid::new(size, SSE_ALIGN).unwrap();
        let mut actual = AlignedGrid::new(size, SSE_ALIGN).unwrap();
        current.as_mut_slice().copy_from_slice(&pattern(size, 1));
        for (v, p) in velocity.as_mut_slice().iter_mut().zip(pattern(size, 2)) {
            *v = p.abs() * 0.01;
        }
        actual.as_mut_slice().copy_from_slice(&pattern(size, 3));
        let mut expected = pattern(size, 3);

        // Row bases are 16-byte aligned here, so the shuffle path runs.
        let base = 2 * height + 2;
        let window = &mut actual.as_mut_slice()[base..base + 4];
        let row = RowSweep::new(current.as_slice(), velocity.as_slice(), window, base, height);
        assert!(sse_aligned_operands(&row));
        sweep_interior(&SsePartialAligned, current.as_slice(), velocity.as_slice(), actual.as_mut_slice(), width, height);
        sweep_interior(&PlainNaive, current.as_slice(), velocity.as_slice(), &mut expected, width, height);
        assert_eq!(actual.as_slice(), expected.as_slice());

        let mut aligned = pattern(size, 3);
        sweep_interior(&SseAligned, current.as_slice(), velocity.as_slice(), &mut aligned, width, height);
        assert_eq!(aligned, expected);
    }

    #[test]
    fn test_avx_unaligned_bit_identical() {
        if !has(Capabilities::AVX) {
            return;
        }
        assert_matches_reference(&AvxUnaligned, 20, 20, 0.0);
        assert_matches_reference(&AvxUnaligned, 12, 25, 0.0);
    }

    #[test]
    fn test_fma_kernels_within_rounding() {
        if has(Capabilities::SSE | Capabilities::FMA) {
            assert_matches_reference(&FmaSseUnaligned, 20, 20, 1e-5);
        }
        if has(Capabilities::AVX | Capabilities::AVX2 | Capabilities::FMA) {
            assert_matches_reference(&FmaAvx2Unaligned, 20, 28, 1e-5);
        }
    }
}
