//! SSE4.1 patch distance row kernel (x86_64).

use std::arch::x86_64::*;

use super::DENOMINATOR_EPSILON;
use super::scalar;

/// Horizontal sum of a 128-bit f32 vector.
#[inline]
#[target_feature(enable = "sse4.1")]
unsafe fn horizontal_sum(v: __m128) -> f32 {
    unsafe {
        let shuf = _mm_movehdup_ps(v); // [b, b, d, d]
        let sums = _mm_add_ps(v, shuf); // [a+b, b+b, c+d, d+d]
        let shuf = _mm_movehl_ps(sums, sums); // [c+d, d+d, c+d, d+d]
        let sums = _mm_add_ss(sums, shuf);
        _mm_cvtss_f32(sums)
    }
}

/// Sum the distance term over a row, 4 lanes at a time.
///
/// # Safety
/// Caller must ensure SSE4.1 is available and all slices have equal length.
#[target_feature(enable = "sse4.1")]
pub unsafe fn row_distance(
    wp: &[f32],
    wq: &[f32],
    vp: &[f32],
    vq: &[f32],
    a: f32,
    k_2: f32,
) -> f32 {
    unsafe {
        let len = wp.len();
        let a_v = _mm_set1_ps(a);
        let k_v = _mm_set1_ps(k_2);
        let eps = _mm_set1_ps(DENOMINATOR_EPSILON);
        let mut acc = _mm_setzero_ps();

        let full = len - len % 4;
        let mut i = 0;
        while i < full {
            let diff = _mm_sub_ps(
                _mm_loadu_ps(wp.as_ptr().add(i)),
                _mm_loadu_ps(wq.as_ptr().add(i)),
            );
            let pvar = _mm_loadu_ps(vp.as_ptr().add(i));
            let qvar = _mm_loadu_ps(vq.as_ptr().add(i));
            let noise = _mm_mul_ps(a_v, _mm_add_ps(pvar, _mm_min_ps(pvar, qvar)));
            let numerator = _mm_sub_ps(_mm_mul_ps(diff, diff), noise);
            let denominator = _mm_add_ps(eps, _mm_mul_ps(k_v, _mm_add_ps(pvar, qvar)));
            acc = _mm_add_ps(acc, _mm_div_ps(numerator, denominator));
            i += 4;
        }

        horizontal_sum(acc)
            + scalar::row_distance(&wp[full..], &wq[full..], &vp[full..], &vq[full..], a, k_2)
    }
}
