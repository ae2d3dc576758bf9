//! AVX2 + FMA patch distance row kernel (x86_64).

use std::arch::x86_64::*;

use super::DENOMINATOR_EPSILON;
use super::scalar;

/// Horizontal sum of a 256-bit f32 vector.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn horizontal_sum_256(v: __m256) -> f32 {
    unsafe {
        let high = _mm256_extractf128_ps(v, 1);
        let low = _mm256_castps256_ps128(v);
        let sum128 = _mm_add_ps(low, high);

        let shuf = _mm_movehdup_ps(sum128);
        let sums = _mm_add_ps(sum128, shuf);
        let shuf = _mm_movehl_ps(sums, sums);
        let sums = _mm_add_ss(sums, shuf);
        _mm_cvtss_f32(sums)
    }
}

/// Sum the distance term over a row, 8 lanes at a time.
///
/// # Safety
/// Caller must ensure AVX2 and FMA are available and all slices have equal length.
#[target_feature(enable = "avx2,fma")]
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
        let a_v = _mm256_set1_ps(a);
        let k_v = _mm256_set1_ps(k_2);
        let eps = _mm256_set1_ps(DENOMINATOR_EPSILON);
        let mut acc = _mm256_setzero_ps();

        let full = len - len % 8;
        let mut i = 0;
        while i < full {
            let diff = _mm256_sub_ps(
                _mm256_loadu_ps(wp.as_ptr().add(i)),
                _mm256_loadu_ps(wq.as_ptr().add(i)),
            );
            let pvar = _mm256_loadu_ps(vp.as_ptr().add(i));
            let qvar = _mm256_loadu_ps(vq.as_ptr().add(i));
            let noise = _mm256_mul_ps(a_v, _mm256_add_ps(pvar, _mm256_min_ps(pvar, qvar)));
            let numerator = _mm256_fmsub_ps(diff, diff, noise);
            let denominator = _mm256_fmadd_ps(k_v, _mm256_add_ps(pvar, qvar), eps);
            acc = _mm256_add_ps(acc, _mm256_div_ps(numerator, denominator));
            i += 8;
        }

        horizontal_sum_256(acc)
            + scalar::row_distance(&wp[full..], &wq[full..], &vp[full..], &vq[full..], a, k_2)
    }
}
