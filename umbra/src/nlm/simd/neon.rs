//! NEON patch distance row kernel (aarch64).

use std::arch::aarch64::*;

use super::DENOMINATOR_EPSILON;
use super::scalar;

/// Sum the distance term over a row, 4 lanes at a time.
///
/// # Safety
/// All slices must have equal length.
#[target_feature(enable = "neon")]
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
        let a_v = vdupq_n_f32(a);
        let k_v = vdupq_n_f32(k_2);
        let eps = vdupq_n_f32(DENOMINATOR_EPSILON);
        let mut acc = vdupq_n_f32(0.0);

        let full = len - len % 4;
        let mut i = 0;
        while i < full {
            let diff = vsubq_f32(vld1q_f32(wp.as_ptr().add(i)), vld1q_f32(wq.as_ptr().add(i)));
            let pvar = vld1q_f32(vp.as_ptr().add(i));
            let qvar = vld1q_f32(vq.as_ptr().add(i));
            let noise = vmulq_f32(a_v, vaddq_f32(pvar, vminq_f32(pvar, qvar)));
            let numerator = vsubq_f32(vmulq_f32(diff, diff), noise);
            let denominator = vaddq_f32(eps, vmulq_f32(k_v, vaddq_f32(pvar, qvar)));
            acc = vaddq_f32(acc, vdivq_f32(numerator, denominator));
            i += 4;
        }

        vaddvq_f32(acc)
            + scalar::row_distance(&wp[full..], &wq[full..], &vp[full..], &vq[full..], a, k_2)
    }
}
