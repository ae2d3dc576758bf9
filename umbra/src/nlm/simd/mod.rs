//! Patch distance row kernels with runtime SIMD dispatch.
//!
//! A row kernel sums the variance-normalized distance term
//!
//! ```text
//! (diff^2 - a (vp + min(vp, vq))) / (1e-7 + k_2 (vp + vq)),   diff = wp - wq
//! ```
//!
//! over one row of a patch. [`scalar`] is the reference; the vector kernels
//! process 8 (AVX2) or 4 (SSE4.1, NEON) lanes and finish the row tail with the
//! scalar term, so no lane past the patch edge is ever loaded.

use common::{SimdLevel, cfg_aarch64, cfg_x86_64};

pub mod scalar;

cfg_x86_64! {
    pub mod avx2;
    pub mod sse;
}

cfg_aarch64! {
    pub mod neon;
}


/// Floor added to the distance denominator.
pub const DENOMINATOR_EPSILON: f32 = 1e-7;

/// Sum the distance term over one patch row using the best available kernel.
#[inline]
pub fn row_distance(wp: &[f32], wq: &[f32], vp: &[f32], vq: &[f32], a: f32, k_2: f32) -> f32 {
    row_distance_with(SimdLevel::best(), wp, wq, vp, vq, a, k_2)
}

/// Sum the distance term over one patch row with a specific kernel.
///
/// Levels the CPU lacks are clamped to what it supports.
#[inline]
pub fn row_distance_with(
    level: SimdLevel,
    wp: &[f32],
    wq: &[f32],
    vp: &[f32],
    vq: &[f32],
    a: f32,
    k_2: f32,
) -> f32 {
    let len = wp.len();
    debug_assert!(wq.len() == len && vp.len() == len && vq.len() == len);

    match level.min(SimdLevel::best()) {
        #[cfg(target_arch = "x86_64")]
        SimdLevel::Avx2 if len >= 8 => unsafe { avx2::row_distance(wp, wq, vp, vq, a, k_2) },
        #[cfg(target_arch = "x86_64")]
        SimdLevel::Avx2 | SimdLevel::Sse41 if len >= 4 => unsafe {
            sse::row_distance(wp, wq, vp, vq, a, k_2)
        },
        #[cfg(target_arch = "aarch64")]
        SimdLevel::Neon if len >= 4 => unsafe { neon::row_distance(wp, wq, vp, vq, a, k_2) },
        _ => scalar::row_distance(wp, wq, vp, vq, a, k_2),
    }
}
