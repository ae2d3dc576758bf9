//! Scalar reference implementation of the patch distance term.

use super::DENOMINATOR_EPSILON;

/// Distance term of one pixel pair.
#[inline]
pub fn term(wp: f32, wq: f32, vp: f32, vq: f32, a: f32, k_2: f32) -> f32 {
    let diff = wp - wq;
    (diff * diff - a * (vp + vp.min(vq))) / (DENOMINATOR_EPSILON + k_2 * (vp + vq))
}

/// Sum of [`term`] over a row.
#[inline]
pub fn row_distance(wp: &[f32], wq: &[f32], vp: &[f32], vq: &[f32], a: f32, k_2: f32) -> f32 {
    wp.iter()
        .zip(wq)
        .zip(vp.iter().zip(vq))
        .map(|((&wp, &wq), (&vp, &vq))| term(wp, wq, vp, vq, a, k_2))
        .sum()
}
